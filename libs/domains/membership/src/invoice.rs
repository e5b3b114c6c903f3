//! Invoice text sent to a member after subscribing.

use crate::error::MembershipResult;
use crate::models::{Plan, User};

/// Describe what `user` is charged for `plan`.
///
/// Currently just the formatted plan amount; fails when the plan's amount
/// cannot be invoiced.
pub fn invoice_description(user: &User, plan: &Plan) -> MembershipResult<String> {
    let amount = plan.amount_formatted()?;
    tracing::debug!(user_id = user.id, plan_id = plan.id, %amount, "Prepared invoice");
    Ok(amount)
}
