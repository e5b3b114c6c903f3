use domain_membership::{MembershipError, MembershipResult, User};
use tracing::{info, warn};

use crate::context::AppContext;
use crate::jobs::launch_subscription_jobs;

/// Subscribe `user` to `plan_id` and return the user with the new plan.
///
/// The invoice and manual jobs are started before the subscription is
/// stored. Their outcome never affects the result.
pub async fn subscribe_to_plan(
    ctx: &AppContext,
    user: &User,
    plan_id: i64,
) -> MembershipResult<User> {
    let store = ctx.store();
    let plan = store
        .find_plan(plan_id)
        .await?
        .ok_or(MembershipError::PlanNotFound(plan_id))?;

    if let Err(e) = launch_subscription_jobs(ctx, user, &plan) {
        warn!(user_id = user.id, plan_id, error = %e, "Subscription jobs not started");
    }

    store.subscribe_user_to_plan(user.id, plan.id).await?;

    let refreshed = store
        .find_user(user.id)
        .await?
        .ok_or(MembershipError::UserNotFound(user.id))?;

    info!(user_id = user.id, plan = %plan.name, "Subscribed to plan");
    Ok(refreshed)
}
