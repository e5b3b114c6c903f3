//! Registration, activation and login notices.

use domain_membership::{MembershipError, MembershipResult, NewUser, User};
use email::Message;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::jobs::send_email;

/// Create an inactive user and mail them an activation link.
pub async fn register_user(ctx: &AppContext, new_user: NewUser) -> MembershipResult<User> {
    let user = ctx.store().insert_user(new_user).await?;
    let url = ctx.signer().activation_url(&user.email)?;

    let message = Message::new(user.email.as_str(), "Activate your Account!")
        .with_template("confirmation-email")
        .with_data(url);

    if let Err(e) = send_email(ctx, message) {
        warn!(user_id = user.id, error = %e, "Activation mail not sent");
    }

    Ok(user)
}

/// Activate the account named by a signed activation link.
///
/// `query` is the link's query string or the whole URL.
pub async fn activate_account(ctx: &AppContext, query: &str) -> MembershipResult<User> {
    let email = ctx.signer().verify_query(query)?;

    let mut user = ctx
        .store()
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| MembershipError::UnknownEmail(email.clone()))?;

    if user.active {
        return Ok(user);
    }

    user.active = true;
    let user = ctx.store().update_user(user).await?;
    info!(user_id = user.id, "Account activated");
    Ok(user)
}

/// Tell the account owner that someone failed to log in as them.
///
/// Unknown addresses are ignored.
pub async fn notify_failed_login(ctx: &AppContext, email: &str) -> MembershipResult<()> {
    let Some(user) = ctx.store().find_user_by_email(email).await? else {
        return Ok(());
    };

    let message = Message::new(user.email.as_str(), "Failed login attempt.")
        .with_data("Invalid login attempt.");

    if let Err(e) = send_email(ctx, message) {
        warn!(user_id = user.id, error = %e, "Failed login notice not sent");
    }
    Ok(())
}
