//! Background work started by request handlers.
//!
//! Every unit of work is registered with the supervisor before it is
//! spawned, so shutdown waits for it. Failures go to the error sink and never
//! back to the caller.

use background_worker::BackgroundError;
use domain_membership::{Plan, User, invoice_description};
use email::Message;
use tracing::{debug, info, instrument};

use crate::context::AppContext;

/// Attachment name of the plan manual
pub const MANUAL_ATTACHMENT: &str = "Manual.pdf";

/// Start the invoice and manual jobs for a new subscription.
///
/// Returns once both jobs are registered; neither is awaited. Fails only when
/// shutdown has begun, in which case nothing is launched.
#[instrument(skip_all, fields(user_id = user.id, plan_id = plan.id))]
pub fn launch_subscription_jobs(
    ctx: &AppContext,
    user: &User,
    plan: &Plan,
) -> Result<(), BackgroundError> {
    let invoice_ctx = ctx.clone();
    let invoice_user = user.clone();
    let invoice_plan = plan.clone();
    ctx.supervisor().spawn("invoice", async move {
        send_invoice(&invoice_ctx, &invoice_user, &invoice_plan).await;
    })?;

    let manual_ctx = ctx.clone();
    let manual_user = user.clone();
    let manual_plan = plan.clone();
    ctx.supervisor().spawn("manual", async move {
        send_manual(&manual_ctx, manual_user, manual_plan).await;
    })?;

    info!("Subscription jobs launched");
    Ok(())
}

/// Queue a single message as a tracked unit of work.
pub fn send_email(ctx: &AppContext, message: Message) -> Result<(), BackgroundError> {
    let task_ctx = ctx.clone();
    ctx.supervisor().spawn("send_email", async move {
        if let Err(e) = task_ctx.mailer().enqueue(message).await {
            task_ctx.errors().report("send_email", e);
        }
    })?;
    Ok(())
}

async fn send_invoice(ctx: &AppContext, user: &User, plan: &Plan) {
    let description = match invoice_description(user, plan) {
        Ok(description) => description,
        Err(e) => {
            ctx.errors().report("invoice", e);
            return;
        }
    };

    let message = Message::new(user.email.as_str(), "Your Invoice")
        .with_template("invoice")
        .with_data(description);

    if let Err(e) = ctx.mailer().enqueue(message).await {
        ctx.errors().report("invoice", e);
        return;
    }
    debug!(user_id = user.id, "Invoice queued");
}

async fn send_manual(ctx: &AppContext, user: User, plan: Plan) {
    let renderer = ctx.renderer().clone();
    let path = ctx
        .config()
        .manual
        .path_strategy
        .path_for(&ctx.config().manual.output_dir, user.id);
    let email = user.email.clone();
    let user_id = user.id;

    let write_path = path.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        let document = renderer.render(&user, &plan)?;
        document.write_to(&write_path)
    })
    .await;

    match rendered {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            ctx.errors().report("manual", e);
            return;
        }
        Err(e) => {
            ctx.errors().report("manual", format!("manual render task failed: {e}"));
            return;
        }
    }

    let message = Message::new(email, "Your Manual")
        .with_template("manual")
        .with_data("Your user manual is attached")
        .with_attachment(MANUAL_ATTACHMENT, path);

    if let Err(e) = ctx.mailer().enqueue(message).await {
        ctx.errors().report("manual", e);
        return;
    }
    debug!(user_id, "Manual queued");

    if ctx.config().manual.inject_fault {
        ctx.errors().report("manual", "some custom error");
    }
}
