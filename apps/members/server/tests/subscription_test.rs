//! End-to-end tests of the background jobs behind a mock mail transport

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use background_worker::{BackgroundError, CollectingObserver, ShutdownState};
use domain_membership::{
    ManualDocument, ManualRenderer, NewUser, Plan, RenderError, SubscriptionStore, User,
};
use email::MockTransport;
use members_server::{
    AppConfig, AppContext, MANUAL_ATTACHMENT, activate_account, launch_subscription_jobs,
    notify_failed_login, register_user, subscribe_to_plan,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

/// Renderer that blocks until the test opens its gate
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

struct GatedRenderer {
    gate: Arc<Gate>,
}

impl ManualRenderer for GatedRenderer {
    fn render(&self, user: &User, plan: &Plan) -> Result<ManualDocument, RenderError> {
        let mut open = self.gate.open.lock().unwrap();
        while !*open {
            open = self.gate.cv.wait(open).unwrap();
        }
        Ok(ManualDocument::new(
            b"%PDF-1.4 gated".to_vec(),
            user.full_name(),
            format!("{} User Guide", plan.name),
        ))
    }
}

struct Harness {
    ctx: AppContext,
    transport: Arc<MockTransport>,
    collector: Arc<CollectingObserver>,
    dir: TempDir,
}

fn config(dir: &Path) -> AppConfig {
    let template = dir.join("manual-template.pdf");
    std::fs::write(&template, b"%PDF-1.4 template").unwrap();

    let mut config = AppConfig::default();
    config.manual.template = template;
    config.manual.output_dir = dir.join("tmp");
    config.activation.secret = "test-secret".to_string();
    config
}

fn harness_with(
    transport: MockTransport,
    tweak: impl FnOnce(&mut AppConfig),
    renderer: Option<Arc<dyn ManualRenderer>>,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    tweak(&mut config);

    let transport = Arc::new(transport);
    let collector = Arc::new(CollectingObserver::new());

    let mut builder = AppContext::builder(config).observer(collector.clone());
    if let Some(renderer) = renderer {
        builder = builder.renderer(renderer);
    }
    let ctx = builder.build(Arc::clone(&transport)).unwrap();

    Harness {
        ctx,
        transport,
        collector,
        dir,
    }
}

fn harness(transport: MockTransport) -> Harness {
    harness_with(transport, |_| {}, None)
}

async fn new_member(ctx: &AppContext, email: &str) -> User {
    ctx.store()
        .insert_user(NewUser {
            email: email.to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_subscription_sends_invoice_and_manual() {
    let h = harness(MockTransport::new());
    let user = new_member(&h.ctx, "ann@example.com").await;

    let updated = subscribe_to_plan(&h.ctx, &user, 3).await.unwrap();
    assert_eq!(updated.plan.as_ref().map(|p| p.name.as_str()), Some("Gold Plan"));

    let summary = h.ctx.shutdown().await.unwrap().unwrap();
    assert_eq!(summary.dispatch.delivered, 2);
    assert_eq!(summary.dispatch.failed, 0);
    assert_eq!(h.ctx.supervisor().active(), 0);

    let mut sent = h.transport.sent().await;
    sent.sort_by(|a, b| a.message.subject().cmp(b.message.subject()));
    assert_eq!(sent.len(), 2);

    let invoice = &sent[0];
    assert_eq!(invoice.message.subject(), "Your Invoice");
    assert_eq!(invoice.message.template_name(), "invoice");
    assert_eq!(invoice.message.to(), "ann@example.com");
    assert!(invoice.mail.plain.contains("$30.00"));

    let manual = &sent[1];
    assert_eq!(manual.message.subject(), "Your Manual");
    assert_eq!(manual.message.template_name(), "manual");
    let expected: PathBuf = h.dir.path().join("tmp").join(format!("{}_manual.pdf", user.id));
    assert_eq!(manual.message.attachment(MANUAL_ATTACHMENT), Some(expected.as_path()));

    let written = std::fs::read(&expected).unwrap();
    assert!(written.starts_with(b"%PDF-1.4 template"));
    assert!(String::from_utf8_lossy(&written).contains("Gold Plan User Guide"));

    assert!(h.collector.reports().await.is_empty());
}

#[tokio::test]
async fn test_manual_transport_failure_reported_once() {
    let h = harness(MockTransport::new().fail_when(
        |msg| msg.subject() == "Your Manual",
        "mailbox unavailable",
    ));
    let user = new_member(&h.ctx, "ann@example.com").await;

    subscribe_to_plan(&h.ctx, &user, 1).await.unwrap();
    let summary = h.ctx.shutdown().await.unwrap().unwrap();

    assert_eq!(summary.dispatch.delivered, 1);
    assert_eq!(summary.dispatch.failed, 1);
    assert_eq!(summary.errors_handled, 1);
    // Invoice plus a single manual attempt: no retry.
    assert_eq!(h.transport.attempts(), 2);

    let reports = h.collector.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, "mailer");
    assert!(reports[0].message.contains("mailbox unavailable"));
    assert_eq!(h.ctx.supervisor().active(), 0);
}

#[tokio::test]
async fn test_render_failure_skips_manual_mail() {
    let h = harness_with(
        MockTransport::new(),
        |config| config.manual.template = PathBuf::from("/nonexistent/manual.pdf"),
        None,
    );
    let user = new_member(&h.ctx, "ann@example.com").await;

    subscribe_to_plan(&h.ctx, &user, 2).await.unwrap();
    h.ctx.shutdown().await.unwrap();

    let sent = h.transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message.subject(), "Your Invoice");

    let reports = h.collector.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, "manual");
}

#[tokio::test]
async fn test_negative_amount_skips_invoice() {
    let h = harness(MockTransport::new());
    let user = new_member(&h.ctx, "ann@example.com").await;

    launch_subscription_jobs(&h.ctx, &user, &Plan::new(9, "Broken Plan", -500)).unwrap();
    h.ctx.shutdown().await.unwrap();

    let sent = h.transport.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message.subject(), "Your Manual");

    let reports = h.collector.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, "invoice");
}

#[tokio::test]
async fn test_injected_fault_reported_after_manual() {
    let h = harness_with(
        MockTransport::new(),
        |config| config.manual.inject_fault = true,
        None,
    );
    let user = new_member(&h.ctx, "ann@example.com").await;

    subscribe_to_plan(&h.ctx, &user, 1).await.unwrap();
    h.ctx.shutdown().await.unwrap();

    assert_eq!(h.transport.sent_count().await, 2);
    let reports = h.collector.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, "manual");
    assert_eq!(reports[0].message, "some custom error");
}

#[tokio::test(flavor = "current_thread")]
async fn test_shutdown_waits_for_in_flight_jobs() {
    let gate = Arc::new(Gate::default());
    let renderer: Arc<dyn ManualRenderer> = Arc::new(GatedRenderer {
        gate: Arc::clone(&gate),
    });
    let h = harness_with(MockTransport::new(), |_| {}, Some(renderer));

    let ann = new_member(&h.ctx, "ann@example.com").await;
    let bob = new_member(&h.ctx, "bob@example.com").await;
    let plan = Plan::new(1, "Bronze Plan", 1000);

    launch_subscription_jobs(&h.ctx, &ann, &plan).unwrap();
    launch_subscription_jobs(&h.ctx, &bob, &plan).unwrap();
    // Nothing has been polled yet on this runtime.
    assert_eq!(h.ctx.supervisor().active(), 4);

    let ctx = h.ctx.clone();
    let shutdown = tokio::spawn(async move { ctx.shutdown().await });

    // Invoices finish; manuals stay parked on the gate.
    tokio::time::timeout(WAIT, async {
        while h.ctx.supervisor().active() != 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.ctx.shutdown_state(), ShutdownState::Draining);
    assert!(!shutdown.is_finished());

    gate.open();
    let summary = tokio::time::timeout(WAIT, shutdown)
        .await
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(h.ctx.shutdown_state(), ShutdownState::Closed);
    assert_eq!(h.ctx.supervisor().active(), 0);
    assert_eq!(summary.dispatch.delivered, 4);
    assert!(h.transport.was_sent_to("ann@example.com").await);
    assert!(h.transport.was_sent_to("bob@example.com").await);
}

#[tokio::test]
async fn test_launch_refused_after_shutdown() {
    let h = harness(MockTransport::new());
    let user = new_member(&h.ctx, "ann@example.com").await;
    h.ctx.shutdown().await.unwrap();

    let err = launch_subscription_jobs(&h.ctx, &user, &Plan::new(1, "Bronze Plan", 1000))
        .unwrap_err();
    assert!(matches!(err, BackgroundError::Draining { .. }));

    // The request itself still succeeds.
    let updated = subscribe_to_plan(&h.ctx, &user, 1).await.unwrap();
    assert!(updated.plan.is_some());
    assert_eq!(h.transport.attempts(), 0);
}

#[tokio::test]
async fn test_unknown_plan_launches_nothing() {
    let h = harness(MockTransport::new());
    let user = new_member(&h.ctx, "ann@example.com").await;

    assert!(subscribe_to_plan(&h.ctx, &user, 42).await.is_err());
    assert_eq!(h.ctx.supervisor().active(), 0);
    h.ctx.shutdown().await.unwrap();
    assert_eq!(h.transport.attempts(), 0);
}

#[tokio::test]
async fn test_register_and_activate() {
    let h = harness(MockTransport::new());

    let user = register_user(
        &h.ctx,
        NewUser {
            email: "ann@example.com".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(!user.active);

    notify_failed_login(&h.ctx, "ann@example.com").await.unwrap();
    notify_failed_login(&h.ctx, "nobody@example.com").await.unwrap();
    h.ctx.shutdown().await.unwrap();

    let sent = h.transport.sent().await;
    assert_eq!(sent.len(), 2);

    let confirmation = sent
        .iter()
        .find(|s| s.message.subject() == "Activate your Account!")
        .unwrap();
    assert_eq!(confirmation.message.template_name(), "confirmation-email");
    let url = confirmation.message.data().as_str().unwrap().to_string();
    assert!(url.starts_with("http://localhost:8080/activate?email=ann%40example.com&token="));

    let notice = sent
        .iter()
        .find(|s| s.message.subject() == "Failed login attempt.")
        .unwrap();
    assert!(notice.mail.plain.contains("Invalid login attempt."));

    let activated = activate_account(&h.ctx, &url).await.unwrap();
    assert!(activated.active);
    let stored = h.ctx.store().find_user(user.id).await.unwrap().unwrap();
    assert!(stored.active);

    let forged = url.replace("ann%40example.com", "eve%40example.com");
    assert!(activate_account(&h.ctx, &forged).await.is_err());
}
