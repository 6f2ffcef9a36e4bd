//! Background email notifications.
//!
//! Request handlers hand jobs to a bounded queue and return immediately; a
//! worker task delivers each job with exponential backoff. A full queue drops
//! the job with a warning rather than blocking the caller.

mod email;

pub use email::{EmailMessage, EmailProvider, MockEmailProvider, ProviderError, SmtpProvider};

use crate::config::NotificationQueueConfig;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    RegistrationReceived,
    PaymentConfirmed,
    PaymentFailed,
    PaymentReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RegistrationReceived => "registration_received",
            NotificationKind::PaymentConfirmed => "payment_confirmed",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::PaymentReminder => "payment_reminder",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub team_name: String,
    /// Display names, e.g. "RoboWars".
    pub competitions: Vec<String>,
    /// Whole rupees.
    pub amount: i64,
    pub order_ref: Option<String>,
    pub transaction_id: Option<String>,
    pub reason: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone)]
struct NotificationJob {
    kind: NotificationKind,
    recipient: String,
    data: TemplateData,
}

pub fn render(kind: NotificationKind, recipient: &str, data: &TemplateData) -> EmailMessage {
    let competitions = if data.competitions.is_empty() {
        "your competitions".to_string()
    } else {
        data.competitions.join(", ")
    };
    let order = data.order_ref.as_deref().unwrap_or("-");

    let (subject, mut body) = match kind {
        NotificationKind::RegistrationReceived => (
            "RoboMania 2025: registration received".to_string(),
            format!(
                "Hi {},\n\nWe have received your registration for {}. \
                 Complete the payment of Rs. {} to confirm your slot.\n\nOrder: {}\n",
                data.team_name, competitions, data.amount, order
            ),
        ),
        NotificationKind::PaymentConfirmed => (
            "RoboMania 2025: payment confirmed".to_string(),
            format!(
                "Hi {},\n\nYour payment of Rs. {} for {} is confirmed.\n\nOrder: {}\nTransaction: {}\n",
                data.team_name,
                data.amount,
                competitions,
                order,
                data.transaction_id.as_deref().unwrap_or("-")
            ),
        ),
        NotificationKind::PaymentFailed => (
            "RoboMania 2025: payment failed".to_string(),
            format!(
                "Hi {},\n\nYour payment for {} did not go through{}. \
                 Your registration is saved and you can retry the payment.\n\nOrder: {}\n",
                data.team_name,
                competitions,
                data.reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default(),
                order
            ),
        ),
        NotificationKind::PaymentReminder => (
            "RoboMania 2025: complete your payment".to_string(),
            format!(
                "Hi {},\n\nYour registration for {} is still awaiting payment of Rs. {}.\n",
                data.team_name, competitions, data.amount
            ),
        ),
    };

    if let Some(link) = &data.link {
        body.push_str(&format!("\n{}\n", link));
    }
    body.push_str("\nTeam RoboMania\n");

    EmailMessage {
        to: recipient.to_string(),
        subject,
        body_text: body,
        body_html: None,
    }
}

/// Handle to the notification queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<NotificationJob>,
    shutdown: CancellationToken,
}

impl NotificationDispatcher {
    /// Spawns the delivery worker and returns the handle feeding it.
    pub fn start(
        provider: Arc<dyn EmailProvider>,
        config: &NotificationQueueConfig,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotificationJob>(config.queue_size.max(1));
        let shutdown = CancellationToken::new();
        let max_elapsed = Duration::from_secs(config.max_retry_secs);

        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Notification worker shutting down");
                        break;
                    }
                    job = rx.recv() => {
                        match job {
                            Some(job) => {
                                let provider = provider.clone();
                                tokio::spawn(async move {
                                    deliver(provider, job, max_elapsed).await;
                                });
                            }
                            None => {
                                tracing::info!("Notification queue closed, worker exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self { tx, shutdown }
    }

    /// Enqueues a notification. Returns `false` when the job was dropped.
    pub fn send(&self, kind: NotificationKind, recipient: &str, data: TemplateData) -> bool {
        let job = NotificationJob {
            kind,
            recipient: recipient.to_string(),
            data,
        };

        match self.tx.try_send(job) {
            Ok(()) => {
                metrics::counter!("notifications_enqueued_total", "kind" => kind.as_str())
                    .increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("notifications_dropped_total", "kind" => kind.as_str())
                    .increment(1);
                tracing::warn!(
                    kind = kind.as_str(),
                    recipient,
                    error = %e,
                    "Notification queue unavailable, dropping job"
                );
                false
            }
        }
    }

    pub fn shutdown(&self) {
        tracing::info!("Initiating notification worker shutdown");
        self.shutdown.cancel();
    }
}

async fn deliver(provider: Arc<dyn EmailProvider>, job: NotificationJob, max_elapsed: Duration) {
    let message = render(job.kind, &job.recipient, &job.data);

    let policy = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    let result = retry(policy, || async {
        provider.send(&message).await.map_err(|e| {
            if e.is_permanent() {
                backoff::Error::permanent(e)
            } else {
                tracing::warn!(to = %message.to, error = %e, "Email delivery failed, retrying");
                backoff::Error::transient(e)
            }
        })
    })
    .await;

    match result {
        Ok(()) => {
            metrics::counter!("notifications_sent_total", "kind" => job.kind.as_str())
                .increment(1);
        }
        Err(e) => {
            metrics::counter!("notifications_failed_total", "kind" => job.kind.as_str())
                .increment(1);
            tracing::error!(
                kind = job.kind.as_str(),
                to = %job.recipient,
                error = %e,
                "Email delivery abandoned"
            );
        }
    }
}
