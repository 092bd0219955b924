use crate::api::Mailer;
use anyhow::{Context as _, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// One error-level record, formatted for the admin alert email at the moment
/// it was emitted.
#[derive(Debug)]
struct AlertRecord {
    subject: String,
    body: String,
}

/// Receiving end of the error-record channel; every ERROR record lands here
/// as soon as it is emitted.
pub struct AlertStream {
    rx: mpsc::UnboundedReceiver<AlertRecord>,
}

struct AlertLayer {
    tx: mpsc::UnboundedSender<AlertRecord>,
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let subject = format!("Error Alert ERROR in {}", meta.target());
        let body = format!(
            "An error has occurred at {}.\n\nLogger: {}\nLevel: ERROR\n\nMessage:\n{}\n\nSource:\n{}:{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            meta.target(),
            visitor.message,
            meta.file().unwrap_or("unknown"),
            meta.line().unwrap_or(0),
        );
        let _ = self.tx.send(AlertRecord { subject, body });
    }
}

/// Install the subscriber for one job run: timestamped lines to stderr and to
/// an append-mode per-job log file, with every ERROR record forwarded into the
/// returned alert stream as it happens.
pub fn init(job: &str, log_dir: &Path) -> Result<AlertStream> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("{}.log", job));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(AlertLayer { tx })
        .try_init()
        .ok();

    Ok(AlertStream { rx })
}

/// Email each error record to the admin distribution list the moment it
/// arrives, one message per record. Runs until `stop` fires, then drains
/// whatever is still queued before returning. A failure to send is printed
/// locally and otherwise swallowed so a broken mailer can never cascade into
/// the run's own error handling.
pub async fn forward_alerts(
    mailer: Arc<dyn Mailer>,
    admins: Vec<String>,
    job: String,
    mut stream: AlertStream,
    mut stop: oneshot::Receiver<()>,
) {
    if admins.is_empty() {
        return;
    }
    let to = admins.join(", ");

    loop {
        tokio::select! {
            record = stream.rx.recv() => match record {
                Some(record) => send_alert(mailer.as_ref(), &to, &job, record).await,
                None => return,
            },
            _ = &mut stop => break,
        }
    }
    while let Ok(record) = stream.rx.try_recv() {
        send_alert(mailer.as_ref(), &to, &job, record).await;
    }
}

async fn send_alert(mailer: &dyn Mailer, to: &str, job: &str, record: AlertRecord) {
    if !mailer.send_message(to, &record.subject, &record.body).await {
        eprintln!("Failed to send the error alert email for {}", job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CountingMailer {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl Mailer for CountingMailer {
        async fn send_message(&self, _to: &str, subject: &str, body: &str) -> bool {
            self.sent.lock().unwrap().push((subject.to_string(), body.to_string()));
            true
        }
    }

    #[tokio::test]
    async fn each_error_record_becomes_its_own_email() {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(AlertLayer { tx });

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("first failure");
            tracing::info!("not alert-worthy");
            tracing::error!("second failure");
        });

        // Both records are queued the moment they were emitted, before any
        // mailer runs.
        assert_eq!(rx.len(), 2);

        let sent = Arc::new(Mutex::new(Vec::new()));
        let mailer: Arc<dyn Mailer> = Arc::new(CountingMailer { sent: Arc::clone(&sent) });
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(forward_alerts(
            mailer,
            vec!["admin@example.com".to_string()],
            "test-job".to_string(),
            AlertStream { rx },
            stop_rx,
        ));
        stop_tx.send(()).ok();
        task.await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.contains("first failure"));
        assert!(sent[1].1.contains("second failure"));
        assert!(sent[0].0.starts_with("Error Alert ERROR in "));
    }

    #[tokio::test]
    async fn info_records_are_not_forwarded() {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(AlertLayer { tx });
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("routine progress");
            tracing::warn!("recoverable hiccup");
        });
        assert_eq!(rx.len(), 0);
    }
}
