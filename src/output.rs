pub mod sink;

use crate::model::{OutputFormat, ProbeOutcome};
use tokio::sync::mpsc;

pub use sink::OutputSink;

/// Hands outcomes to a blocking writer task so stdout never stalls a probe.
#[derive(Clone)]
pub struct OutputChannel {
    inner: std::sync::Arc<OutputInner>,
}

struct OutputInner {
    tx: tokio::sync::Mutex<Option<mpsc::Sender<Box<ProbeOutcome>>>>,
    handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OutputChannel {
    pub fn new(format: OutputFormat) -> anyhow::Result<Self> {
        let (tx, mut rx) = mpsc::channel::<Box<ProbeOutcome>>(1024);
        let handle = tokio::task::spawn_blocking(move || {
            let mut sink = OutputSink::new(format, std::io::stdout());
            while let Some(outcome) = rx.blocking_recv() {
                if let Err(err) = sink.write_outcome(&outcome) {
                    tracing::warn!(error = %err, "failed to write probe outcome");
                }
            }
            sink.flush();
        });

        Ok(Self {
            inner: std::sync::Arc::new(OutputInner {
                tx: tokio::sync::Mutex::new(Some(tx)),
                handle: tokio::sync::Mutex::new(Some(handle)),
            }),
        })
    }

    pub async fn emit(&self, outcome: ProbeOutcome) -> anyhow::Result<()> {
        let guard = self.inner.tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(Box::new(outcome))
                .await
                .map_err(|err| anyhow::anyhow!("output worker not available: {err}"))?
        } else {
            anyhow::bail!("output worker not available; dropping probe outcome");
        }
        Ok(())
    }

    /// Closes the channel and waits for buffered outcomes to be written.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.inner.tx.lock().await.take();

        if let Some(handle) = self.inner.handle.lock().await.take() {
            handle
                .await
                .map_err(|err| anyhow::anyhow!("failed to join output worker: {err}"))?;
        }

        Ok(())
    }
}
