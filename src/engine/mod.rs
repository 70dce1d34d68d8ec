pub mod pipeline;

use crate::error::ProbeError;
use crate::model::{
    Config, ProbeConfig, ProbeFailure, ProbeOutcome, ProbeReport, ProbeStage, ScanSummary, Target,
    TerminalState,
};
use crate::output::OutputChannel;
use crate::util::{now_iso8601, ProbeId};
use anyhow::Context;
use futures::stream::{FuturesUnordered, Stream};
use futures::{FutureExt, StreamExt};
use pipeline::{ProxyProcessor, TargetProcessor};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Per-probe state threaded through every stage: the correlation id and the
/// last stage entered, which survives cancellation of the probe future.
#[derive(Debug)]
pub struct ProbeContext {
    pub id: ProbeId,
    stage: Mutex<ProbeStage>,
}

impl ProbeContext {
    pub fn new(id: ProbeId) -> Self {
        Self {
            id,
            stage: Mutex::new(ProbeStage::Pending),
        }
    }

    pub fn enter(&self, stage: ProbeStage) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = stage;
        debug!(%stage, "stage");
    }

    pub fn stage(&self) -> ProbeStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Engine {
    cfg: Arc<ProbeConfig>,
    processor: Arc<dyn TargetProcessor>,
    sem: Arc<Semaphore>,
    output: Option<OutputChannel>,
}

impl Engine {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let probe_cfg = Arc::new(cfg.probe.clone());
        let processor = ProxyProcessor::new(cfg.proxy.clone(), probe_cfg.clone())
            .context("failed to initialise TLS client")?;
        Ok(Self::with_processor(probe_cfg, Arc::new(processor)))
    }

    pub fn with_processor(cfg: Arc<ProbeConfig>, processor: Arc<dyn TargetProcessor>) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(cfg.max_concurrency.max(1))),
            cfg,
            processor,
            output: None,
        }
    }

    pub fn with_output(mut self, output: OutputChannel) -> Self {
        self.output = Some(output);
        self
    }

    /// Probes every target, at most `max_concurrency` at a time. Returns once
    /// each target has reached a terminal state.
    #[instrument(skip_all)]
    pub async fn run<S>(&self, mut targets: S) -> anyhow::Result<ScanSummary>
    where
        S: Stream<Item = Target> + Unpin,
    {
        let mut tasks = FuturesUnordered::new();
        let mut summary = ScanSummary::default();

        while let Some(target) = targets.next().await {
            let permit = self.sem.clone().acquire_owned().await?;
            let processor = self.processor.clone();
            let budget = self.cfg.timeout;
            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                run_probe(processor.as_ref(), target, budget).await
            }));

            while let Some(Some(joined)) = tasks.next().now_or_never() {
                self.finish(joined, &mut summary).await;
            }
        }

        while let Some(joined) = tasks.next().await {
            self.finish(joined, &mut summary).await;
        }

        info!(
            total = summary.total,
            completed = summary.completed,
            refused = summary.refused,
            failed = summary.failed,
            timed_out = summary.timed_out,
            saved = summary.saved,
            "scan finished"
        );
        Ok(summary)
    }

    async fn finish(&self, joined: Result<ProbeOutcome, JoinError>, summary: &mut ScanSummary) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "probe task aborted");
                summary.total += 1;
                summary.failed += 1;
                return;
            }
        };

        summary.record(&outcome);
        if let Some(output) = &self.output {
            if let Err(err) = output.emit(outcome).await {
                warn!(error = %err, "failed to report outcome");
            }
        }
    }
}

/// Drives one target to a terminal state under `budget`. Errors and timeouts
/// end up in the returned outcome. Everything logged while the probe runs is
/// inside a `probe` span carrying its id and target.
pub async fn run_probe(
    processor: &dyn TargetProcessor,
    target: Target,
    budget: Duration,
) -> ProbeOutcome {
    let ctx = ProbeContext::new(ProbeId::generate());
    let span = info_span!("probe", id = %ctx.id, addr = %target);
    drive(processor, target, budget, ctx).instrument(span).await
}

async fn drive(
    processor: &dyn TargetProcessor,
    target: Target,
    budget: Duration,
    ctx: ProbeContext,
) -> ProbeOutcome {
    debug!("probe admitted");
    let result = match timeout(budget, processor.process(&target, &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(budget)),
    };

    match result {
        Ok(report) => outcome(target, &ctx, TerminalState::Completed, report, None),
        Err(err) => {
            let state = if matches!(err, ProbeError::Timeout(_)) {
                TerminalState::TimedOut
            } else {
                TerminalState::Failed
            };
            error!(
                stage = %ctx.stage(),
                kind = %err.kind(),
                "{}",
                err
            );
            let failure = ProbeFailure {
                kind: err.kind(),
                message: err.to_string(),
            };
            outcome(target, &ctx, state, ProbeReport::default(), Some(failure))
        }
    }
}

fn outcome(
    target: Target,
    ctx: &ProbeContext,
    state: TerminalState,
    report: ProbeReport,
    error: Option<ProbeFailure>,
) -> ProbeOutcome {
    ProbeOutcome {
        target,
        probe_id: ctx.id.to_string(),
        state,
        stage: ctx.stage(),
        tunnel_status: report.tunnel_status,
        http_status: report.http_status,
        saved_to: report.saved_to,
        tls: report.tls,
        error,
        timestamp: now_iso8601(),
    }
}
