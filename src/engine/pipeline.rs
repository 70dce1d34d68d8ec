use crate::error::ProbeError;
use crate::http::{self, HttpExchange};
use crate::model::{ProbeConfig, ProbeReport, ProbeStage, ProxyEndpoint, Target, TlsInfo};
use crate::persist::{persist, SavePolicy};
use crate::tls::TlsUpgrader;
use crate::transport::Transport;
use crate::tunnel;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::ProbeContext;

/// Runs the whole pipeline for one target. Implementations report failures
/// through the returned error and never panic on network input.
#[async_trait]
pub trait TargetProcessor: Send + Sync {
    async fn process(&self, target: &Target, ctx: &ProbeContext) -> Result<ProbeReport, ProbeError>;
}

/// CONNECT tunnel, in-place TLS, HEAD request, then conditional persistence.
pub struct ProxyProcessor {
    proxy: ProxyEndpoint,
    cfg: Arc<ProbeConfig>,
    tls: TlsUpgrader,
    policy: SavePolicy,
}

impl ProxyProcessor {
    pub fn new(proxy: ProxyEndpoint, cfg: Arc<ProbeConfig>) -> Result<Self, ProbeError> {
        Ok(Self {
            tls: TlsUpgrader::new(&cfg)?,
            policy: SavePolicy::from_config(&cfg),
            proxy,
            cfg,
        })
    }

    async fn exchange(
        &self,
        transport: &mut Transport,
        ctx: &ProbeContext,
    ) -> Result<(TlsInfo, HttpExchange), ProbeError> {
        ctx.enter(ProbeStage::TlsUpgrading);
        let tls = self.tls.upgrade(transport).await?;
        ctx.enter(ProbeStage::TlsEstablished);

        let exchange = http::probe(transport, &self.cfg, ctx).await?;
        Ok((tls, exchange))
    }
}

#[async_trait]
impl TargetProcessor for ProxyProcessor {
    async fn process(&self, target: &Target, ctx: &ProbeContext) -> Result<ProbeReport, ProbeError> {
        ctx.enter(ProbeStage::TunnelPending);
        let (mut transport, tunnel) = tunnel::establish(&self.proxy, target).await?;
        ctx.enter(ProbeStage::TunnelEstablished);

        let mut report = ProbeReport {
            tunnel_status: Some(tunnel.status_code.clone()),
            ..ProbeReport::default()
        };
        if !tunnel.is_established() {
            info!("tunnel to {} refused with {}", target, tunnel.status_code);
            transport.close().await;
            return Ok(report);
        }

        let result = self.exchange(&mut transport, ctx).await;
        transport.close().await;
        let (tls, exchange) = result?;
        report.tls = Some(tls);
        report.http_status = exchange.status_code.clone();

        if let Some(code) = exchange
            .status_code
            .as_deref()
            .filter(|code| self.policy.matches(code))
        {
            ctx.enter(ProbeStage::Persisting);
            let path = persist(&self.cfg.output_base, code, target, &exchange.raw, &ctx.id).await?;
            report.saved_to = Some(path);
        }

        Ok(report)
    }
}
