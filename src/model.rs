use crate::error::ErrorKind;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One `(address, port)` pair to probe through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
    pub port: u16,
}

impl Target {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `host:port` as written in a CONNECT request line.
    pub fn authority(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// SNI value, certificate name and default Host header.
    pub server_name: String,
    pub path: String,
    pub host_header: Option<String>,
    pub ignore_cert_errors: bool,
    pub save_on_200: bool,
    pub save_on_30x: bool,
    pub output_base: PathBuf,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl ProbeConfig {
    pub fn host_header(&self) -> &str {
        self.host_header.as_deref().unwrap_or(&self.server_name)
    }
}

/// Ports `start..end`, or just `start` when no end is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: Option<u16>,
}

impl PortRange {
    pub fn ports(&self) -> Vec<u16> {
        match self.end {
            Some(end) => (self.start..end).collect(),
            None => vec![self.start],
        }
    }

    pub fn len(&self) -> usize {
        match self.end {
            Some(end) => usize::from(end.saturating_sub(self.start)),
            None => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub network: IpNet,
    pub ports: PortRange,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub proxy: ProxyEndpoint,
    pub probe: ProbeConfig,
    pub targets: TargetSpec,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Status line of the proxy's CONNECT response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelResult {
    pub status_code: String,
}

impl TunnelResult {
    pub fn is_established(&self) -> bool {
        self.status_code == "200"
    }
}

/// Last non-terminal state a probe entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    Pending,
    TunnelPending,
    TunnelEstablished,
    TlsUpgrading,
    TlsEstablished,
    HttpSent,
    Persisting,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProbeStage::Pending => "pending",
            ProbeStage::TunnelPending => "tunnel-pending",
            ProbeStage::TunnelEstablished => "tunnel-established",
            ProbeStage::TlsUpgrading => "tls-upgrading",
            ProbeStage::TlsEstablished => "tls-established",
            ProbeStage::HttpSent => "http-sent",
            ProbeStage::Persisting => "persisting",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Completed,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TlsInfo {
    pub version: String,
    pub cipher: String,
    pub cert_subject: String,
    pub cert_issuer: String,
    pub cert_valid_from: String,
    pub cert_valid_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// What a probe observed before reaching a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub tunnel_status: Option<String>,
    pub http_status: Option<String>,
    pub tls: Option<TlsInfo>,
    pub saved_to: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub target: Target,
    pub probe_id: String,
    pub state: TerminalState,
    pub stage: ProbeStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tunnel_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeFailure>,
    pub timestamp: String,
}

impl ProbeOutcome {
    pub fn tunnel_refused(&self) -> bool {
        matches!(self.tunnel_status.as_deref(), Some(code) if code != "200")
    }
}

/// Per-scan tallies, one terminal outcome per target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub completed: usize,
    pub refused: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub saved: usize,
}

impl ScanSummary {
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        self.total += 1;
        match outcome.state {
            TerminalState::Completed => self.completed += 1,
            TerminalState::Failed => self.failed += 1,
            TerminalState::TimedOut => self.timed_out += 1,
        }
        if outcome.tunnel_refused() {
            self.refused += 1;
        }
        if outcome.saved_to.is_some() {
            self.saved += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_brackets_ipv6() {
        assert_eq!(Target::new("10.0.0.1", 443).authority(), "10.0.0.1:443");
        assert_eq!(Target::new("fe80::1", 8443).authority(), "[fe80::1]:8443");
    }

    #[test]
    fn single_port_without_end() {
        let range = PortRange {
            start: 443,
            end: None,
        };
        assert_eq!(range.ports(), vec![443]);

        let range = PortRange {
            start: 8000,
            end: Some(8003),
        };
        assert_eq!(range.ports(), vec![8000, 8001, 8002]);
    }

    #[test]
    fn host_header_falls_back_to_server_name() {
        let mut cfg = ProbeConfig {
            server_name: "example.com".into(),
            path: "/".into(),
            host_header: None,
            ignore_cert_errors: false,
            save_on_200: true,
            save_on_30x: false,
            output_base: PathBuf::from("out"),
            timeout: Duration::from_secs(1),
            max_concurrency: 1,
        };
        assert_eq!(cfg.host_header(), "example.com");
        cfg.host_header = Some("internal.example".into());
        assert_eq!(cfg.host_header(), "internal.example");
    }
}
