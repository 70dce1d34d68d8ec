use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Tunnel,
    Tls,
    Http,
    Timeout,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Tunnel => "tunnel",
            ErrorKind::Tls => "tls",
            ErrorKind::Http => "http",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Persistence => "persistence",
        };
        f.write_str(label)
    }
}

/// Failure of a single probe. Never escapes the probe's own task.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to connect to proxy {proxy}: {source}")]
    ProxyConnect {
        proxy: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CONNECT exchange with proxy failed: {0}")]
    TunnelIo(#[source] std::io::Error),

    #[error("proxy closed the connection before the CONNECT response ended")]
    ProxyClosed,

    #[error("malformed CONNECT status line: {0:?}")]
    MalformedStatus(String),

    #[error("failed to prepare TLS session: {0}")]
    TlsSetup(#[from] openssl::error::ErrorStack),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] openssl::ssl::Error),

    #[error("transport is not in a state that allows {0}")]
    TransportState(&'static str),

    #[error("HTTP exchange failed: {0}")]
    Http(#[source] std::io::Error),

    #[error("probe exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("failed to persist response to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProbeError::ProxyConnect { .. }
            | ProbeError::TunnelIo(_)
            | ProbeError::ProxyClosed
            | ProbeError::MalformedStatus(_) => ErrorKind::Tunnel,
            ProbeError::TlsSetup(_) | ProbeError::TlsHandshake(_) | ProbeError::TransportState(_) => {
                ErrorKind::Tls
            }
            ProbeError::Http(_) => ErrorKind::Http,
            ProbeError::Timeout(_) => ErrorKind::Timeout,
            ProbeError::Persistence { .. } => ErrorKind::Persistence,
        }
    }
}

/// Rejected top-level configuration; reported before any network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("url must start with https:// (got {0:?})")]
    UrlScheme(String),

    #[error("url {0:?} has no host")]
    MissingHost(String),

    #[error("invalid ip range {0:?}")]
    InvalidRange(String),

    #[error("end port {end} must be greater than start port {start}")]
    PortOrder { start: u16, end: u16 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_stage() {
        assert_eq!(ProbeError::ProxyClosed.kind(), ErrorKind::Tunnel);
        assert_eq!(
            ProbeError::MalformedStatus("garbage".into()).kind(),
            ErrorKind::Tunnel
        );
        assert_eq!(
            ProbeError::Http(std::io::ErrorKind::ConnectionReset.into()).kind(),
            ErrorKind::Http
        );
        assert_eq!(
            ProbeError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(ErrorKind::Persistence.to_string(), "persistence");
    }
}
