use crate::error::ConfigError;
use crate::model::{Target, TargetSpec};
use ipnet::IpNet;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Splits `https://host/path` into the server name and request path.
pub fn split_url(url: &str) -> Result<(String, String), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .ok_or_else(|| ConfigError::UrlScheme(url.to_string()))?;
    let (server_name, path) = match rest.split_once('/') {
        Some((host, path)) => (host, format!("/{path}")),
        None => (rest, "/".to_string()),
    };
    if server_name.is_empty() {
        return Err(ConfigError::MissingHost(url.to_string()));
    }
    Ok((server_name.to_string(), path))
}

/// CIDR notation, or a bare address treated as a single host.
pub fn parse_network(range: &str) -> Result<IpNet, ConfigError> {
    let range = range.trim();
    if let Ok(net) = range.parse::<IpNet>() {
        return Ok(net);
    }
    range
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| ConfigError::InvalidRange(range.to_string()))
}

/// Every usable host of the network crossed with every port, host-major.
pub fn enumerate(spec: &TargetSpec) -> impl Iterator<Item = Target> + Send + 'static {
    let ports = spec.ports.ports();
    spec.network.hosts().flat_map(move |ip| {
        let address = ip.to_string();
        ports
            .clone()
            .into_iter()
            .map(move |port| Target::new(address.clone(), port))
    })
}

/// Feeds targets through a bounded channel so large ranges are produced as
/// the scheduler consumes them.
pub fn stream_targets(spec: &TargetSpec) -> ReceiverStream<Target> {
    let (tx, rx) = mpsc::channel(256);
    let targets = enumerate(spec);
    tokio::spawn(async move {
        for target in targets {
            if tx.send(target).await.is_err() {
                tracing::debug!("target consumer went away");
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}
