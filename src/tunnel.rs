use crate::error::ProbeError;
use crate::model::{ProxyEndpoint, Target, TunnelResult};
use crate::transport::Transport;
use crate::util::decode_lossy;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

const HEADER_END: &[u8] = b"\r\n\r\n";

pub fn connect_request(target: &Target) -> String {
    format!("CONNECT {} HTTP/1.1\r\n\r\n", target.authority())
}

/// Opens a connection to the proxy and asks it to tunnel to `target`.
///
/// A non-200 status is returned as a normal result; only transport failures
/// and unparseable responses are errors.
pub async fn establish(
    proxy: &ProxyEndpoint,
    target: &Target,
) -> Result<(Transport, TunnelResult), ProbeError> {
    let stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|source| ProbeError::ProxyConnect {
            proxy: proxy.to_string(),
            source,
        })?;
    let mut transport = Transport::new(stream);

    let request = connect_request(target);
    info!("{}", request.trim_end());
    let socket = transport
        .plain_mut()
        .ok_or(ProbeError::TransportState("a CONNECT request"))?;
    socket
        .get_mut()
        .write_all(request.as_bytes())
        .await
        .map_err(ProbeError::TunnelIo)?;

    let mut header = Vec::new();
    while !header.ends_with(HEADER_END) {
        let n = socket
            .read_until(b'\n', &mut header)
            .await
            .map_err(ProbeError::TunnelIo)?;
        if n == 0 {
            return Err(ProbeError::ProxyClosed);
        }
    }

    let text = decode_lossy(&header);
    let status_line = text.lines().next().unwrap_or_default();
    info!("{}", status_line);
    let status_code = parse_status_line(status_line)
        .ok_or_else(|| ProbeError::MalformedStatus(status_line.to_string()))?;

    Ok((
        transport,
        TunnelResult {
            status_code: status_code.to_string(),
        },
    ))
}

/// Second whitespace-separated token of `<version> <code> <reason>`.
pub fn parse_status_line(line: &str) -> Option<&str> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()
}
