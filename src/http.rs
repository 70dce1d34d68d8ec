use crate::engine::ProbeContext;
use crate::error::ProbeError;
use crate::model::ProbeConfig;
use crate::util::decode_lossy;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0";

const READ_CHUNK: usize = 16 * 1024;

/// Everything the target sent back, decoded for logging and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExchange {
    pub raw: String,
    pub status_code: Option<String>,
}

impl HttpExchange {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let raw = decode_lossy(bytes);
        let status_code = status_code(&raw).map(str::to_string);
        Self { raw, status_code }
    }

    pub fn status_line(&self) -> &str {
        self.raw.lines().next().unwrap_or_default()
    }
}

pub fn head_request(cfg: &ProbeConfig) -> String {
    format!(
        "HEAD {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nUser-Agent: {}\r\n\r\n",
        cfg.path,
        cfg.host_header(),
        USER_AGENT
    )
}

/// Status code token of the first response line, if there is one.
pub fn status_code(response: &str) -> Option<&str> {
    response.lines().next()?.split_whitespace().nth(1)
}

pub async fn send_head<S>(stream: &mut S, cfg: &ProbeConfig) -> Result<(), ProbeError>
where
    S: AsyncWrite + Unpin,
{
    let request = head_request(cfg);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(ProbeError::Http)?;
    stream.flush().await.map_err(ProbeError::Http)
}

/// Reads until the peer closes its side of the connection.
pub async fn read_response<S>(stream: &mut S) -> Result<Vec<u8>, ProbeError>
where
    S: AsyncRead + Unpin,
{
    let mut response = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await.map_err(ProbeError::Http)?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&chunk[..n]);
    }
    Ok(response)
}

/// HEAD request and full response over an already-established session.
pub async fn probe<S>(
    stream: &mut S,
    cfg: &ProbeConfig,
    ctx: &ProbeContext,
) -> Result<HttpExchange, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    send_head(stream, cfg).await?;
    ctx.enter(crate::model::ProbeStage::HttpSent);

    let bytes = read_response(stream).await?;
    let exchange = HttpExchange::from_bytes(&bytes);
    info!(bytes = bytes.len(), "{}", exchange.status_line());
    Ok(exchange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn cfg(host_header: Option<&str>) -> ProbeConfig {
        ProbeConfig {
            server_name: "portal.example".into(),
            path: "/login?next=/".into(),
            host_header: host_header.map(str::to_string),
            ignore_cert_errors: true,
            save_on_200: true,
            save_on_30x: false,
            output_base: PathBuf::from("out"),
            timeout: Duration::from_secs(5),
            max_concurrency: 1,
        }
    }

    #[test]
    fn builds_head_request() {
        let request = head_request(&cfg(None));
        assert!(request.starts_with("HEAD /login?next=/ HTTP/1.1\r\n"));
        assert!(request.contains("\r\nHost: portal.example\r\n"));
        assert!(request.contains("\r\nConnection: close\r\n"));
        assert!(request.contains(&format!("\r\nUser-Agent: {USER_AGENT}\r\n")));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn host_header_override_wins() {
        let request = head_request(&cfg(Some("intranet.local")));
        assert!(request.contains("\r\nHost: intranet.local\r\n"));
        assert!(!request.contains("portal.example"));
    }

    #[test]
    fn extracts_status_codes() {
        assert_eq!(status_code("HTTP/1.1 301 Moved Permanently\r\n"), Some("301"));
        assert_eq!(status_code("HTTP/1.0 200\r\n"), Some("200"));
        assert_eq!(status_code(""), None);
        assert_eq!(status_code("garbage"), None);
    }

    #[tokio::test]
    async fn reads_until_close() {
        let mut data: &[u8] = b"HTTP/1.1 200 OK\r\nServer: test\r\n\r\n";
        let bytes = read_response(&mut data).await.unwrap();
        let exchange = HttpExchange::from_bytes(&bytes);
        assert_eq!(exchange.status_code.as_deref(), Some("200"));
        assert_eq!(exchange.status_line(), "HTTP/1.1 200 OK");
    }

    #[tokio::test]
    async fn empty_response_has_no_status() {
        let mut data: &[u8] = b"";
        let bytes = read_response(&mut data).await.unwrap();
        let exchange = HttpExchange::from_bytes(&bytes);
        assert!(exchange.status_code.is_none());
        assert_eq!(exchange.status_line(), "");
    }

    #[tokio::test]
    async fn writes_request_to_stream() {
        let mut sink = Vec::new();
        send_head(&mut sink, &cfg(None)).await.unwrap();
        assert_eq!(sink, head_request(&cfg(None)).into_bytes());
    }
}
