use crate::error::ProbeError;
use crate::model::{ProbeConfig, TlsInfo};
use crate::transport::Transport;
use crate::util::decode_lossy;
use openssl::ssl::{SslConnector, SslMethod, SslRef, SslVerifyMode};
use openssl::x509::X509NameRef;
use tracing::info;

/// Client-side TLS settings shared by every probe of a scan.
pub struct TlsUpgrader {
    connector: SslConnector,
    server_name: String,
    verify: bool,
}

impl TlsUpgrader {
    pub fn new(cfg: &ProbeConfig) -> Result<Self, ProbeError> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if cfg.ignore_cert_errors {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(Self {
            connector: builder.build(),
            server_name: cfg.server_name.clone(),
            verify: !cfg.ignore_cert_errors,
        })
    }

    /// Switches `transport` to TLS in place and reports what was negotiated.
    pub async fn upgrade(&self, transport: &mut Transport) -> Result<TlsInfo, ProbeError> {
        let ssl = self
            .connector
            .configure()?
            .verify_hostname(self.verify)
            .into_ssl(&self.server_name)?;

        transport.upgrade(ssl).await?;

        let info = transport.ssl().map(extract_tls_info).unwrap_or_default();
        info!(
            version = %info.version,
            cipher = %info.cipher,
            "TLS established with {}",
            self.server_name
        );
        Ok(info)
    }
}

fn extract_tls_info(ssl: &SslRef) -> TlsInfo {
    let mut info = TlsInfo {
        cipher: ssl
            .current_cipher()
            .map(|cipher| cipher.name().to_string())
            .unwrap_or_default(),
        version: ssl.version_str().to_string(),
        ..TlsInfo::default()
    };

    if let Some(cert) = ssl.peer_certificate() {
        info.cert_subject = format_x509_name(cert.subject_name());
        info.cert_issuer = format_x509_name(cert.issuer_name());
        info.cert_valid_from = cert.not_before().to_string();
        info.cert_valid_to = cert.not_after().to_string();
    }

    info
}

fn format_x509_name(name: &X509NameRef) -> String {
    name.entries()
        .filter_map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("UNKNOWN");
            let value = decode_lossy(entry.data().as_slice());
            (!value.is_empty()).then(|| format!("{key}={value}"))
        })
        .collect::<Vec<_>>()
        .join(", ")
}
