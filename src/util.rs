use rand::{thread_rng, Rng};
use std::fmt;

/// Short correlation id attached to every log line a probe emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeId(String);

impl ProbeId {
    const LEN: usize = 5;

    pub fn generate() -> Self {
        let mut rng = thread_rng();
        let id = (0..Self::LEN)
            .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
            .collect();
        ProbeId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Scan-run directory name used when none is configured.
pub fn default_output_base() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Text form of raw bytes; invalid UTF-8 becomes U+FFFD.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_ids_are_short_hex() {
        let id = ProbeId::generate();
        assert_eq!(id.as_str().len(), 5);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn lossy_decode_replaces_invalid_bytes() {
        assert_eq!(decode_lossy(b"HTTP/1.1 200 \xffOK"), "HTTP/1.1 200 \u{fffd}OK");
    }

    #[test]
    fn default_base_is_unix_seconds() {
        let base = default_output_base();
        assert!(base.parse::<i64>().unwrap() > 1_600_000_000);
    }
}
