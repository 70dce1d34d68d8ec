use crate::model::{OutputFormat, ProbeOutcome, TerminalState};
use std::io::{BufWriter, Write};

pub struct OutputSink<W: Write> {
    format: OutputFormat,
    writer: BufWriter<W>,
}

impl<W: Write> OutputSink<W> {
    pub fn new(format: OutputFormat, writer: W) -> Self {
        Self {
            format,
            writer: BufWriter::new(writer),
        }
    }

    pub fn write_outcome(&mut self, outcome: &ProbeOutcome) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Jsonl => {
                let line = serde_json::to_string(outcome)?;
                writeln!(self.writer, "{line}")?;
            }
            OutputFormat::Pretty => {
                writeln!(
                    self.writer,
                    "[{}] {} -> {}",
                    outcome.probe_id,
                    outcome.target,
                    outcome.status_text()
                )?;
                if let Some(code) = &outcome.tunnel_status {
                    writeln!(self.writer, "  tunnel: {code}")?;
                }
                if let Some(code) = &outcome.http_status {
                    writeln!(self.writer, "  http: {code}")?;
                }
                if let Some(tls) = &outcome.tls {
                    writeln!(self.writer, "  tls: {} {}", tls.version, tls.cipher)?;
                }
                if let Some(path) = &outcome.saved_to {
                    writeln!(self.writer, "  saved: {}", path.display())?;
                }
                if let Some(err) = &outcome.error {
                    writeln!(
                        self.writer,
                        "  error: [{}@{}] {}",
                        err.kind, outcome.stage, err.message
                    )?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(err) => panic!("flush failed: {err}"),
        }
    }
}

impl ProbeOutcome {
    fn status_text(&self) -> &'static str {
        match self.state {
            TerminalState::Completed if self.tunnel_refused() => "refused",
            TerminalState::Completed => "completed",
            TerminalState::Failed => "failed",
            TerminalState::TimedOut => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{ProbeFailure, ProbeStage, Target};
    use std::path::PathBuf;

    fn saved_outcome() -> ProbeOutcome {
        ProbeOutcome {
            target: Target::new("198.51.100.4", 443),
            probe_id: "a1b2c".into(),
            state: TerminalState::Completed,
            stage: ProbeStage::Persisting,
            tunnel_status: Some("200".into()),
            http_status: Some("200".into()),
            saved_to: Some(PathBuf::from("out/200/198.51.100.4_443.txt")),
            tls: None,
            error: None,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn jsonl_skips_absent_fields() {
        let mut sink = OutputSink::new(OutputFormat::Jsonl, Vec::new());
        sink.write_outcome(&saved_outcome()).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(value["state"], "completed");
        assert_eq!(value["stage"], "persisting");
        assert_eq!(value["target"]["address"], "198.51.100.4");
        assert!(value.get("error").is_none());
        assert!(value.get("tls").is_none());
    }

    #[test]
    fn pretty_shows_error_stage() {
        let mut outcome = saved_outcome();
        outcome.state = TerminalState::Failed;
        outcome.stage = ProbeStage::TlsUpgrading;
        outcome.http_status = None;
        outcome.saved_to = None;
        outcome.error = Some(ProbeFailure {
            kind: ErrorKind::Tls,
            message: "TLS handshake failed".into(),
        });

        let mut sink = OutputSink::new(OutputFormat::Pretty, Vec::new());
        sink.write_outcome(&outcome).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.starts_with("[a1b2c] 198.51.100.4:443 -> failed\n"));
        assert!(text.contains("  error: [tls@tls-upgrading] TLS handshake failed\n"));
    }
}
