use clap::{ArgAction, Parser};
use proxy_https_hunter::error::ConfigError;
use proxy_https_hunter::input::{parse_network, split_url};
use proxy_https_hunter::model::{
    Config, OutputConfig, OutputFormat, PortRange, ProbeConfig, ProxyEndpoint, TargetSpec,
};
use proxy_https_hunter::util::default_output_base;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Hunt for HTTPS services reachable through a CONNECT proxy",
    long_about = None
)]
pub struct Cli {
    /// HTTP proxy host
    #[arg(long = "proxy-host", value_name = "HOST")]
    pub proxy_host: String,

    /// HTTP proxy port
    #[arg(long = "proxy-port", value_name = "PORT")]
    pub proxy_port: u16,

    /// Target HTTPS URL; its host is used for SNI and its path is requested
    #[arg(long = "url", value_name = "URL")]
    pub url: String,

    /// Host header sent to the target instead of the URL host
    #[arg(long = "host-header", value_name = "HOST")]
    pub host_header: Option<String>,

    /// Network to scan, in CIDR notation or a single address
    #[arg(long = "ip-range", value_name = "RANGE")]
    pub ip_range: String,

    /// First port to scan
    #[arg(long = "start-port", value_name = "PORT")]
    pub start_port: u16,

    /// Port to stop at (not inclusive); only the start port when omitted
    #[arg(long = "end-port", value_name = "PORT")]
    pub end_port: Option<u16>,

    /// Max probes in flight
    #[arg(long = "max-concur", value_name = "NUM", default_value_t = 20)]
    pub max_concurrency: usize,

    /// Timeout for each probe in seconds
    #[arg(long = "timeout", value_name = "SEC", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Ignore certificate errors
    #[arg(long = "ignore-cert", action = ArgAction::SetTrue)]
    pub ignore_cert: bool,

    /// Save the response if the status is 200 (default)
    #[arg(long = "save-200", action = ArgAction::SetTrue, overrides_with = "no_save_200")]
    pub save_200: bool,

    /// Do not save 200 responses
    #[arg(long = "no-save-200", action = ArgAction::SetTrue, overrides_with = "save_200")]
    pub no_save_200: bool,

    /// Save the response if the status is 30x
    #[arg(long = "save-30x", action = ArgAction::SetTrue)]
    pub save_30x: bool,

    /// Directory for saved responses; defaults to the scan start time as a Unix timestamp
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print one line per probed target to stdout
    #[arg(long = "report", value_name = "FORMAT")]
    pub report: Option<OutputFormat>,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<Config> {
        let (server_name, path) = split_url(&self.url)?;
        let network = parse_network(&self.ip_range)?;

        if let Some(end) = self.end_port {
            if end <= self.start_port {
                return Err(ConfigError::PortOrder {
                    start: self.start_port,
                    end,
                }
                .into());
            }
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Zero("max concurrency").into());
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Zero("timeout").into());
        }

        let output_base = self
            .output_dir
            .unwrap_or_else(|| PathBuf::from(default_output_base()));

        Ok(Config {
            proxy: ProxyEndpoint {
                host: self.proxy_host,
                port: self.proxy_port,
            },
            probe: ProbeConfig {
                server_name,
                path,
                host_header: self.host_header,
                ignore_cert_errors: self.ignore_cert,
                save_on_200: self.save_200 || !self.no_save_200,
                save_on_30x: self.save_30x,
                output_base,
                timeout: Duration::from_secs(self.timeout_secs),
                max_concurrency: self.max_concurrency,
            },
            targets: TargetSpec {
                network,
                ports: PortRange {
                    start: self.start_port,
                    end: self.end_port,
                },
            },
            output: OutputConfig {
                format: self.report,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<Config> {
        let mut args = vec![
            "proxy-https-hunter",
            "--proxy-host",
            "proxy.internal",
            "--proxy-port",
            "3128",
            "--url",
            "https://portal.example/status",
            "--ip-range",
            "10.0.0.0/30",
            "--start-port",
            "443",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)?.into_config()
    }

    #[test]
    fn applies_defaults() {
        let cfg = parse(&[]).unwrap();
        assert_eq!(cfg.proxy.to_string(), "proxy.internal:3128");
        assert_eq!(cfg.probe.server_name, "portal.example");
        assert_eq!(cfg.probe.path, "/status");
        assert_eq!(cfg.probe.max_concurrency, 20);
        assert_eq!(cfg.probe.timeout, Duration::from_secs(60));
        assert!(cfg.probe.save_on_200);
        assert!(!cfg.probe.save_on_30x);
        assert!(!cfg.probe.ignore_cert_errors);
        assert_eq!(cfg.targets.ports.ports(), vec![443]);
        assert!(cfg.output.format.is_none());
    }

    #[test]
    fn toggles_save_policy() {
        let cfg = parse(&["--no-save-200", "--save-30x"]).unwrap();
        assert!(!cfg.probe.save_on_200);
        assert!(cfg.probe.save_on_30x);
    }

    #[test]
    fn last_save_200_flag_wins() {
        let cfg = parse(&["--save-200", "--no-save-200"]).unwrap();
        assert!(!cfg.probe.save_on_200);

        let cfg = parse(&["--no-save-200", "--save-200"]).unwrap();
        assert!(cfg.probe.save_on_200);
    }

    #[test]
    fn rejects_plain_http_url() {
        let err = Cli::try_parse_from([
            "proxy-https-hunter",
            "--proxy-host",
            "p",
            "--proxy-port",
            "8080",
            "--url",
            "http://portal.example",
            "--ip-range",
            "10.0.0.1",
            "--start-port",
            "443",
        ])
        .unwrap()
        .into_config()
        .unwrap_err();
        assert!(err.to_string().contains("https://"));
    }

    #[test]
    fn rejects_inverted_port_range() {
        let err = parse(&["--end-port", "443"]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::PortOrder {
                start: 443,
                end: 443
            })
        );
    }

    #[test]
    fn honours_output_overrides() {
        let cfg = parse(&["--output-dir", "scan-a", "--report", "jsonl", "--end-port", "446"])
            .unwrap();
        assert_eq!(cfg.probe.output_base, PathBuf::from("scan-a"));
        assert_eq!(cfg.output.format, Some(OutputFormat::Jsonl));
        assert_eq!(cfg.targets.ports.len(), 3);
    }
}
