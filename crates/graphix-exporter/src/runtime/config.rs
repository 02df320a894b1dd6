use crate::runtime::logging::LoggingOptions;
use graphix_core::{Command, FrameFormat, ScrapeConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Label names used by the exporter's own series.
const RESERVED_LABELS: [&str; 4] = ["status", "kind", "name", "version"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// YAML layout of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    global: GlobalSection,
    graphix: GraphixSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GlobalSection {
    http_server_port: Option<u16>,
    bind_address: Option<String>,
    /// Seconds between scrapes.
    scrap_interval: Option<f64>,
    max_backoff: Option<f64>,
    reject_non_positive: Option<bool>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GraphixSection {
    port: Option<String>,
    baudrate: Option<u32>,
    timeout_ms: Option<u64>,
    frame: Option<FrameFormat>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub metrics_addr: String,
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    pub interval: Duration,
    pub timeout: Duration,
    /// `None` means no backoff beyond the interval.
    pub max_backoff: Option<Duration>,
    pub reject_non_positive: bool,
    pub labels: BTreeMap<String, String>,
    pub frame: FrameFormat,
    pub simulate: bool,
    pub run_seconds: Option<u64>,
    pub logging: LoggingOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: None,
            metrics_addr: join_host_port(DEFAULT_BIND_ADDRESS, DEFAULT_HTTP_PORT),
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            max_backoff: None,
            reject_non_positive: false,
            labels: BTreeMap::new(),
            frame: FrameFormat::default(),
            simulate: false,
            run_seconds: None,
            logging: LoggingOptions::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    /// Build from `argv` (program name first). A `--config` file is loaded
    /// first and every other flag overrides it, whatever the order.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
            return Ok(Self {
                show_help: true,
                ..Self::default()
            });
        }

        let mut cfg = match config_flag(args)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--config" => {
                    i += 1;
                }
                "--metrics-addr" => {
                    cfg.metrics_addr = value(args, i, flag)?.to_string();
                    i += 1;
                }
                "--serial-port" => {
                    cfg.serial_port = Some(value(args, i, flag)?.to_string());
                    i += 1;
                }
                "--baud" => {
                    cfg.baud_rate = parse(flag, value(args, i, flag)?)?;
                    i += 1;
                }
                "--interval-secs" => {
                    cfg.interval = parse_secs(flag, value(args, i, flag)?)?;
                    i += 1;
                }
                "--timeout-ms" => {
                    cfg.timeout = Duration::from_millis(parse(flag, value(args, i, flag)?)?);
                    i += 1;
                }
                "--max-backoff-secs" => {
                    cfg.max_backoff = Some(parse_secs(flag, value(args, i, flag)?)?);
                    i += 1;
                }
                "--label" => {
                    let raw = value(args, i, flag)?;
                    let (key, val) = raw.split_once('=').ok_or_else(|| invalid(flag, raw))?;
                    cfg.labels.insert(key.trim().to_string(), val.to_string());
                    i += 1;
                }
                "--reject-non-positive" => {
                    cfg.reject_non_positive = true;
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--run-seconds" => {
                    cfg.run_seconds = Some(parse(flag, value(args, i, flag)?)?);
                    i += 1;
                }
                "--json-logs" => {
                    cfg.logging.json = true;
                }
                "--log-dir" => {
                    cfg.logging.log_dir = Some(PathBuf::from(value(args, i, flag)?));
                    i += 1;
                }
                "--debug" => {
                    cfg.logging.debug = true;
                }
                other => return Err(ConfigError::UnknownArgument(other.to_string())),
            }
            i += 1;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the YAML file on top of the defaults. Not validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig =
            serde_yml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut cfg = Self {
            config_path: Some(path.to_path_buf()),
            ..Self::default()
        };

        let global = file.global;
        cfg.metrics_addr = join_host_port(
            global.bind_address.as_deref().unwrap_or(DEFAULT_BIND_ADDRESS),
            global.http_server_port.unwrap_or(DEFAULT_HTTP_PORT),
        );
        if let Some(secs) = global.scrap_interval {
            cfg.interval = secs_to_duration("global.scrap_interval", secs)?;
        }
        if let Some(secs) = global.max_backoff {
            cfg.max_backoff = Some(secs_to_duration("global.max_backoff", secs)?);
        }
        if let Some(reject) = global.reject_non_positive {
            cfg.reject_non_positive = reject;
        }
        cfg.labels = global.tags;

        let graphix = file.graphix;
        cfg.serial_port = graphix.port;
        if let Some(baud) = graphix.baudrate {
            cfg.baud_rate = baud;
        }
        if let Some(ms) = graphix.timeout_ms {
            cfg.timeout = Duration::from_millis(ms);
        }
        if let Some(frame) = graphix.frame {
            cfg.frame = frame;
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("scrape interval must be positive".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("serial timeout must be positive".into()));
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::Invalid(format!(
                "serial timeout ({:?}) must be shorter than the scrape interval ({:?})",
                self.timeout, self.interval
            )));
        }
        if let Some(max_backoff) = self.max_backoff {
            if max_backoff < self.interval {
                return Err(ConfigError::Invalid(format!(
                    "max backoff ({:?}) must not be shorter than the scrape interval ({:?})",
                    max_backoff, self.interval
                )));
            }
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud rate must be positive".into()));
        }
        if self.metrics_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("metrics address is empty".into()));
        }
        if !self.simulate && self.serial_port.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Invalid(
                "a serial port is required unless --simulate is given".into(),
            ));
        }
        for name in self.labels.keys() {
            if !is_valid_label_name(name) {
                return Err(ConfigError::Invalid(format!("invalid label name {name:?}")));
            }
            if RESERVED_LABELS.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "label name {name:?} is used by the exporter itself"
                )));
            }
        }
        Ok(())
    }

    pub fn scrape_config(&self) -> ScrapeConfig {
        ScrapeConfig {
            interval: self.interval,
            timeout: self.timeout,
            max_backoff: self.max_backoff.unwrap_or(self.interval),
            reject_non_positive: self.reject_non_positive,
            command: Command::ReadPressure,
        }
    }

    pub fn print_help() {
        println!(
            r#"Graphix exporter - Prometheus exporter for Graphix vacuum gauge controllers

USAGE:
    graphix-exporter [OPTIONS]

OPTIONS:
    --config <PATH>           YAML configuration file (flags override it)
    --metrics-addr <ADDR>     Metrics listener address [default: 0.0.0.0:8080]
    --serial-port <PATH>      Serial device of the controller (e.g. /dev/ttyUSB0)
    --baud <RATE>             Serial baud rate [default: 9600]
    --interval-secs <SECS>    Seconds between scrapes [default: 5]
    --timeout-ms <MS>         Per-exchange serial timeout [default: 1000]
    --max-backoff-secs <SECS> Upper bound for the delay after repeated failures
    --label <KEY=VALUE>       Constant label on every series (repeatable)
    --reject-non-positive     Treat readings <= 0 as implausible
    --simulate                Scrape a simulated gauge instead of a serial port
    --run-seconds <SECS>      Run for a fixed duration then exit
    --json-logs               Output logs in JSON format
    --log-dir <PATH>          Also write logs to a daily rolling file in PATH
    --debug                   Enable debug logging
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log filter (e.g., RUST_LOG=debug,graphix_core=trace)

EXAMPLES:
    # Scrape a gauge on the first USB adapter
    graphix-exporter --serial-port /dev/ttyUSB0 --label gauge_id=graphix001

    # Load settings from a file, override the port
    graphix-exporter --config graphix.yaml --metrics-addr 127.0.0.1:9101

    # Short run against the simulator
    graphix-exporter --simulate --run-seconds 10
"#
        );
    }
}

fn config_flag(args: &[String]) -> Result<Option<PathBuf>, ConfigError> {
    let mut found = None;
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" {
            found = Some(PathBuf::from(value(args, i, "--config")?));
            i += 1;
        }
        i += 1;
    }
    Ok(found)
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, ConfigError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse<T: FromStr>(flag: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| invalid(flag, raw))
}

fn parse_secs(flag: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse(flag, raw)?;
    secs_to_duration(flag, secs)
}

fn secs_to_duration(flag: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| invalid(flag, &secs.to_string()))
}

fn invalid(flag: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: raw.to_string(),
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
