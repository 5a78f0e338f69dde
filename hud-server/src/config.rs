//! INI configuration
//!
//! Loaded from `~/.hud/config.ini` unless a path is given on the command
//! line. A missing file means every default applies and no inputs run.
//!
//! ```ini
//! [main]
//! inputs = efis, traffic
//! http_port = 9100
//!
//! [targets]
//! ignore_traffic_beyond_distance = 30
//!
//! [efis]
//! protocol = g3x
//! source = serial
//! port = /dev/ttyUSB0
//!
//! [traffic]
//! protocol = stratux
//! ```

use hud_adapters::protocol::{DecoderOptions, Protocol};
use hud_adapters::g3x::{EOL_LIVE, EOL_PLAYBACK};
use hud_core::targets::DEFAULT_IGNORE_RADIUS_MI;
use ini::{Ini, Properties};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HTTP_PORT: u16 = 9100;
pub const DEFAULT_UDP_PORT: u16 = 4000;
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration: {section}.{key} is required {reason}")]
    Missing {
        section: String,
        key: String,
        reason: String,
    },

    #[error("Input '{0}' is listed in [main] inputs but has no section")]
    MissingSection(String),
}

/// Where an input reads its bytes from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceConfig {
    Serial { port: String, baud: usize },
    Udp { port: u16 },
    File { path: PathBuf },
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::Serial { port, baud } => write!(f, "serial {port} @ {baud}"),
            SourceConfig::Udp { port } => write!(f, "udp :{port}"),
            SourceConfig::File { path } => write!(f, "file {}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Section name
    pub name: String,
    pub protocol: Protocol,
    pub source: SourceConfig,
    pub options: DecoderOptions,
    /// Pause after each frame during playback
    pub playback_delay: Duration,
    /// Raw bytes are appended here when set
    pub capture_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub cleanup_interval: Duration,
    pub ignore_radius_mi: f64,
    pub inputs: Vec<InputConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            ignore_radius_mi: DEFAULT_IGNORE_RADIUS_MI,
            inputs: Vec::new(),
        }
    }
}

/// `~/.hud/config.ini`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hud")
        .join("config.ini")
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        parse_ini(&ini)
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `key` from `props` if present
fn get<T: FromStr>(
    props: &Properties,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigError> {
    match props.get(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| invalid(section, key, v, reason)),
    }
}

fn get_bool(props: &Properties, section: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    match props.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) => match v.as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(invalid(section, key, &v, "must be true or false")),
        },
    }
}

fn parse_ini(ini: &Ini) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut input_names = Vec::new();

    // [main] section
    if let Some(main) = ini.section(Some("main")) {
        if let Some(port) = get(main, "main", "http_port", "must be a port number")? {
            config.http_port = port;
        }
        if let Some(ms) = get::<u64>(main, "main", "cleanup_interval_ms", "must be milliseconds")? {
            if ms == 0 {
                return Err(invalid("main", "cleanup_interval_ms", "0", "must be positive"));
            }
            config.cleanup_interval = Duration::from_millis(ms);
        }
        if let Some(list) = main.get("inputs") {
            input_names = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    // [targets] section
    if let Some(targets) = ini.section(Some("targets")) {
        if let Some(mi) = get::<f64>(
            targets,
            "targets",
            "ignore_traffic_beyond_distance",
            "must be a distance in miles",
        )? {
            if mi.is_nan() || mi <= 0.0 {
                return Err(invalid(
                    "targets",
                    "ignore_traffic_beyond_distance",
                    &mi.to_string(),
                    "must be positive",
                ));
            }
            config.ignore_radius_mi = mi;
        }
    }

    for name in input_names {
        let props = ini
            .section(Some(name.as_str()))
            .ok_or_else(|| ConfigError::MissingSection(name.clone()))?;
        config.inputs.push(parse_input(&name, props)?);
    }

    Ok(config)
}

fn parse_input(name: &str, props: &Properties) -> Result<InputConfig, ConfigError> {
    let protocol_str = props.get("protocol").unwrap_or(name);
    let protocol: Protocol = protocol_str.parse().map_err(|_| {
        invalid(
            name,
            "protocol",
            protocol_str,
            "must be one of: mgl, g3x, skyview, stratux, nmea, grt_eis",
        )
    })?;

    let playback_file: Option<PathBuf> = props
        .get("playback_file")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let source_kind = match props.get("source").map(|s| s.trim().to_ascii_lowercase()) {
        Some(s) => s,
        None if playback_file.is_some() => "file".to_string(),
        None if protocol == Protocol::Stratux => "udp".to_string(),
        None => "serial".to_string(),
    };

    let source = match source_kind.as_str() {
        "serial" => {
            let port = props.get("port").map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
                ConfigError::Missing {
                    section: name.to_string(),
                    key: "port".to_string(),
                    reason: "for a serial source".to_string(),
                }
            })?;
            let baud = get(props, name, "baudrate", "must be a baud rate")?
                .unwrap_or_else(|| protocol.default_baud());
            SourceConfig::Serial {
                port: port.to_string(),
                baud,
            }
        }
        "udp" => SourceConfig::Udp {
            port: get(props, name, "udp_port", "must be a port number")?.unwrap_or(DEFAULT_UDP_PORT),
        },
        "file" | "playback" => SourceConfig::File {
            path: playback_file.ok_or_else(|| ConfigError::Missing {
                section: name.to_string(),
                key: "playback_file".to_string(),
                reason: "for a file source".to_string(),
            })?,
        },
        other => return Err(invalid(name, "source", other, "must be serial, udp or file")),
    };

    let playback = matches!(source, SourceConfig::File { .. });
    let mut options = if playback {
        DecoderOptions::playback()
    } else {
        DecoderOptions::default()
    };
    if let Some(eol) = get::<u8>(props, name, "eol", "must be 10 or 13")? {
        if eol != EOL_LIVE && eol != EOL_PLAYBACK {
            return Err(invalid(name, "eol", &eol.to_string(), "must be 10 or 13"));
        }
        options.eol = eol;
    }
    if let Some(smoothing) = get_bool(props, name, "smoothing")? {
        options.smoothing = smoothing;
    }
    if let Some(verify) = get_bool(props, name, "verify_crc")? {
        options.verify_crc = verify;
    }

    let playback_delay = get::<u64>(props, name, "playback_delay_ms", "must be milliseconds")?
        .map(Duration::from_millis)
        .unwrap_or_else(|| protocol.default_playback_delay());

    let capture_file = props
        .get("capture_file")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    Ok(InputConfig {
        name: name.to_string(),
        protocol,
        source,
        options,
        playback_delay,
        capture_file,
    })
}
