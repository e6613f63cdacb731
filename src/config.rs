use std::{
    env,
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::EnvFilter;

/// Volume change applied per rotation event when `VOLUMESTEP` is not usable
pub const DEFAULT_VOLUME_STEP: i32 = 5;

/// Port assumed when `MQTTSERVER` carries no explicit one
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Connection parameters read from the process environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `host:port` of the MQTT broker
    pub mqtt_server: String,
    /// Topic carrying the remote's control events
    pub mqtt_topic: String,
    /// `host:port` of the MPD server
    pub mpd_server: String,
    /// Volume percent added or removed per rotation
    pub volume_step: i32,
}

impl Config {
    /// Load the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required variable that is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration using `lookup` to resolve variable names
    ///
    /// # Errors
    ///
    /// Returns an error naming the first required variable that is unset or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| match lookup(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => bail!("{key} is empty"),
        };

        let mqtt_server = required("MQTTSERVER")?;
        let mqtt_topic = required("MQTTTOPIC")?;
        let mpd_server = required("MPDSERVER")?;
        let volume_step = match lookup("VOLUMESTEP").filter(|v| !v.is_empty()) {
            None => {
                tracing::info!("VOLUMESTEP is empty, using default ({DEFAULT_VOLUME_STEP})");
                DEFAULT_VOLUME_STEP
            }
            Some(raw) => match raw.trim().parse() {
                Ok(step) => step,
                Err(e) => {
                    tracing::warn!(
                        ?e,
                        "Couldn't parse VOLUMESTEP {raw:?} as integer, using default ({DEFAULT_VOLUME_STEP})"
                    );
                    DEFAULT_VOLUME_STEP
                }
            },
        };

        Ok(Self {
            mqtt_server,
            mqtt_topic,
            mpd_server,
            volume_step,
        })
    }

    /// Split `mqtt_server` into host and port, defaulting the port to 1883
    ///
    /// IPv6 literals are accepted bare (`::1`) or bracketed (`[::1]`, `[::1]:1883`).
    ///
    /// # Errors
    ///
    /// Returns an error if the port part is not a valid TCP port.
    pub fn mqtt_host_port(&self) -> Result<(String, u16)> {
        let server = self.mqtt_server.as_str();
        let (host, port) = if let Some(rest) = server.strip_prefix('[') {
            let Some((host, rest)) = rest.split_once(']') else {
                bail!("Unclosed bracket in MQTTSERVER {server:?}");
            };
            match rest {
                "" => (host, None),
                _ => match rest.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => bail!("Unexpected {rest:?} after address in MQTTSERVER {server:?}"),
                },
            }
        } else {
            match server.split_once(':') {
                // More than one colon without brackets is a bare IPv6 address
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                _ => (server, None),
            }
        };

        let port = match port {
            None => DEFAULT_MQTT_PORT,
            Some(port) => port
                .parse()
                .with_context(|| format!("Invalid port in MQTTSERVER {server:?}"))?,
        };
        Ok((host.to_owned(), port))
    }

    /// Log every parameter in effect
    pub fn log_summary(&self) {
        tracing::info!(mqtt_server = %self.mqtt_server, "MQTT server");
        tracing::info!(mqtt_topic = %self.mqtt_topic, "MQTT topic");
        tracing::info!(mpd_server = %self.mpd_server, "MPD server");
        tracing::info!(volume_step = self.volume_step, "Volume step (%)");
    }
}

/// File to write the log to, taken from `LOGFILE`. If not set, logs will be written to stderr.
///
/// Read separately from [`Config`] so the subscriber is in place before the configuration
/// is loaded and logged.
pub fn log_file_from_env() -> Option<PathBuf> {
    log_file_from_lookup(|key| env::var(key).ok())
}

fn log_file_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    lookup("LOGFILE").filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Build the tracing subscriber, writing to `log_file` when given
///
/// Falls back to the `info` level when `RUST_LOG` is not set.
///
/// # Errors
///
/// Returns an error if the log file cannot be created.
pub fn init_tracing_subscriber(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().pretty().with_env_filter(filter);

    match log_file {
        None => builder.with_writer(io::stderr).init(),
        Some(f) => {
            let file = File::create(f)
                .with_context(|| format!("Failed to create log file {}", f.display()))?;
            builder.with_writer(Mutex::new(file)).init();
        }
    }
    Ok(())
}
