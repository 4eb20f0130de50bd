use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::RunMode;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has unrecognized value \"{value}\"")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be between {min} and {max}")]
    OutOfRange {
        key: &'static str,
        min: u64,
        max: u64,
    },
}

/// How often the dashboard is redrawn.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RefreshInterval {
    FiveMinutes,
    FifteenMinutes,
}

impl RefreshInterval {
    pub fn duration(self) -> Duration {
        match self {
            Self::FiveMinutes => Duration::from_secs(300),
            Self::FifteenMinutes => Duration::from_secs(900),
        }
    }

    /// Short form shown in the status column.
    pub fn label(self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
        }
    }
}

impl FromStr for RefreshInterval {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" | "5" | "300" => Ok(Self::FiveMinutes),
            "15m" | "15" | "900" => Ok(Self::FifteenMinutes),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Units {
    Imperial,
    Metric,
}

impl Units {
    /// The key-only query flag wttr.in understands.
    pub fn query_flag(self) -> &'static str {
        match self {
            Self::Imperial => "u",
            Self::Metric => "m",
        }
    }
}

impl FromStr for Units {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imperial" | "u" => Ok(Self::Imperial),
            "metric" | "m" => Ok(Self::Metric),
            _ => Err(()),
        }
    }
}

/// Where frames end up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Hardware,
    Preview,
}

impl FromStr for Output {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hardware" | "epd" => Ok(Self::Hardware),
            "preview" => Ok(Self::Preview),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub location: String,
    pub location_label: String,
    pub units: Units,
    pub weather_url: String,
    pub forecast_format: String,
    pub geolocation_url: Option<String>,
    pub http_timeout: Duration,
    pub cpu_temp_path: PathBuf,
    pub uptime_path: PathBuf,
    pub interval: RefreshInterval,
    pub output: Output,
    pub run_mode: RunMode,
    pub preview_path: PathBuf,
    pub preview_viewer: Option<String>,
}

impl Config {
    const DEFAULT_LOCATION: &'static str = "Rochester,NY";
    const DEFAULT_LOCATION_LABEL: &'static str = "Rochester, NY";
    const DEFAULT_WEATHER_URL: &'static str = "https://wttr.in";
    const DEFAULT_FORECAST_FORMAT: &'static str = "%l:+%h/%L\n";
    const DEFAULT_GEOLOCATION_URL: &'static str = "https://ipinfo.io/city";
    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_CPU_TEMP_PATH: &'static str = "/sys/class/thermal/thermal_zone0/temp";
    const DEFAULT_UPTIME_PATH: &'static str = "/proc/uptime";
    const DEFAULT_PREVIEW_PATH: &'static str = "dashboard.png";

    #[cfg(target_os = "macos")]
    const DEFAULT_PREVIEW_VIEWER: &'static str = "open";
    #[cfg(not(target_os = "macos"))]
    const DEFAULT_PREVIEW_VIEWER: &'static str = "xdg-open";

    /// Read the `DASHBOARD_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let location = get("DASHBOARD_LOCATION").unwrap_or_else(|| Self::DEFAULT_LOCATION.into());
        let location_label = get("DASHBOARD_LOCATION_LABEL").unwrap_or_else(|| {
            if location == Self::DEFAULT_LOCATION {
                Self::DEFAULT_LOCATION_LABEL.into()
            } else {
                location.clone()
            }
        });

        let output = parse_or(get("DASHBOARD_OUTPUT"), "DASHBOARD_OUTPUT", Output::Hardware)?;
        let run_mode = parse_or(
            get("DASHBOARD_RUN_MODE"),
            "DASHBOARD_RUN_MODE",
            match output {
                Output::Hardware => RunMode::Repeating,
                Output::Preview => RunMode::SingleShot,
            },
        )?;

        let http_timeout = match get("DASHBOARD_HTTP_TIMEOUT_SECS") {
            Some(value) => {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "DASHBOARD_HTTP_TIMEOUT_SECS",
                        value: value.clone(),
                    })?;
                if !(1..=60).contains(&secs) {
                    return Err(ConfigError::OutOfRange {
                        key: "DASHBOARD_HTTP_TIMEOUT_SECS",
                        min: 1,
                        max: 60,
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            location,
            location_label,
            units: parse_or(get("DASHBOARD_UNITS"), "DASHBOARD_UNITS", Units::Imperial)?,
            weather_url: get("DASHBOARD_WEATHER_URL")
                .unwrap_or_else(|| Self::DEFAULT_WEATHER_URL.into()),
            // Not trimmed: the trailing newline is part of the format.
            forecast_format: lookup("DASHBOARD_FORECAST_FORMAT")
                .filter(|value| !value.is_empty())
                .map(|value| value.replace("\\n", "\n"))
                .unwrap_or_else(|| Self::DEFAULT_FORECAST_FORMAT.into()),
            geolocation_url: match get("DASHBOARD_GEOLOCATION_URL") {
                Some(value) if value == "off" || value == "none" => None,
                Some(value) => Some(value),
                None => Some(Self::DEFAULT_GEOLOCATION_URL.into()),
            },
            http_timeout,
            cpu_temp_path: get("DASHBOARD_CPU_TEMP_PATH")
                .unwrap_or_else(|| Self::DEFAULT_CPU_TEMP_PATH.into())
                .into(),
            uptime_path: get("DASHBOARD_UPTIME_PATH")
                .unwrap_or_else(|| Self::DEFAULT_UPTIME_PATH.into())
                .into(),
            interval: parse_or(
                get("DASHBOARD_INTERVAL"),
                "DASHBOARD_INTERVAL",
                RefreshInterval::FiveMinutes,
            )?,
            output,
            run_mode,
            preview_path: get("DASHBOARD_PREVIEW_PATH")
                .unwrap_or_else(|| Self::DEFAULT_PREVIEW_PATH.into())
                .into(),
            preview_viewer: match get("DASHBOARD_PREVIEW_VIEWER") {
                Some(value) if value == "none" || value == "off" => None,
                Some(value) => Some(value),
                None => Some(Self::DEFAULT_PREVIEW_VIEWER.into()),
            },
        })
    }
}

fn parse_or<T: FromStr>(
    value: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .to_lowercase()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}
