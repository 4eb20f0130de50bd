use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected contents in {path}: {contents:?}")]
    Parse { path: PathBuf, contents: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub cpu_temp: String,
    pub uptime: String,
}

pub const UNAVAILABLE: &str = "N/A";

/// CPU temperature as shown on the dashboard, e.g. `48.3°C`, or "N/A" if the sensor
/// can't be read.
pub fn read_cpu_temperature(path: &Path) -> String {
    match millidegrees(path) {
        Ok(value) => format!("{:.1}°C", value as f64 / 1000.),
        Err(e) => {
            log::warn!("CPU temperature unavailable: {}", e);
            UNAVAILABLE.into()
        }
    }
}

/// Time since boot as `Xd Yh Zm`, or "N/A".
pub fn read_uptime(path: &Path) -> String {
    match uptime_seconds(path) {
        Ok(seconds) => {
            let seconds = seconds as u64;
            format!(
                "{}d {}h {}m",
                seconds / 86_400,
                seconds % 86_400 / 3_600,
                seconds % 3_600 / 60
            )
        }
        Err(e) => {
            log::warn!("Uptime unavailable: {}", e);
            UNAVAILABLE.into()
        }
    }
}

fn millidegrees(path: &Path) -> Result<i64, ReadError> {
    let contents = read(path)?;
    contents.trim().parse().map_err(|_| ReadError::Parse {
        path: path.into(),
        contents,
    })
}

/// The first field of `/proc/uptime`.
fn uptime_seconds(path: &Path) -> Result<f64, ReadError> {
    let contents = read(path)?;
    contents
        .split_whitespace()
        .next()
        .and_then(|field| field.parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.)
        .ok_or_else(|| ReadError::Parse {
            path: path.into(),
            contents: contents.clone(),
        })
}

fn read(path: &Path) -> Result<String, ReadError> {
    fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.into(),
        source,
    })
}
