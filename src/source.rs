use std::future::Future;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::config::Config;
use crate::system::{self, SystemSnapshot};
use crate::weather::{FetchError, WeatherClient, WeatherSnapshot};

/// Everything drawn in one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub weather: WeatherSnapshot,
    pub system: SystemSnapshot,
    pub taken_at: OffsetDateTime,
}

/// Produces the data for a refresh cycle. Implementations mask their own failures, so
/// a snapshot is always available.
pub trait SnapshotSource {
    fn snapshot(&self) -> impl Future<Output = Snapshot>;
}

/// The live source: wttr.in, IP geolocation and the local system files.
pub struct DataSource {
    weather: WeatherClient,
    cpu_temp_path: PathBuf,
    uptime_path: PathBuf,
}

impl DataSource {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self {
            weather: WeatherClient::new(config)?,
            cpu_temp_path: config.cpu_temp_path.clone(),
            uptime_path: config.uptime_path.clone(),
        })
    }

    pub async fn fetch_weather(&self) -> WeatherSnapshot {
        self.weather.fetch_weather().await
    }

    pub fn read_cpu_temperature(&self) -> String {
        system::read_cpu_temperature(&self.cpu_temp_path)
    }

    pub fn read_system(&self) -> SystemSnapshot {
        SystemSnapshot {
            cpu_temp: self.read_cpu_temperature(),
            uptime: system::read_uptime(&self.uptime_path),
        }
    }
}

impl SnapshotSource for DataSource {
    async fn snapshot(&self) -> Snapshot {
        let weather = self.fetch_weather().await;
        let system = self.read_system();

        Snapshot {
            weather,
            system,
            taken_at: now(),
        }
    }
}

/// Local time if the offset can be determined, UTC otherwise.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn offline_host_still_produces_a_snapshot() {
        let vars: HashMap<&str, &str> = [
            ("DASHBOARD_WEATHER_URL", "http://127.0.0.1:1"),
            ("DASHBOARD_GEOLOCATION_URL", "off"),
            ("DASHBOARD_CPU_TEMP_PATH", "/nonexistent/temp"),
            ("DASHBOARD_UPTIME_PATH", "/nonexistent/uptime"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        let snapshot = DataSource::new(&config).unwrap().snapshot().await;

        assert_eq!(WeatherSnapshot::offline(), snapshot.weather);
        assert_eq!(
            SystemSnapshot {
                cpu_temp: "N/A".into(),
                uptime: "N/A".into(),
            },
            snapshot.system
        );
    }
}
