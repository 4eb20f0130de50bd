use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::config::{Config, Units};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("invalid service URL \"{0}\"")]
    Url(String),

    #[error("empty response body")]
    EmptyBody,
}

/// Weather text for one refresh, already formatted for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeatherSnapshot {
    pub condition: String,
    pub current_temp: String,
    pub precipitation: String,
    pub forecast: [String; 3],
    pub location_label: String,
}

impl WeatherSnapshot {
    pub const OFFLINE_CONDITION: &'static str = "Weather Offline";
    pub const OFFLINE_LOCATION: &'static str = "OFFLINE";
    pub const MISSING_FORECAST: &'static str = "N/A";

    /// What gets drawn when the weather service can't be reached.
    pub fn offline() -> Self {
        Self {
            condition: Self::OFFLINE_CONDITION.into(),
            current_temp: String::new(),
            precipitation: String::new(),
            forecast: [
                Self::MISSING_FORECAST.into(),
                Self::MISSING_FORECAST.into(),
                Self::MISSING_FORECAST.into(),
            ],
            location_label: Self::OFFLINE_LOCATION.into(),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.condition == Self::OFFLINE_CONDITION
    }
}

/// Client for the wttr.in style text weather service and the IP geolocation lookup.
pub struct WeatherClient {
    client: Client,
    weather_url: String,
    geolocation_url: Option<String>,
    location: String,
    location_label: String,
    units: Units,
    forecast_format: String,
}

impl WeatherClient {
    /// Condition, temperature and precipitation, separated so they can be laid out
    /// independently.
    const CURRENT_FORMAT: &'static str = "%C|%t|%p";

    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Self::with_timeout(config, config.http_timeout)
    }

    pub fn with_timeout(config: &Config, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            weather_url: config.weather_url.trim_end_matches('/').to_string(),
            geolocation_url: config.geolocation_url.clone(),
            location: config.location.clone(),
            location_label: config.location_label.clone(),
            units: config.units,
            forecast_format: config.forecast_format.clone(),
        })
    }

    /// Fetch everything the weather half of the dashboard needs. Never fails: the
    /// geolocated city only names the header, falling back to the configured label, and
    /// a failed weather query yields [`WeatherSnapshot::offline`].
    ///
    /// The weather itself is always queried for the configured location.
    pub async fn fetch_weather(&self) -> WeatherSnapshot {
        let label = self
            .locate()
            .await
            .unwrap_or_else(|| self.location_label.clone());

        match self.query_weather(&self.location).await {
            Ok((current, forecast)) => {
                let mut snapshot = parse_current(&current);
                snapshot.forecast = parse_forecast(&forecast);
                snapshot.location_label = label;
                snapshot
            }
            Err(e) => {
                log::error!("Weather error: {}", e);
                WeatherSnapshot::offline()
            }
        }
    }

    /// Best-effort city lookup from the public IP address.
    pub async fn locate(&self) -> Option<String> {
        let url = self.geolocation_url.as_deref()?;

        match self.get_text(url).await {
            Ok(city) => Some(city),
            Err(e) => {
                log::warn!("Location lookup failed, using \"{}\": {}", self.location, e);
                None
            }
        }
    }

    async fn query_weather(&self, location: &str) -> Result<(String, String), FetchError> {
        let current = self
            .get_text(self.weather_url(location, Self::CURRENT_FORMAT)?.as_str())
            .await?;
        let forecast = self
            .get_text(self.weather_url(location, &self.forecast_format)?.as_str())
            .await?;

        Ok((current, forecast))
    }

    fn weather_url(&self, location: &str, format: &str) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(&self.weather_url).map_err(|_| FetchError::Url(self.weather_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Url(self.weather_url.clone()))?
            .pop_if_empty()
            .push(location);
        // wttr.in reads `+` in a format as a space; encoded literally it would print.
        url.query_pairs_mut()
            .append_key_only(self.units.query_flag())
            .append_pair("format", &format.replace('+', " "));
        Ok(url)
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?.trim().to_string();
        if body.is_empty() {
            Err(FetchError::EmptyBody)
        } else {
            Ok(body)
        }
    }
}

/// Split a `%C|%t|%p` response. Missing fields are left blank.
fn parse_current(body: &str) -> WeatherSnapshot {
    let mut fields = body.lines().next().unwrap_or("").split('|').map(str::trim);
    let mut next = || fields.next().unwrap_or("").to_string();

    WeatherSnapshot {
        condition: next(),
        current_temp: next(),
        precipitation: next(),
        ..WeatherSnapshot::offline()
    }
}

/// First three non-blank lines, padded out with "N/A".
fn parse_forecast(body: &str) -> [String; 3] {
    let mut lines = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from);
    let mut next = || {
        lines
            .next()
            .unwrap_or_else(|| WeatherSnapshot::MISSING_FORECAST.into())
    };

    [next(), next(), next()]
}
