// weatherapi_mqtt - Relay weatherapi.com conditions to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Internal(#[from] reqwest::Error),
    #[error("base URL {0} cannot have path segments")]
    InvalidBaseUrl(Url),
    #[error("weatherapi error {code} ({status}) for {endpoint}: {message}")]
    Api {
        status: StatusCode,
        code: i64,
        message: String,
        endpoint: String,
    },
    #[error("unexpected status {0} for {1}")]
    Unexpected(StatusCode, String),
}

/// Source of the two upstream documents a poll cycle combines.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Current conditions, including air quality, for the configured location.
    async fn current(&self) -> Result<CurrentResponse, ClientError>;

    /// Sunrise, sunset and moon information for the configured location on `date`.
    async fn astronomy(&self, date: NaiveDate) -> Result<AstronomyResponse, ClientError>;
}

/// Latitude and longitude exactly as configured, joined into the `q` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub latitude: String,
    pub longitude: String,
}

impl Location {
    pub fn new<S: Into<String>>(latitude: S, longitude: S) -> Self {
        Location {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug)]
pub struct WeatherApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    location: Location,
}

impl WeatherApiClient {
    const USER_AGENT: &'static str = "weatherapi_mqtt (https://github.com/56quarters/weatherapi_mqtt)";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: Url, api_key: &str, location: Location) -> Result<Self, ClientError> {
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base_url));
        }

        Ok(WeatherApiClient {
            client,
            base_url,
            api_key: api_key.to_owned(),
            location,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// GET `url` and decode a successful body as `T`.
    ///
    /// Non-2xx responses are decoded as the provider's error document when possible.
    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        // The query string carries the API key so only the path is logged.
        let endpoint = url.path().to_owned();
        tracing::debug!(message = "making weatherapi request", endpoint = %endpoint, location = %self.location);

        let res = self
            .client
            .get(url)
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<T>().await?);
        }

        match res.json::<ErrorResponse>().await {
            Ok(body) => Err(ClientError::Api {
                status,
                code: body.error.code,
                message: body.error.message,
                endpoint,
            }),
            Err(_) => Err(ClientError::Unexpected(status, endpoint)),
        }
    }

    fn current_url(&self) -> Url {
        let mut url = self.endpoint_url("current.json");
        url.query_pairs_mut().append_pair("aqi", "yes");
        url
    }

    fn astronomy_url(&self, date: NaiveDate) -> Url {
        let mut url = self.endpoint_url("astronomy.json");
        url.query_pairs_mut()
            .append_pair("dt", &date.format("%Y-%m-%d").to_string());
        url
    }

    fn endpoint_url(&self, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        // Checked in new(): the base URL can always have path segments.
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push(endpoint);
        }

        // Values are form encoded, the comma in `q` is sent as %2C which the API
        // decodes the same as a literal comma.
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("q", &self.location.to_string());
        url
    }
}

#[async_trait]
impl WeatherSource for WeatherApiClient {
    async fn current(&self) -> Result<CurrentResponse, ClientError> {
        self.fetch(self.current_url()).await
    }

    async fn astronomy(&self, date: NaiveDate) -> Result<AstronomyResponse, ClientError> {
        self.fetch(self.astronomy_url(date)).await
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurrentResponse {
    pub current: Current,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Current {
    pub last_updated_epoch: Option<i64>,
    pub condition: Option<Condition>,
    pub temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub wind_kph: Option<f64>,
    pub gust_kph: Option<f64>,
    pub wind_degree: Option<i64>,
    pub pressure_mb: Option<f64>,
    pub pressure_in: Option<f64>,
    pub humidity: Option<i64>,
    pub cloud: Option<i64>,
    pub vis_km: Option<f64>,
    pub uv: Option<f64>,
    pub air_quality: Option<AirQuality>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AirQuality {
    pub co: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AstronomyResponse {
    pub astronomy: Astronomy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Astronomy {
    pub astro: Astro,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Astro {
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub moon_phase: Option<String>,
    pub moon_illumination: Option<Illumination>,
}

/// Moon illumination percentage. Documented as a numeric string but also seen as a bare number.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Illumination {
    Number(f64),
    Text(String),
}

#[derive(Deserialize, Debug)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ErrorDetail {
    code: i64,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::{AstronomyResponse, ClientError, CurrentResponse, Illumination, Location, WeatherApiClient};
    use chrono::NaiveDate;
    use reqwest::{Client, Url};

    const CURRENT_JSON: &str = r#"{
        "location": {"name": "Boston", "tz_id": "America/New_York"},
        "current": {
            "last_updated_epoch": 1717243200,
            "last_updated": "2024-06-01 08:00",
            "temp_c": 18.3,
            "is_day": 1,
            "condition": {"text": "Partly cloudy", "icon": "//cdn.weatherapi.com/x.png", "code": 1003},
            "wind_kph": 11.2,
            "wind_degree": 250,
            "pressure_mb": 1016.0,
            "pressure_in": 30.0,
            "humidity": 64,
            "cloud": 50,
            "feelslike_c": 18.1,
            "vis_km": 16.0,
            "uv": 5.0,
            "gust_kph": 15.8,
            "air_quality": {
                "co": 230.3, "no2": 13.5, "o3": 82.3, "so2": 3.4,
                "pm2_5": 4.2, "pm10": 6.1, "us-epa-index": 1, "gb-defra-index": 1
            }
        }
    }"#;

    fn client(base: &str) -> WeatherApiClient {
        WeatherApiClient::new(
            Client::new(),
            Url::parse(base).unwrap(),
            "secret",
            Location::new("42.36", "-71.06"),
        )
        .unwrap()
    }

    #[test]
    fn test_current_url() {
        let url = client("http://api.weatherapi.com/v1/").current_url();
        assert_eq!(
            "http://api.weatherapi.com/v1/current.json?key=secret&q=42.36%2C-71.06&aqi=yes",
            url.as_str()
        );
    }

    #[test]
    fn test_astronomy_url() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let url = client("http://api.weatherapi.com/v1").astronomy_url(date);
        assert_eq!(
            "http://api.weatherapi.com/v1/astronomy.json?key=secret&q=42.36%2C-71.06&dt=2024-06-01",
            url.as_str()
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let res = WeatherApiClient::new(
            Client::new(),
            Url::parse("mailto:someone@example.com").unwrap(),
            "secret",
            Location::new("1", "2"),
        );
        assert!(matches!(res, Err(ClientError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_decode_current() {
        let res: CurrentResponse = serde_json::from_str(CURRENT_JSON).unwrap();
        let current = res.current;
        assert_eq!(Some(1717243200), current.last_updated_epoch);
        assert_eq!(Some("Partly cloudy".to_owned()), current.condition.unwrap().text);
        assert_eq!(Some(250), current.wind_degree);
        assert_eq!(Some(4.2), current.air_quality.unwrap().pm2_5);
    }

    #[test]
    fn test_decode_current_without_air_quality() {
        let res: CurrentResponse = serde_json::from_str(r#"{"current": {"temp_c": 3.0}}"#).unwrap();
        assert_eq!(Some(3.0), res.current.temp_c);
        assert!(res.current.air_quality.is_none());
        assert!(res.current.uv.is_none());
    }

    #[test]
    fn test_decode_astronomy_illumination_forms() {
        let text: AstronomyResponse = serde_json::from_str(
            r#"{"astronomy": {"astro": {"sunrise": "05:09 AM", "sunset": "08:14 PM",
                "moon_phase": "Waning Crescent", "moon_illumination": "57"}}}"#,
        )
        .unwrap();
        let number: AstronomyResponse =
            serde_json::from_str(r#"{"astronomy": {"astro": {"moon_illumination": 57}}}"#).unwrap();

        assert_eq!(Some(Illumination::Text("57".to_owned())), text.astronomy.astro.moon_illumination);
        assert_eq!(Some("05:09 AM".to_owned()), text.astronomy.astro.sunrise);
        assert_eq!(Some(Illumination::Number(57.0)), number.astronomy.astro.moon_illumination);
    }

    #[test]
    fn test_location_display() {
        assert_eq!("42.36,-71.06", Location::new("42.36", "-71.06").to_string());
    }
}
