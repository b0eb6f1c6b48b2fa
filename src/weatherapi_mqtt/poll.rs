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

use crate::client::{ClientError, WeatherSource};
use crate::publish::Publisher;
use crate::record::TelemetryRecord;
use chrono::{Local, NaiveDate, TimeZone};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to fetch current conditions: {0}")]
    Current(#[source] ClientError),
    #[error("failed to fetch astronomy for {date}: {source}")]
    Astronomy {
        date: NaiveDate,
        #[source]
        source: ClientError,
    },
    #[error("failed to encode telemetry record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PollError {
    /// True when the cycle failed because an upstream request failed.
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Current(_) | Self::Astronomy { .. })
    }
}

/// What happened to the record produced by a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the publisher.
    Sent,
    /// The publisher rejected it. Already logged.
    Dropped,
}

/// One fetch, map and publish cycle against a weather source and a publisher.
#[derive(Debug)]
pub struct Poller<S, P> {
    source: S,
    publisher: P,
    topic: String,
}

impl<S, P> Poller<S, P>
where
    S: WeatherSource,
    P: Publisher,
{
    pub fn new<T: Into<String>>(source: S, publisher: P, topic: T) -> Self {
        Poller {
            source,
            publisher,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run a cycle for the current date in the local timezone.
    pub async fn poll(&self) -> Result<Delivery, PollError> {
        let today = Local::now().date_naive();
        self.poll_on(today, &Local).await
    }

    /// Run a cycle for `today`, resolving sunrise and sunset in `tz`.
    ///
    /// Nothing is published if either request fails. A publish failure is logged and
    /// reported as [`Delivery::Dropped`] rather than as an error.
    pub async fn poll_on<Tz>(&self, today: NaiveDate, tz: &Tz) -> Result<Delivery, PollError>
    where
        Tz: TimeZone + Sync,
    {
        let current = self.source.current().await.map_err(PollError::Current)?;
        let astronomy = self
            .source
            .astronomy(today)
            .await
            .map_err(|e| PollError::Astronomy { date: today, source: e })?;

        let record = TelemetryRecord::map(&current.current, &astronomy.astronomy.astro, today, tz);
        tracing::debug!(message = "mapped telemetry record", record = ?record);

        let payload = serde_json::to_vec(&record)?;
        let num_bytes = payload.len();
        match self.publisher.publish(&self.topic, payload).await {
            Ok(()) => {
                tracing::info!(message = "published telemetry record", topic = %self.topic, num_bytes = num_bytes, time = ?record.time);
                Ok(Delivery::Sent)
            }
            Err(e) => {
                tracing::error!(message = "failed to publish telemetry record", topic = %self.topic, error = %e);
                Ok(Delivery::Dropped)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Delivery, PollError, Poller};
    use crate::client::{
        AirQuality, Astro, Astronomy, AstronomyResponse, ClientError, Condition, Current, CurrentResponse,
        Illumination, WeatherSource,
    };
    use crate::publish::{PublishError, Publisher};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use reqwest::StatusCode;
    use serde_json::Value;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// Source returning canned responses, or an error for the endpoints marked as failing.
    ///
    /// When `gate` is set, fetching current conditions waits for it to be notified.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct FakeSource {
        pub(crate) fail_current: bool,
        pub(crate) fail_astronomy: bool,
        pub(crate) gate: Option<Arc<Notify>>,
        pub(crate) current_calls: Arc<AtomicUsize>,
        pub(crate) astronomy_dates: Arc<Mutex<Vec<NaiveDate>>>,
    }

    impl FakeSource {
        pub(crate) fn failing() -> Self {
            FakeSource {
                fail_current: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl WeatherSource for FakeSource {
        async fn current(&self) -> Result<CurrentResponse, ClientError> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            if self.fail_current {
                return Err(ClientError::Unexpected(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "/v1/current.json".to_owned(),
                ));
            }

            Ok(CurrentResponse {
                current: Current {
                    last_updated_epoch: Some(1717243200),
                    condition: Some(Condition {
                        text: Some("Sunny".to_owned()),
                    }),
                    temp_c: Some(21.5),
                    feelslike_c: Some(21.0),
                    wind_kph: Some(7.2),
                    gust_kph: Some(9.0),
                    wind_degree: Some(180),
                    pressure_mb: Some(1020.0),
                    pressure_in: Some(30.12),
                    humidity: Some(40),
                    cloud: Some(0),
                    vis_km: Some(10.0),
                    uv: None,
                    air_quality: Some(AirQuality {
                        co: Some(200.0),
                        o3: Some(60.0),
                        no2: Some(10.0),
                        so2: Some(2.0),
                        pm2_5: Some(3.0),
                        pm10: Some(5.0),
                    }),
                },
            })
        }

        async fn astronomy(&self, date: NaiveDate) -> Result<AstronomyResponse, ClientError> {
            self.astronomy_dates.lock().unwrap().push(date);
            if self.fail_astronomy {
                return Err(ClientError::Api {
                    status: StatusCode::BAD_REQUEST,
                    code: 1006,
                    message: "No location found matching parameter 'q'".to_owned(),
                    endpoint: "/v1/astronomy.json".to_owned(),
                });
            }

            Ok(AstronomyResponse {
                astronomy: Astronomy {
                    astro: Astro {
                        sunrise: Some("06:30 AM".to_owned()),
                        sunset: Some("07:45 PM".to_owned()),
                        moon_phase: Some("Full Moon".to_owned()),
                        moon_illumination: Some(Illumination::Text("100".to_owned())),
                    },
                },
            })
        }
    }

    /// Publisher recording every message, optionally rejecting all of them.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingPublisher {
        pub(crate) reject: bool,
        pub(crate) messages: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    }

    impl RecordingPublisher {
        pub(crate) fn count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            self.messages.lock().unwrap().push((topic.to_owned(), payload));
            if self.reject {
                return Err(PublishError::Queue {
                    topic: topic.to_owned(),
                    source: Box::new(io::Error::new(io::ErrorKind::BrokenPipe, "broker gone")),
                });
            }

            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_poll_publishes_one_record() {
        let source = FakeSource::default();
        let publisher = RecordingPublisher::default();
        let poller = Poller::new(source.clone(), publisher.clone(), "weatherapi/out");

        let res = poller.poll_on(today(), &Utc).await.unwrap();
        assert_eq!(Delivery::Sent, res);

        let messages = publisher.messages.lock().unwrap();
        assert_eq!(1, messages.len());

        let (topic, payload) = &messages[0];
        assert_eq!("weatherapi/out", topic);

        let json: Value = serde_json::from_slice(payload).unwrap();
        assert!(json.is_object());
        assert_eq!(Value::from(1717243200), json["time"]);
        assert_eq!(Value::from("current"), json["time_string"]);
        assert_eq!(Value::from("Sunny"), json["summary"]);
        assert_eq!(Value::from(21.5), json["temperature"]);
        assert_eq!(Value::from(30.12), json["rain_intensity"]);
        assert_eq!(Value::from(1020.0), json["pressure"]);
        assert_eq!(Value::from(180), json["wind_bearing"]);
        assert_eq!(Value::from(60.0), json["ozone"]);
        assert_eq!(Value::from("Full Moon"), json["moon_phase"]);
        assert_eq!(Value::from(100), json["moon_illumination"]);
        assert_eq!(Value::from(1717223400), json["sunrise_time"]);
        assert_eq!(Value::from(1717271100), json["sunset_time"]);
        assert_eq!(Value::from(6.5), json["sunrise_time_h"]);
        assert_eq!(Value::from(19.75), json["sunset_time_h"]);
        assert_eq!(Value::Null, json["uv_index"]);
    }

    #[tokio::test]
    async fn test_poll_requests_astronomy_for_today() {
        let source = FakeSource::default();
        let poller = Poller::new(source.clone(), RecordingPublisher::default(), "weatherapi/out");

        poller.poll_on(today(), &Utc).await.unwrap();
        let other = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        poller.poll_on(other, &Utc).await.unwrap();

        assert_eq!(vec![today(), other], *source.astronomy_dates.lock().unwrap());
    }

    #[tokio::test]
    async fn test_poll_current_failure_publishes_nothing() {
        let source = FakeSource::failing();
        let publisher = RecordingPublisher::default();
        let poller = Poller::new(source.clone(), publisher.clone(), "weatherapi/out");

        let err = poller.poll_on(today(), &Utc).await.unwrap_err();
        assert!(matches!(err, PollError::Current(_)));
        assert!(err.is_fetch());
        assert_eq!(0, publisher.count());
        assert!(source.astronomy_dates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_astronomy_failure_publishes_nothing() {
        let source = FakeSource {
            fail_astronomy: true,
            ..Default::default()
        };
        let publisher = RecordingPublisher::default();
        let poller = Poller::new(source, publisher.clone(), "weatherapi/out");

        let err = poller.poll_on(today(), &Utc).await.unwrap_err();
        assert!(matches!(err, PollError::Astronomy { date, .. } if date == today()));
        assert_eq!(0, publisher.count());
    }

    #[tokio::test]
    async fn test_poll_publish_failure_is_not_an_error() {
        let publisher = RecordingPublisher {
            reject: true,
            ..Default::default()
        };
        let poller = Poller::new(FakeSource::default(), publisher.clone(), "weatherapi/out");

        let res = poller.poll_on(today(), &Utc).await.unwrap();
        assert_eq!(Delivery::Dropped, res);
        assert_eq!(1, publisher.count());
    }
}
