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

//! Relay weatherapi.com conditions to an MQTT topic
//!
//! ## Features
//!
//! `weatherapi_mqtt` fetches current conditions and astronomy information for a single location from
//! [weatherapi.com] every few minutes, flattens them into a single JSON record, and publishes the record to an
//! MQTT topic for consumption by a home-automation or monitoring stack. Every field is nullable: measurements
//! the provider doesn't report for a location are published as `null` rather than `0`.
//!
//! The record contains the following fields.
//!
//! * `time` - Unix time the conditions were last updated by the provider.
//! * `time_string` - Always `current`.
//! * `summary` - Text description of the conditions, e.g. `Partly cloudy`.
//! * `temperature`, `apparent_temperature` - Temperature and feels-like temperature, in degrees celsius.
//! * `wind_speed`, `wind_gust` - In kilometers per hour. `wind_bearing` - In degrees.
//! * `cloud_cover`, `humidity` - Percent (0-100).
//! * `pressure` - In millibars. `rain_intensity` - Pressure in inches.
//! * `visibility` - In kilometers. `uv_index` - UV index.
//! * `ozone`, `carbon_oxide`, `nitrogen_oxide`, `sulphur_dioxide`, `pm2_5`, `pm10` - Air quality, in μg/m3.
//! * `sunrise_time`, `sunset_time` - Unix time of today's sunrise and sunset.
//! * `sunrise_time_h`, `sunset_time_h` - Local time of day of sunrise and sunset, in hours (`6.5` is 06:30).
//! * `moon_phase`, `moon_illumination` - Moon phase name and illumination percentage.
//!
//! [weatherapi.com]: https://www.weatherapi.com/docs/
//!
//! ## Build
//!
//! `weatherapi_mqtt` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/weatherapi_mqtt.git && cd weatherapi_mqtt
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! `weatherapi_mqtt` needs an API key along with the latitude and longitude of the location to fetch conditions
//! for. These can be given as flags or as the environment variables `WEATHERAPI_API`, `WEATHERAPI_LAT`, and
//! `WEATHERAPI_LONG`. A `.env` file in the working directory is read at startup if present.
//!
//! ```text
//! ./weatherapi_mqtt --latitude 42.36 --longitude -71.06 --api-key $KEY --mqtt-host broker.local
//! ```
//!
//! Records are published to `weatherapi/out` at QoS 0 and are not retained. By default, a failure to fetch
//! from the API is logged and retried on the next cycle. Pass `--exit-on-fetch-error` to exit instead, leaving
//! restarts to a supervisor such as Systemd.
//!
//! ### Metrics
//!
//! When started with `--metrics-bind 0.0.0.0:9783`, counts of poll cycles by outcome are exposed in the
//! Prometheus text format at `/metrics`.
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod poll;
pub mod publish;
pub mod record;
pub mod scheduler;
pub mod sun;
