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

use crate::client::{AirQuality, Astro, Current, Illumination};
use crate::sun::{fractional_hour, parse_local_time};
use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Time slot label of records built from current conditions.
pub const TIME_SLOT_CURRENT: &str = "current";

/// Flat telemetry record published for each poll cycle.
///
/// Every field is optional. Values missing upstream are serialized as JSON `null`
/// rather than omitted or zeroed so that consumers can tell "unknown" from "zero".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TelemetryRecord {
    pub time: Option<i64>,
    pub time_string: Option<String>,
    pub summary: Option<String>,
    pub sunrise_time: Option<i64>,
    pub sunset_time: Option<i64>,
    pub sunrise_time_h: Option<f64>,
    pub sunset_time_h: Option<f64>,
    pub rain_intensity: Option<f64>,
    pub temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_bearing: Option<i64>,
    pub cloud_cover: Option<i64>,
    pub humidity: Option<i64>,
    pub pressure: Option<f64>,
    pub visibility: Option<f64>,
    pub ozone: Option<f64>,
    pub carbon_oxide: Option<f64>,
    pub nitrogen_oxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub moon_phase: Option<String>,
    pub moon_illumination: Option<i64>,
    pub uv_index: Option<f64>,
}

impl TelemetryRecord {
    /// Combine current conditions and astronomy for `today` into a single record.
    ///
    /// Sunrise and sunset are resolved as wall-clock times on `today` in `tz`. Values
    /// that can't be parsed are logged and left unset; mapping itself never fails.
    pub fn map<Tz: TimeZone>(current: &Current, astro: &Astro, today: NaiveDate, tz: &Tz) -> Self {
        let sunrise = astro
            .sunrise
            .as_deref()
            .and_then(|s| parse_local_time(today, s, tz));
        let sunset = astro
            .sunset
            .as_deref()
            .and_then(|s| parse_local_time(today, s, tz));

        let aq = current.air_quality.as_ref();
        let air = |f: fn(&AirQuality) -> Option<f64>| aq.and_then(f);

        TelemetryRecord {
            time: current.last_updated_epoch,
            time_string: Some(TIME_SLOT_CURRENT.to_owned()),
            summary: current.condition.as_ref().and_then(|c| c.text.clone()),
            sunrise_time: sunrise.as_ref().map(|t| t.timestamp()),
            sunset_time: sunset.as_ref().map(|t| t.timestamp()),
            sunrise_time_h: sunrise.as_ref().map(fractional_hour),
            sunset_time_h: sunset.as_ref().map(fractional_hour),
            // The current conditions endpoint has no precipitation intensity; the
            // record carries pressure in inches in this slot.
            rain_intensity: current.pressure_in,
            temperature: current.temp_c,
            apparent_temperature: current.feelslike_c,
            wind_speed: current.wind_kph,
            wind_gust: current.gust_kph,
            wind_bearing: current.wind_degree,
            cloud_cover: current.cloud,
            humidity: current.humidity,
            pressure: current.pressure_mb,
            visibility: current.vis_km,
            ozone: air(|a| a.o3),
            carbon_oxide: air(|a| a.co),
            nitrogen_oxide: air(|a| a.no2),
            sulphur_dioxide: air(|a| a.so2),
            pm2_5: air(|a| a.pm2_5),
            pm10: air(|a| a.pm10),
            moon_phase: astro.moon_phase.clone(),
            moon_illumination: astro.moon_illumination.as_ref().and_then(parse_illumination),
            uv_index: current.uv,
        }
    }
}

fn parse_illumination(raw: &Illumination) -> Option<i64> {
    match raw {
        Illumination::Number(n) if n.is_finite() => Some(n.round() as i64),
        Illumination::Number(n) => {
            tracing::warn!(message = "moon illumination is not finite", value = %n);
            None
        }
        Illumination::Text(s) => match s.trim().parse::<i64>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(message = "unable to parse moon illumination", value = %s, error = %e);
                None
            }
        },
    }
}
