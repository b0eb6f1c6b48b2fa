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

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike};

/// Layout of the date-qualified time strings, e.g. `2024-06-01 06:42 AM`.
const LOCAL_TIME_LAYOUT: &str = "%Y-%m-%d %I:%M %p";

/// Resolve a short `HH:MM AM/PM` time of day on `date` to an absolute timestamp in `tz`.
///
/// The AM/PM marker is required. Input that doesn't match the layout (including the
/// provider's `No sunrise` / `No sunset` placeholders) or a wall-clock time skipped by a
/// DST transition is logged and yields `None` instead of failing the caller. A time that
/// occurs twice due to a DST transition resolves to the earlier instant.
pub fn parse_local_time<Tz: TimeZone>(date: NaiveDate, time: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = format!("{} {}", date.format("%Y-%m-%d"), time.trim());
    let naive = match NaiveDateTime::parse_from_str(&raw, LOCAL_TIME_LAYOUT) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(message = "unable to parse local time", input = %raw, error = %e);
            return None;
        }
    };

    let resolved = tz.from_local_datetime(&naive).earliest();
    if resolved.is_none() {
        tracing::warn!(message = "local time does not exist in timezone", input = %raw);
    }

    resolved
}

/// Time of day as a single decimal number of hours, `06:30` becomes `6.5`.
pub fn fractional_hour<Tz: TimeZone>(ts: &DateTime<Tz>) -> f64 {
    f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0
}
