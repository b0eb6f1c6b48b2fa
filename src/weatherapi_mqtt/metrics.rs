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

use crate::poll::{Delivery, PollError};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
    Published,
    PublishFailed,
    FetchFailed,
    EncodeFailed,
}

impl Outcome {
    /// Label value, in the snake_case Prometheus uses for label values.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::PublishFailed => "publish_failed",
            Self::FetchFailed => "fetch_failed",
            Self::EncodeFailed => "encode_failed",
        }
    }
}

impl EncodeLabelValue for Outcome {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        EncodeLabelValue::encode(&self.as_str(), encoder)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: Outcome,
}

/// Holder for metrics describing poll cycles.
///
/// All metrics are created and registered upon call to `BridgeMetrics::new()` and share
/// the prefix "weatherapi_".
#[derive(Debug)]
pub struct BridgeMetrics {
    cycles: Family<OutcomeLabels, Counter>,
    last_success: Gauge,
}

impl BridgeMetrics {
    /// Create a new `BridgeMetrics` and register each metric with the provided `Registry`.
    pub fn new(reg: &mut Registry) -> Self {
        let cycles = Family::<OutcomeLabels, Counter>::default();
        let last_success = Gauge::default();

        reg.register(
            "weatherapi_poll_cycles",
            "Completed poll cycles by outcome",
            cycles.clone(),
        );
        reg.register(
            "weatherapi_last_success_timestamp_seconds",
            "Unix time of the last published telemetry record",
            last_success.clone(),
        );

        Self { cycles, last_success }
    }

    /// Count the result of a poll cycle that finished at Unix time `now`.
    pub fn observe(&self, res: &Result<Delivery, PollError>, now: i64) {
        let outcome = match res {
            Ok(Delivery::Sent) => {
                self.last_success.set(now);
                Outcome::Published
            }
            Ok(Delivery::Dropped) => Outcome::PublishFailed,
            Err(e) if e.is_fetch() => Outcome::FetchFailed,
            Err(_) => Outcome::EncodeFailed,
        };

        self.cycles.get_or_create(&OutcomeLabels { outcome }).inc();
    }

    pub fn cycles(&self, outcome: Outcome) -> u64 {
        self.cycles.get_or_create(&OutcomeLabels { outcome }).get()
    }
}
