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

use crate::client::WeatherSource;
use crate::metrics::BridgeMetrics;
use crate::poll::{PollError, Poller};
use crate::publish::Publisher;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Level};

/// What to do when a poll cycle can't fetch from the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorPolicy {
    /// Log the failure and try again on the next tick.
    Continue,
    /// Stop the scheduler and return the error.
    Exit,
}

/// Runs a poll cycle immediately and then once per period until shut down.
#[derive(Debug)]
pub struct Scheduler<S, P> {
    poller: Poller<S, P>,
    period: Duration,
    policy: FetchErrorPolicy,
    metrics: Arc<BridgeMetrics>,
}

impl<S, P> Scheduler<S, P>
where
    S: WeatherSource,
    P: Publisher,
{
    pub fn new(poller: Poller<S, P>, period: Duration, policy: FetchErrorPolicy, metrics: Arc<BridgeMetrics>) -> Self {
        Scheduler {
            poller,
            period,
            policy,
            metrics,
        }
    }

    pub fn poller(&self) -> &Poller<S, P> {
        &self.poller
    }

    /// Poll until `shutdown` completes.
    ///
    /// Cycles never overlap: a cycle that runs past the period causes the missed ticks
    /// to be skipped. `shutdown` is only checked between cycles so a cycle in progress
    /// always finishes. Returns an error only for fetch failures under
    /// [`FetchErrorPolicy::Exit`].
    pub async fn run<F>(&self, shutdown: F) -> Result<(), PollError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            message = "polling started",
            topic = %self.poller.topic(),
            refresh_secs = self.period.as_secs(),
            policy = ?self.policy,
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!(message = "shutting down, no further poll cycles will start");
                    break;
                }
                _ = interval.tick() => {
                    let res = self
                        .poller
                        .poll()
                        .instrument(tracing::span!(Level::DEBUG, "weatherapi_poll"))
                        .await;
                    self.metrics.observe(&res, chrono::Utc::now().timestamp());

                    if let Err(e) = res {
                        if e.is_fetch() && self.policy == FetchErrorPolicy::Exit {
                            tracing::error!(message = "poll cycle failed, exiting", error = %e);
                            return Err(e);
                        }

                        tracing::error!(message = "poll cycle failed", error = %e);
                    }
                }
            }
        }

        tracing::info!(message = "polling stopped");
        Ok(())
    }
}
