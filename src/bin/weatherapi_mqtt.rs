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

use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;
use weatherapi_mqtt::client::{Location, WeatherApiClient};
use weatherapi_mqtt::http::RequestContext;
use weatherapi_mqtt::metrics::BridgeMetrics;
use weatherapi_mqtt::poll::Poller;
use weatherapi_mqtt::publish::{MqttPublisher, MqttSettings};
use weatherapi_mqtt::scheduler::{FetchErrorPolicy, Scheduler};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_REFRESH_SECS: u64 = 300;
const DEFAULT_TIMEOUT_MILLIS: u64 = 10000;
const DEFAULT_API_URL: &str = "http://api.weatherapi.com/v1/";
const DEFAULT_MQTT_HOST: &str = "localhost";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_CLIENT_ID: &str = "weatherapi_mqtt";
const DEFAULT_TOPIC: &str = "weatherapi/out";

#[derive(Debug, Parser)]
#[clap(name = "weatherapi_mqtt", version = clap::crate_version!())]
struct WeatherApiMqttApplication {
    /// API key for weatherapi.com
    #[clap(long, env = "WEATHERAPI_API", hide_env_values = true)]
    api_key: String,

    /// Latitude of the location to fetch conditions for
    #[clap(long, env = "WEATHERAPI_LAT", allow_hyphen_values = true)]
    latitude: String,

    /// Longitude of the location to fetch conditions for
    #[clap(long, env = "WEATHERAPI_LONG", allow_hyphen_values = true)]
    longitude: String,

    /// Base URL for the weatherapi.com API
    #[clap(long, env = "WEATHERAPI_URL", default_value = DEFAULT_API_URL)]
    api_url: Url,

    /// MQTT broker host to publish records to
    #[clap(long, env = "MQTT_HOST", default_value_t = DEFAULT_MQTT_HOST.into())]
    mqtt_host: String,

    /// MQTT broker port
    #[clap(long, env = "MQTT_PORT", default_value_t = DEFAULT_MQTT_PORT)]
    mqtt_port: u16,

    /// Client ID to use when connecting to the MQTT broker
    #[clap(long, env = "MQTT_CLIENT_ID", default_value_t = DEFAULT_MQTT_CLIENT_ID.into())]
    mqtt_client_id: String,

    /// Username for the MQTT broker, requires --mqtt-password
    #[clap(long, env = "MQTT_USERNAME", requires = "mqtt_password")]
    mqtt_username: Option<String>,

    /// Password for the MQTT broker, requires --mqtt-username
    #[clap(long, env = "MQTT_PASSWORD", hide_env_values = true, requires = "mqtt_username")]
    mqtt_password: Option<String>,

    /// MQTT topic to publish records to
    #[clap(long, env = "MQTT_TOPIC", default_value_t = DEFAULT_TOPIC.into())]
    topic: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Fetch conditions from the weatherapi.com API at this interval, in seconds.
    #[clap(long, default_value_t = DEFAULT_REFRESH_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    refresh_secs: u64,

    /// Timeout for each request to the weatherapi.com API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Exit with an error when conditions can't be fetched instead of retrying on the
    /// next interval.
    #[clap(long)]
    exit_on_fetch_error: bool,

    /// Address to expose Prometheus metrics about poll cycles on. Metrics are not
    /// exposed unless this is set.
    #[clap(long)]
    metrics_bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Settings may come from a .env file in the working directory, when there is one.
    let dotenv = dotenvy::dotenv();
    let opts = WeatherApiMqttApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    if let Ok(path) = dotenv {
        tracing::debug!(message = "loaded environment file", path = %path.display());
    }

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let location = Location::new(opts.latitude.clone(), opts.longitude.clone());
    let client = WeatherApiClient::new(http_client, opts.api_url.clone(), &opts.api_key, location).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize weatherapi client", error = %e);
        process::exit(1)
    });

    let settings = MqttSettings {
        host: opts.mqtt_host.clone(),
        port: opts.mqtt_port,
        client_id: opts.mqtt_client_id.clone(),
        credentials: opts.mqtt_username.clone().zip(opts.mqtt_password.clone()),
    };
    let (publisher, connection) = MqttPublisher::connect(&settings);

    let mut registry = Registry::default();
    let metrics = Arc::new(BridgeMetrics::new(&mut registry));

    if let Some(bind) = opts.metrics_bind {
        let context = Arc::new(RequestContext::new(registry));
        let server = axum::Server::try_bind(&bind).unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %bind, error = %e);
            process::exit(1)
        });

        tokio::spawn(async move {
            tracing::info!(message = "metrics server started", address = %bind);
            if let Err(e) = server.serve(weatherapi_mqtt::http::app(context).into_make_service()).await {
                tracing::error!(message = "metrics server failed", error = %e);
            }
        });
    }

    let policy = if opts.exit_on_fetch_error {
        FetchErrorPolicy::Exit
    } else {
        FetchErrorPolicy::Continue
    };

    tracing::info!(
        message = "starting weatherapi relay",
        api_url = %opts.api_url,
        location = %client.location(),
        mqtt_host = %opts.mqtt_host,
        mqtt_port = opts.mqtt_port,
    );

    let poller = Poller::new(client, publisher, opts.topic.clone());
    let scheduler = Scheduler::new(poller, Duration::from_secs(opts.refresh_secs), policy, metrics);
    let res = scheduler
        .run(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await;

    scheduler.poller().publisher().disconnect();
    connection.abort();

    if let Err(e) = res {
        tracing::error!(message = "relay stopped after fetch failure", error = %e);
        process::exit(1);
    }

    tracing::info!("relay shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
