use anyhow::Context;
use pollwatch::cache::{self, Datastore};
use pollwatch::config::{Config, ConfigError};
use pollwatch::datasource::{FlightAwareClient, GeminiClient, MonotonicNonce};
use pollwatch::orchestration::FlightPollerSettings;
use pollwatch::{AppError, Coordinator, FanoutDispatcher, FlightPoller, SpotPricePoller};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    let coordinator = start(&config).await.context("starting poll sessions")?;
    if coordinator.is_empty() {
        tracing::warn!("nothing to poll, set FLIGHTS or SPOT_PAIRS");
        return Ok(());
    }
    tracing::info!(sessions = coordinator.len(), "polling started");

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, stopping");
            token.cancel();
        }
    });

    let failures = coordinator.join_all().await;
    for (entity, e) in &failures {
        tracing::error!(entity = %entity, error = %e, "session failed");
    }
    if !failures.is_empty() {
        anyhow::bail!("{} session(s) failed", failures.len());
    }
    Ok(())
}

async fn start(config: &Config) -> Result<Coordinator, AppError> {
    let backend = cache::connect(&config.cache).await?;
    let dispatcher = Arc::new(FanoutDispatcher::from_config(&config.messaging));
    if dispatcher.is_empty() {
        return Err(ConfigError::InvalidValue(
            "LOG_STDOUT".to_string(),
            "false with no Twilio or Slack settings leaves no messaging transport".to_string(),
        )
        .into());
    }
    let recipients = config.messaging.recipients.clone();
    let mut coordinator = Coordinator::new();

    if !config.flights.is_empty() {
        let api_key = config
            .flightaware
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("FLIGHTAWARE_API_KEY".to_string()))?;
        let source = Arc::new(FlightAwareClient::new(
            config.flightaware.base_url.clone(),
            api_key,
        ));
        let poller = FlightPoller::new(
            source,
            dispatcher.clone(),
            Datastore::from_config(backend.clone(), &config.cache),
            config.flight_notifications,
            recipients.clone(),
        )
        .with_settings(FlightPollerSettings {
            poll_interval: config.flight_poll_interval,
            ..FlightPollerSettings::default()
        });
        for target in &config.flights {
            coordinator
                .start_flight(&poller, &target.ident, target.ident_type)
                .await?;
        }
    }

    if !config.spot_pairs.is_empty() {
        let source = Arc::new(GeminiClient::new(
            config.gemini.base_url.clone(),
            config.gemini.credentials.clone(),
            Arc::new(MonotonicNonce::new()),
        ));
        let poller = SpotPricePoller::new(
            source,
            dispatcher.clone(),
            recipients.clone(),
            config.spot_poll_interval,
        )
        .with_cache(Datastore::from_config(backend.clone(), &config.cache));
        for pair in &config.spot_pairs {
            coordinator.start_spot(&poller, pair.clone())?;
        }
    }

    Ok(coordinator)
}
