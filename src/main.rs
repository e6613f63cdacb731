use anyhow::{Context as _, Result};
use event_loop::{event_loop, Bridge};

mod broker;
mod config;
mod control;
mod event_loop;
mod mpd;
mod player;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    config::init_tracing_subscriber(config::log_file_from_env().as_deref())?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mpd-remote-bridge startup");

    let result = run().await;
    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}

async fn run() -> Result<()> {
    let config = config::Config::from_env().context("Couldn't get settings")?;
    config.log_summary();

    tracing::info!(server = %config.mpd_server, "Connecting to MPD");
    let client = mpd::MpdClient::connect(&config.mpd_server)
        .await
        .context("Couldn't connect to MPD")?;
    tracing::info!(server = %client.addr(), version = %client.version(), "Connected to MPD");

    let (payloads, listener) = broker::subscribe(&config)
        .await
        .context("Couldn't connect to MQTT")?;

    event_loop(Bridge::new(client, config.volume_step), payloads, listener).await
}
