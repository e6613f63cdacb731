mod bridge;

use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tokio::{
    select,
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

pub use bridge::Bridge;

/// Cadence of the player status poll
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll the player every [`POLL_INTERVAL`] and handle control messages as they arrive
///
/// Runs until the player connection fails or the broker listener stops.
///
/// # Errors
///
/// Returns an error if a status query fails or the broker listener stops.
pub async fn event_loop(
    mut bridge: Bridge,
    mut payloads: mpsc::Receiver<Vec<u8>>,
    mut listener: JoinHandle<Result<()>>,
) -> Result<()> {
    let mut poll_timer = interval(POLL_INTERVAL);
    poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = poll_timer.tick() => {
                bridge.refresh().await.context("Couldn't update MPD state")?;
            }
            Some(payload) = payloads.recv() => {
                bridge
                    .handle_payload(&payload)
                    .await
                    .context("Couldn't update MPD state while handling control event")?;
            }
            result = &mut listener => {
                match result {
                    Ok(Ok(())) => bail!("MQTT listener stopped"),
                    Ok(Err(e)) => return Err(e.context("MQTT listener failed")),
                    Err(e) => return Err(e).context("MQTT listener task failed"),
                }
            }
        }
    }
}
