use crate::{
    control::{Action, ControlEvent},
    mpd::{Command, MpdClient, MpdError},
    player::{StatusTracker, Volume},
};

/// Sole owner of the player connection and the last observed status
///
/// Both the poll ticker and the control event handler go through `&mut self`,
/// so status reads and writes never overlap.
pub struct Bridge {
    client: MpdClient,
    tracker: StatusTracker,
    volume_step: i32,
}

impl Bridge {
    #[must_use]
    pub fn new(client: MpdClient, volume_step: i32) -> Self {
        Self {
            client,
            tracker: StatusTracker::default(),
            volume_step,
        }
    }

    #[cfg(test)]
    pub const fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Query the player and log the status if it changed since the last query
    ///
    /// Returns whether the status changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the status query fails.
    pub async fn refresh(&mut self) -> Result<bool, MpdError> {
        let status = self.client.status().await?;
        let changed = self.tracker.observe(status);
        if changed {
            if let Some(status) = self.tracker.current() {
                tracing::info!(
                    "state: {}\tvolume: {}",
                    status.state,
                    Volume(status.volume)
                );
            }
        }
        Ok(changed)
    }

    /// Handle one raw control message
    ///
    /// The status is refreshed before and after the event whatever the payload holds.
    /// Undecodable payloads and failed commands are logged and otherwise ignored.
    /// Returns the command sent to the player, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if refreshing the status fails.
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Result<Option<Command>, MpdError> {
        self.refresh().await?;

        let action = match ControlEvent::decode(payload) {
            Ok(event) => {
                tracing::debug!(
                    action = ?event.action,
                    battery = ?event.battery,
                    linkquality = ?event.linkquality,
                    "Control event decoded"
                );
                event.action()
            }
            Err(e) => {
                tracing::warn!(
                    ?e,
                    payload = %String::from_utf8_lossy(payload),
                    "Failed to decode control event"
                );
                Action::Other(String::new())
            }
        };
        let command = self.dispatch(&action).await?;

        self.refresh().await?;
        Ok(command)
    }

    async fn dispatch(&mut self, action: &Action) -> Result<Option<Command>, MpdError> {
        if action.needs_fresh_volume() {
            self.refresh().await?;
        }
        let Some(command) = action.command(self.tracker.current(), self.volume_step) else {
            tracing::debug!(?action, "No player command for action");
            return Ok(None);
        };

        tracing::debug!(?action, %command, "Sending player command");
        if let Err(e) = self.client.execute(command).await {
            tracing::error!(?e, %command, "Player command failed");
        }
        Ok(Some(command))
    }
}
