//! Control events published by the remote and the player commands they map to

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    mpd::Command,
    player::{PlaybackState, Status},
};

/// A control event as published by the remote
///
/// Keys are matched case-insensitively (`Action`, `action` and `ACTION` are the same field).
/// Missing or `null` fields are treated as absent.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlEvent {
    pub action: Option<String>,
    pub battery: Option<i64>,
    pub linkquality: Option<i64>,
}

impl ControlEvent {
    /// Decode a raw message payload
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object of the expected shape.
    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        let object: Map<String, Value> = serde_json::from_slice(payload)?;
        let object = object
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        serde_json::from_value(Value::Object(object))
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action.as_deref().unwrap_or_default().into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    PlayPause,
    RotateLeft,
    RotateRight,
    SkipBackward,
    SkipForward,
    /// Anything else, including the empty action. Ignored.
    Other(String),
}
impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "play_pause" => Self::PlayPause,
            "rotate_left" => Self::RotateLeft,
            "rotate_right" => Self::RotateRight,
            "skip_backward" => Self::SkipBackward,
            "skip_forward" => Self::SkipForward,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Action {
    /// Whether the player status must be refreshed right before deciding on a command
    #[must_use]
    pub const fn needs_fresh_volume(&self) -> bool {
        matches!(self, Self::RotateLeft | Self::RotateRight)
    }

    /// Pick the player command for this action given the last observed status
    ///
    /// Returns [`None`] for ignored actions, and for rotations while the volume is unknown.
    #[must_use]
    pub fn command(&self, status: Option<&Status>, volume_step: i32) -> Option<Command> {
        let volume = status.and_then(|s| s.volume);
        match self {
            Self::PlayPause => match status.map(|s| &s.state) {
                Some(PlaybackState::Play) => Some(Command::Pause),
                _ => Some(Command::Play),
            },
            Self::RotateLeft => volume.map(|v| Command::SetVolume(v.saturating_sub(volume_step))),
            Self::RotateRight => volume.map(|v| Command::SetVolume(v.saturating_add(volume_step))),
            Self::SkipBackward => Some(Command::Previous),
            Self::SkipForward => Some(Command::Next),
            Self::Other(_) => None,
        }
    }
}
