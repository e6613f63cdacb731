use std::fmt;

use crate::mpd::MpdError;

/// Current playback status as reported by the player
///
/// Any value is accepted; only `play` matters for the play/pause decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Play,
    Pause,
    Stop,
    Other(String),
}
impl From<&str> for PlaybackState {
    fn from(s: &str) -> Self {
        match s {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            other => Self::Other(other.to_owned()),
        }
    }
}
impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => f.write_str("play"),
            Self::Pause => f.write_str("pause"),
            Self::Stop => f.write_str("stop"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// One snapshot of the player's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: PlaybackState,
    /// Mixer volume in percent, [`None`] if the player has no usable mixer
    pub volume: Option<i32>,
}

impl Status {
    /// Build a snapshot from the `key: value` pairs of a `status` response
    ///
    /// # Errors
    ///
    /// Returns an error if `state` is missing or `volume` is not an integer.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, MpdError> {
        let field = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        let state = field("state")
            .map(PlaybackState::from)
            .ok_or(MpdError::MissingField("state"))?;
        // Servers without a mixer either omit the field or report -1
        let volume = field("volume")
            .map(|v| {
                v.parse::<i32>().map_err(|_| MpdError::InvalidField {
                    field: "volume",
                    value: v.to_owned(),
                })
            })
            .transpose()?
            .filter(|v| *v >= 0);

        Ok(Self { state, volume })
    }
}

/// Displays the volume, or `unknown` for a player without a mixer
pub struct Volume(pub Option<i32>);
impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("unknown"),
        }
    }
}

/// Last observed player status
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: Option<Status>,
}

impl StatusTracker {
    #[must_use]
    pub fn current(&self) -> Option<&Status> {
        self.current.as_ref()
    }

    /// Record a fresh snapshot, returning whether it differs from the previous one
    ///
    /// The very first snapshot always counts as a change.
    pub fn observe(&mut self, status: Status) -> bool {
        let changed = self.current.as_ref() != Some(&status);
        self.current = Some(status);
        changed
    }
}
