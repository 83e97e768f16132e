use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::manifest::ParseOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Video representation to load, as `{width}x{height}`.
    pub preferred_video_key: String,
    /// Audio representation to load, as its sample rate.
    pub preferred_audio_key: String,
    /// Segments per representation when the manifest does not tell.
    pub segment_count: Option<usize>,

    pub retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,

    /// Drop the document node and use `<MPD>` as the root of the tree.
    pub ignore_root: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preferred_video_key: "1920x1080".to_string(),
            preferred_audio_key: "48000".to_string(),
            segment_count: None,
            retries: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 8000,
            ignore_root: true,
        }
    }
}

impl PlayerConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            ignore_root: self.ignore_root,
        }
    }

    /// Delay before retry number `attempt`, starting from 1. Doubles every
    /// attempt and never exceeds `max_retry_delay_ms`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let delay = self
            .retry_delay_ms
            .saturating_mul(factor)
            .min(self.max_retry_delay_ms);
        Duration::from_millis(delay)
    }
}
