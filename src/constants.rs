//! Global constants for the imgenie controller

use std::time::Duration;

// =============================================================================
// Server
// =============================================================================

/// API base URL used when nothing else is configured (native builds)
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5000/api";

/// API path appended to the page origin in the browser
pub const BROWSER_API_PATH: &str = "/api";

/// Per-request timeout for native builds
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// =============================================================================
// Polling
// =============================================================================

/// Interval between server status polls
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between progress polls while a generation is running
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Generation defaults
// =============================================================================

/// Resolutions offered when the server can't tell us
pub const FALLBACK_RESOLUTIONS: [&str; 2] = ["720x720", "1024x1024"];

/// Default inference steps
pub const DEFAULT_STEPS: u32 = 30;

/// Default classifier-free guidance scale
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

/// Default img2img strength (only sent with a reference image)
pub const DEFAULT_STRENGTH: f32 = 0.75;

/// Seed value meaning "pick a random seed"
pub const RANDOM_SEED: i64 = -1;

/// Default weight for a newly selected LoRA
pub const DEFAULT_LORA_WEIGHT: f32 = 1.0;

/// Number of character LoRA slots
pub const CHARACTER_LORA_SLOTS: usize = 2;

/// Image extensions the server accepts for uploads
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_polls_faster_than_status() {
        assert!(PROGRESS_POLL_INTERVAL < STATUS_POLL_INTERVAL);
    }

    #[test]
    fn test_fallback_resolutions_are_well_formed() {
        for res in FALLBACK_RESOLUTIONS {
            assert!(crate::types::parse_resolution(res).is_some(), "{res}");
        }
    }
}
