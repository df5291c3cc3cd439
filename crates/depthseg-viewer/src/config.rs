use depthseg_core::geometry::TARGET_SIZE;
use depthseg_core::sync::{SyncConfig, STALE_AFTER, SYNC_TOLERANCE};
use std::path::PathBuf;
use std::time::Duration;

/// Where composed panels go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Window when a display is reachable, otherwise the PNG file.
    Auto,
    Window,
    File,
    /// Discard panels.
    Off,
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "window" => Ok(Self::Window),
            "file" => Ok(Self::File),
            "none" | "off" => Ok(Self::Off),
            other => Err(format!("unknown display mode {other:?}")),
        }
    }
}

/// Viewer configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Device profile TOML; the embedded profile when unset.
    pub profile_path: Option<PathBuf>,
    pub display: DisplayMode,
    /// PNG written by the file sink; `None` disables output.
    pub output_path: Option<PathBuf>,
    /// Minimum time between two sink writes.
    pub write_interval: Duration,
    /// Stop after this many synced iterations (0 = run until quit).
    pub max_frames: u64,
    /// Idle sleep when no queue had data.
    pub poll_interval: Duration,
    /// Side of each output panel.
    pub target_size: u32,
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from `DEPTHSEG_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let output_path = match lookup("DEPTHSEG_OUTPUT") {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(PathBuf::from("depthseg-preview.png")),
        };

        let sync = SyncConfig {
            tolerance: millis(&lookup, "DEPTHSEG_SYNC_TOLERANCE_MS", SYNC_TOLERANCE),
            stale_after: millis(&lookup, "DEPTHSEG_STALE_AFTER_MS", STALE_AFTER),
        };

        Self {
            profile_path: lookup("DEPTHSEG_PROFILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            display: parsed(&lookup, "DEPTHSEG_DISPLAY", DisplayMode::Auto),
            output_path,
            write_interval: millis(
                &lookup,
                "DEPTHSEG_WRITE_INTERVAL_MS",
                Duration::from_millis(500),
            ),
            max_frames: parsed(&lookup, "DEPTHSEG_MAX_FRAMES", 0),
            poll_interval: millis(
                &lookup,
                "DEPTHSEG_POLL_INTERVAL_MS",
                Duration::from_millis(1),
            ),
            target_size: parsed(&lookup, "DEPTHSEG_TARGET_SIZE", TARGET_SIZE).max(1),
            sync,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
