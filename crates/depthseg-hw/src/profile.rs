//! Device profiles.
//!
//! A profile describes what a device exposes: camera sockets, stereo
//! range, per-stream resolution and timing, and queue depth. The default
//! profile is embedded at compile time from `profiles/oak-d.toml`.

use crate::device::DeviceError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const BUILTIN_OAK_D: &str = include_str!("../profiles/oak-d.toml");

/// Top-level profile file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceProfile {
    pub device: DeviceInfo,
    pub color: FrameStream,
    pub depth: FrameStream,
    pub nn: NnStream,
    #[serde(default)]
    pub queue: QueueInfo,
}

/// `[device]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    /// Both LEFT and RIGHT mono cameras are present.
    pub stereo: bool,
    pub max_disparity: f32,
    /// Seed for synthetic timing jitter.
    #[serde(default)]
    pub seed: u64,
}

/// `[color]` / `[depth]` sections.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameStream {
    pub width: u32,
    pub height: u32,
    /// Byte layout of color frames; ignored for depth.
    #[serde(default)]
    pub layout: ColorLayout,
    #[serde(flatten)]
    pub timing: StreamTiming,
}

/// How the color camera packs BGR samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLayout {
    /// Three full planes: B, then G, then R.
    #[default]
    Planar,
    /// BGR triplets per pixel.
    Interleaved,
}

/// `[nn]` section. Tensor size comes from the pipeline, not the profile.
#[derive(Debug, Clone, Deserialize)]
pub struct NnStream {
    #[serde(flatten)]
    pub timing: StreamTiming,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamTiming {
    pub fps: f64,
    #[serde(default)]
    pub jitter_ms: f64,
    /// Delay between capture and availability on the host.
    #[serde(default)]
    pub latency_ms: f64,
}

impl StreamTiming {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs_f64(self.jitter_ms / 1e3)
    }

    pub fn latency(&self) -> Duration {
        Duration::from_secs_f64(self.latency_ms / 1e3)
    }

    fn validate(&self, stream: &str) -> Result<(), DeviceError> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(DeviceError::InvalidProfile(format!(
                "{stream}: fps must be positive, got {}",
                self.fps
            )));
        }
        for (field, value) in [("jitter_ms", self.jitter_ms), ("latency_ms", self.latency_ms)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DeviceError::InvalidProfile(format!(
                    "{stream}: {field} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// `[queue]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueInfo {
    pub max_size: usize,
}

impl Default for QueueInfo {
    fn default() -> Self {
        Self { max_size: 4 }
    }
}

impl DeviceProfile {
    /// The embedded OAK-D profile.
    pub fn builtin() -> Result<Self, DeviceError> {
        Self::parse(BUILTIN_OAK_D)
    }

    pub fn load(path: &Path) -> Result<Self, DeviceError> {
        let src = std::fs::read_to_string(path).map_err(|source| DeviceError::ProfileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let profile = Self::parse(&src)?;
        tracing::info!(
            path = %path.display(),
            name = %profile.device.name,
            "loaded device profile"
        );
        Ok(profile)
    }

    pub fn parse(src: &str) -> Result<Self, DeviceError> {
        let profile: DeviceProfile = toml::from_str(src)?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<(), DeviceError> {
        if !(self.device.max_disparity.is_finite() && self.device.max_disparity > 0.0) {
            return Err(DeviceError::InvalidProfile(format!(
                "max_disparity must be positive, got {}",
                self.device.max_disparity
            )));
        }
        for (stream, frames) in [("color", &self.color), ("depth", &self.depth)] {
            if frames.width == 0 || frames.height == 0 {
                return Err(DeviceError::InvalidProfile(format!(
                    "{stream}: resolution {}x{} is empty",
                    frames.width, frames.height
                )));
            }
            frames.timing.validate(stream)?;
        }
        self.nn.timing.validate("nn")?;
        if self.queue.max_size == 0 {
            return Err(DeviceError::InvalidProfile("queue max_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profile() {
        let profile = DeviceProfile::builtin().unwrap();
        assert!(profile.device.stereo);
        assert_eq!(profile.device.max_disparity, 95.0);
        assert_eq!((profile.color.width, profile.color.height), (1280, 720));
        assert_eq!(profile.queue.max_size, 4);
        assert_eq!(profile.color.layout, ColorLayout::Planar);
        assert!(profile.nn.timing.latency() > profile.color.timing.latency());
    }

    #[test]
    fn test_color_layout() {
        let src = BUILTIN_OAK_D.replace("layout = \"planar\"", "layout = \"interleaved\"");
        let profile = DeviceProfile::parse(&src).unwrap();
        assert_eq!(profile.color.layout, ColorLayout::Interleaved);

        let src = BUILTIN_OAK_D.replace("layout = \"planar\"", "layout = \"nv12\"");
        assert!(matches!(DeviceProfile::parse(&src), Err(DeviceError::ProfileParse(_))));
    }

    #[test]
    fn test_queue_section_defaults() {
        let src = r#"
            [device]
            name = "mono only"
            stereo = false
            max_disparity = 48.0

            [color]
            width = 640
            height = 480
            fps = 15.0

            [depth]
            width = 640
            height = 480
            fps = 15.0

            [nn]
            fps = 5.0
        "#;
        let profile = DeviceProfile::parse(src).unwrap();
        assert!(!profile.device.stereo);
        assert_eq!(profile.queue.max_size, 4);
        assert_eq!(profile.nn.timing.jitter(), Duration::ZERO);
        assert_eq!(profile.color.timing.period(), Duration::from_secs_f64(1.0 / 15.0));
    }

    #[test]
    fn test_rejects_bad_values() {
        let src = BUILTIN_OAK_D.replace("max_disparity = 95.0", "max_disparity = 0.0");
        assert!(matches!(DeviceProfile::parse(&src), Err(DeviceError::InvalidProfile(_))));

        let src = BUILTIN_OAK_D.replace("fps = 12.0", "fps = 0.0");
        assert!(matches!(
            DeviceProfile::parse(&src),
            Err(DeviceError::InvalidProfile(msg)) if msg.starts_with("nn")
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(DeviceProfile::parse("[device"), Err(DeviceError::ProfileParse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = DeviceProfile::load(Path::new("/nonexistent/profile.toml")).unwrap_err();
        assert!(matches!(err, DeviceError::ProfileIo { .. }));
    }
}
