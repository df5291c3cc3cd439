//! Device runtime interface consumed by the host pipeline.

use crate::frame::FrameError;
use crate::queue::OutputQueue;
use depthseg_core::StreamKind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("queue {0} is empty")]
    QueueEmpty(String),
    #[error("stream {0} is not available on this device")]
    StreamUnavailable(StreamKind),
    #[error("output queue {0} already taken")]
    QueueTaken(StreamKind),
    #[error("invalid device profile: {0}")]
    InvalidProfile(String),
    #[error("failed to read profile {path}: {source}")]
    ProfileIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad profile TOML: {0}")]
    ProfileParse(#[from] toml::de::Error),
    #[error("payload decode failed: {0}")]
    Frame(#[from] FrameError),
}

/// Physical camera sockets on the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraSocket {
    Rgb,
    Left,
    Right,
}

impl fmt::Display for CameraSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraSocket::Rgb => "RGB",
            CameraSocket::Left => "LEFT",
            CameraSocket::Right => "RIGHT",
        })
    }
}

/// Host-side parameters handed to the device when the pipeline starts.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    /// Side of the square network input and output.
    pub nn_shape: usize,
    /// Compiled model artifact, opaque to the host.
    pub nn_path: PathBuf,
}

/// A started device exposing one output queue per stream.
pub trait DeviceRuntime {
    fn name(&self) -> &str;

    fn connected_cameras(&self) -> Vec<CameraSocket>;

    /// Largest disparity value the stereo engine is configured to emit.
    fn max_disparity(&self) -> f32;

    /// Hand over the output queue for `stream`. Each queue can be taken once.
    fn output_queue(&mut self, stream: StreamKind) -> Result<Box<dyn OutputQueue>, DeviceError>;
}

/// Depth needs both mono cameras.
pub fn has_stereo(cameras: &[CameraSocket]) -> bool {
    cameras.contains(&CameraSocket::Left) && cameras.contains(&CameraSocket::Right)
}
