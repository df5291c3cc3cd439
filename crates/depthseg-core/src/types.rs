use crate::segmentation::DecodeError;
use image::{ImageBuffer, Luma, RgbImage};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Single-channel disparity frame. 8-bit disparity is widened losslessly.
pub type DisparityImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// The three device output streams the host reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Color,
    Depth,
    Nn,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Color, StreamKind::Depth, StreamKind::Nn];

    /// Output queue name used by the device runtime.
    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Nn => "nn",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            StreamKind::Color => 0,
            StreamKind::Depth => 1,
            StreamKind::Nn => 2,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First output layer of the segmentation network, flattened row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NnOutput {
    pub layer: Vec<i32>,
}

/// Decoded message contents.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Color preview frame, already converted to RGB order.
    Color(RgbImage),
    /// Raw stereo disparity.
    Disparity(DisparityImage),
    /// Per-pixel class indices from the segmentation network.
    Segmentation(NnOutput),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Color(_) => "color",
            Payload::Disparity(_) => "disparity",
            Payload::Segmentation(_) => "segmentation",
        }
    }
}

/// A device message stamped with its capture time (since device boot).
///
/// The payload is shared: a message stays buffered in the synchronizer
/// after it has been handed out as part of a triple.
#[derive(Debug, Clone)]
pub struct TimestampedMessage {
    pub timestamp: Duration,
    pub sequence: u64,
    payload: Arc<Payload>,
}

impl TimestampedMessage {
    pub fn new(timestamp: Duration, sequence: u64, payload: Payload) -> Self {
        Self {
            timestamp,
            sequence,
            payload: Arc::new(payload),
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn color_frame(&self) -> Result<&RgbImage, DecodeError> {
        match self.payload() {
            Payload::Color(frame) => Ok(frame),
            other => Err(DecodeError::WrongPayload {
                expected: "color",
                found: other.kind(),
            }),
        }
    }

    pub fn disparity(&self) -> Result<&DisparityImage, DecodeError> {
        match self.payload() {
            Payload::Disparity(frame) => Ok(frame),
            other => Err(DecodeError::WrongPayload {
                expected: "disparity",
                found: other.kind(),
            }),
        }
    }

    pub fn segmentation(&self) -> Result<&NnOutput, DecodeError> {
        match self.payload() {
            Payload::Segmentation(out) => Ok(out),
            other => Err(DecodeError::WrongPayload {
                expected: "segmentation",
                found: other.kind(),
            }),
        }
    }
}

/// One message per stream, all within the match tolerance of the
/// message whose arrival completed the set.
#[derive(Debug, Clone)]
pub struct SyncedTriple {
    pub color: TimestampedMessage,
    pub depth: TimestampedMessage,
    pub nn: TimestampedMessage,
}

impl SyncedTriple {
    pub fn get(&self, stream: StreamKind) -> &TimestampedMessage {
        match stream {
            StreamKind::Color => &self.color,
            StreamKind::Depth => &self.depth,
            StreamKind::Nn => &self.nn,
        }
    }
}
