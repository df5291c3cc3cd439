//! depthseg-core — Host-side synchronization and fusion engine.
//!
//! Reconciles the color, disparity and segmentation streams of a stereo
//! camera with an on-board neural accelerator into synchronized triples,
//! then derives the fused mask overlay and the depth cutout from them.

pub mod colormap;
pub mod compositor;
pub mod fps;
pub mod geometry;
pub mod segmentation;
pub mod sync;
pub mod text;
pub mod types;

pub use colormap::ColorMap;
pub use compositor::{CompositeError, Compositor, CompositorConfig, FrameSet};
pub use fps::FrameRateTracker;
pub use segmentation::{ClassPalette, DecodeError, SegmentationDecoder, SegmentationTensor};
pub use sync::{StreamSynchronizer, SyncConfig, SyncError};
pub use types::{DisparityImage, NnOutput, Payload, StreamKind, SyncedTriple, TimestampedMessage};
