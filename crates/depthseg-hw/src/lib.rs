//! depthseg-hw — Device runtime boundary.
//!
//! Defines the non-blocking output queues a stereo camera runtime exposes,
//! decodes raw queue payloads into frames, and ships a synthetic device
//! that emits timestamped color, disparity and segmentation streams.

pub mod clock;
pub mod device;
pub mod frame;
pub mod profile;
pub mod queue;
pub mod synthetic;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use device::{has_stereo, CameraSocket, DeviceError, DeviceRuntime, PipelineSpec};
pub use frame::FrameError;
pub use profile::{ColorLayout, DeviceProfile};
pub use queue::{MessageQueue, OutputQueue};
pub use synthetic::SyntheticDevice;
