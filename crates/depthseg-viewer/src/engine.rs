use crate::sink::{DisplaySink, SinkError, SinkEvent};
use depthseg_core::{
    CompositeError, Compositor, CompositorConfig, FrameRateTracker, FrameSet, StreamKind,
    StreamSynchronizer, SyncConfig, SyncError,
};
use depthseg_hw::{has_stereo, Clock, DeviceError, DeviceRuntime, OutputQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Synced iterations between two throughput log lines.
const FPS_LOG_EVERY: u64 = 100;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(
        "unable to run on a device without depth capabilities (available cameras: {available})"
    )]
    MissingStereo { available: String },
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("sync config: {0}")]
    Sync(#[from] SyncError),
    #[error("composite error: {0}")]
    Composite(#[from] CompositeError),
    #[error("display sink: {0}")]
    Sink(#[from] SinkError),
}

/// Why [`Engine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The display sink reported a quit request.
    Quit,
    /// The shutdown flag was raised (Ctrl-C).
    Interrupted,
    /// The configured number of synced iterations was reached.
    FrameLimit,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub nn_shape: usize,
    pub target_size: u32,
    pub sync: SyncConfig,
    pub poll_interval: Duration,
    /// 0 = unlimited.
    pub max_frames: u64,
}

/// Latest FrameSet with a version that grows on every store.
#[derive(Default)]
struct FrameSlot {
    version: u64,
    frames: Option<FrameSet>,
}

impl FrameSlot {
    fn store(&mut self, frames: FrameSet) {
        self.version += 1;
        self.frames = Some(frames);
    }

    fn latest(&self) -> Option<(u64, &FrameSet)> {
        self.frames.as_ref().map(|f| (self.version, f))
    }
}

/// Single-threaded polling loop: ingest → synchronize → compose → present.
pub struct Engine {
    queues: Vec<(StreamKind, Box<dyn OutputQueue>)>,
    sync: StreamSynchronizer,
    compositor: Compositor,
    fps: FrameRateTracker,
    clock: Arc<dyn Clock>,
    slot: FrameSlot,
    poll_interval: Duration,
    max_frames: u64,
}

impl Engine {
    /// Check device capabilities and take its output queues.
    ///
    /// Fails fast, before any frame is processed, when the device cannot
    /// produce depth.
    pub fn start(
        device: &mut dyn DeviceRuntime,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let cameras = device.connected_cameras();
        if !has_stereo(&cameras) {
            let available = cameras
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(EngineError::MissingStereo { available });
        }

        let max_disparity = device.max_disparity();
        let compositor = Compositor::new(CompositorConfig {
            target_size: options.target_size,
            ..CompositorConfig::new(options.nn_shape, max_disparity)
        })?;
        let sync = StreamSynchronizer::new(options.sync)?;

        let mut queues = Vec::with_capacity(StreamKind::ALL.len());
        for kind in StreamKind::ALL {
            queues.push((kind, device.output_queue(kind)?));
        }

        let layout = compositor.config();
        let window = sync.config();
        tracing::info!(
            device = device.name(),
            max_disparity = layout.max_disparity,
            nn_shape = layout.nn_shape,
            target_size = layout.target_size,
            tolerance_ms = window.tolerance.as_millis() as u64,
            stale_after_ms = window.stale_after.as_millis() as u64,
            "engine ready"
        );

        Ok(Self {
            queues,
            sync,
            compositor,
            fps: FrameRateTracker::new(),
            clock,
            slot: FrameSlot::default(),
            poll_interval: options.poll_interval,
            max_frames: options.max_frames,
        })
    }

    /// One pass over the queues in color, depth, nn order. Once a message
    /// completes a triple, the remaining queues wait for the next pass.
    ///
    /// Returns whether any queue had data.
    pub fn poll_once(&mut self) -> Result<bool, EngineError> {
        let mut busy = false;
        let mut synced = None;
        for (kind, queue) in self.queues.iter_mut() {
            if synced.is_some() {
                break;
            }
            if !queue.has_data() {
                continue;
            }
            busy = true;
            let message = queue.pop()?;
            synced = self.sync.add_message(*kind, message);
        }

        if let Some(triple) = synced {
            self.fps.record_iteration();
            let frames = self.compositor.compose(&triple, self.fps.current_fps())?;
            self.slot.store(frames);

            let count = self.fps.count();
            if count % FPS_LOG_EVERY == 0 {
                tracing::info!(iterations = count, fps = self.fps.current_fps(), "throughput");
            }
        }
        Ok(busy)
    }

    /// Poll until the sink quits, `shutdown` is raised, or the frame limit
    /// is reached. The newest FrameSet is flushed to the sink before
    /// returning.
    pub fn run(
        &mut self,
        sink: &mut dyn DisplaySink,
        shutdown: &AtomicBool,
    ) -> Result<StopReason, EngineError> {
        let reason = self.drive(sink, shutdown)?;
        sink.flush()?;
        for (kind, queue) in &self.queues {
            let dropped = queue.dropped();
            if dropped > 0 {
                tracing::info!(stream = %kind, dropped, "messages dropped by the device queue");
            }
        }
        Ok(reason)
    }

    fn drive(
        &mut self,
        sink: &mut dyn DisplaySink,
        shutdown: &AtomicBool,
    ) -> Result<StopReason, EngineError> {
        let mut shown = 0u64;
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return Ok(StopReason::Interrupted);
            }

            let busy = self.poll_once()?;

            if let Some((version, frames)) = self.slot.latest() {
                if version > shown {
                    sink.present(&frames.panel()?, version)?;
                    shown = version;
                }
            }
            sink.refresh()?;

            if sink.poll_event() == Some(SinkEvent::Quit) {
                return Ok(StopReason::Quit);
            }
            if self.max_frames > 0 && self.fps.count() >= self.max_frames {
                return Ok(StopReason::FrameLimit);
            }
            if !busy {
                self.clock.sleep(self.poll_interval);
            }
        }
    }

    /// Synced iterations processed so far.
    pub fn iterations(&self) -> u64 {
        self.fps.count()
    }
}
