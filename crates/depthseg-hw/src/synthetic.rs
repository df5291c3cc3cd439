//! Synthetic stereo device.
//!
//! Emulates the three output queues of a stereo camera with an on-board
//! segmentation network: a person-shaped blob drifts across the scene and
//! is rendered into a BGR color frame, a disparity frame and a
//! class-index layer. Messages are produced lazily against a [`Clock`]:
//! each one becomes available `latency` after its capture time, and queues
//! drop their oldest entries when the host falls behind.
//!
//! Segmentation results carry the capture time of the preview frame they
//! were computed from, so they arrive late but stamp early.

use crate::clock::Clock;
use crate::device::{CameraSocket, DeviceError, DeviceRuntime, PipelineSpec};
use crate::frame;
use crate::profile::{ColorLayout, DeviceProfile, StreamTiming};
use crate::queue::{MessageQueue, OutputQueue};
use depthseg_core::{NnOutput, Payload, StreamKind, TimestampedMessage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

/// Seconds for one left-right sweep of the person.
const SWEEP_PERIOD_SECS: f32 = 4.0;
/// Fraction of the frame width at the left edge with no valid disparity.
const INVALID_BORDER: f32 = 0.05;

pub struct SyntheticDevice {
    profile: DeviceProfile,
    pipeline: PipelineSpec,
    clock: Arc<dyn Clock>,
    scene: Arc<Scene>,
    taken: [bool; 3],
}

impl SyntheticDevice {
    pub fn new(
        profile: DeviceProfile,
        pipeline: PipelineSpec,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DeviceError> {
        if pipeline.nn_shape == 0 {
            return Err(DeviceError::InvalidProfile("nn_shape must be at least 1".into()));
        }
        if !pipeline.nn_path.exists() {
            tracing::warn!(
                path = %pipeline.nn_path.display(),
                "model artifact not found; synthetic device renders segmentation itself"
            );
        }
        tracing::info!(
            name = %profile.device.name,
            stereo = profile.device.stereo,
            max_disparity = profile.device.max_disparity,
            nn_shape = pipeline.nn_shape,
            "synthetic device started"
        );

        let scene = Arc::new(Scene {
            max_disparity: profile.device.max_disparity,
        });
        Ok(Self {
            profile,
            pipeline,
            clock,
            scene,
            taken: [false; 3],
        })
    }

    fn slot(stream: StreamKind) -> usize {
        match stream {
            StreamKind::Color => 0,
            StreamKind::Depth => 1,
            StreamKind::Nn => 2,
        }
    }
}

impl DeviceRuntime for SyntheticDevice {
    fn name(&self) -> &str {
        &self.profile.device.name
    }

    fn connected_cameras(&self) -> Vec<CameraSocket> {
        if self.profile.device.stereo {
            vec![CameraSocket::Rgb, CameraSocket::Left, CameraSocket::Right]
        } else {
            vec![CameraSocket::Rgb]
        }
    }

    fn max_disparity(&self) -> f32 {
        self.profile.device.max_disparity
    }

    fn output_queue(&mut self, stream: StreamKind) -> Result<Box<dyn OutputQueue>, DeviceError> {
        if stream == StreamKind::Depth && !self.profile.device.stereo {
            return Err(DeviceError::StreamUnavailable(stream));
        }
        let slot = Self::slot(stream);
        if self.taken[slot] {
            return Err(DeviceError::QueueTaken(stream));
        }
        self.taken[slot] = true;

        let (source, timing) = match stream {
            StreamKind::Color => (
                Source::Color {
                    width: self.profile.color.width,
                    height: self.profile.color.height,
                    layout: self.profile.color.layout,
                },
                self.profile.color.timing.clone(),
            ),
            StreamKind::Depth => (
                Source::Depth {
                    width: self.profile.depth.width,
                    height: self.profile.depth.height,
                },
                self.profile.depth.timing.clone(),
            ),
            StreamKind::Nn => (
                Source::Nn {
                    shape: self.pipeline.nn_shape,
                },
                self.profile.nn.timing.clone(),
            ),
        };

        let seed = self.profile.device.seed.wrapping_add(slot as u64);
        Ok(Box::new(SyntheticQueue {
            source,
            timing,
            clock: Arc::clone(&self.clock),
            scene: Arc::clone(&self.scene),
            pending: MessageQueue::new(stream.name(), self.profile.queue.max_size),
            capacity: self.profile.queue.max_size,
            nominal: Duration::ZERO,
            next_capture: Duration::ZERO,
            sequence: 0,
            skipped: 0,
            rng: StdRng::seed_from_u64(seed),
            failed: None,
        }))
    }
}

enum Source {
    Color {
        width: u32,
        height: u32,
        layout: ColorLayout,
    },
    Depth { width: u32, height: u32 },
    Nn { shape: usize },
}

struct SyntheticQueue {
    source: Source,
    timing: StreamTiming,
    clock: Arc<dyn Clock>,
    scene: Arc<Scene>,
    pending: MessageQueue,
    capacity: usize,
    nominal: Duration,
    next_capture: Duration,
    sequence: u64,
    /// Captures that aged out before the host polled.
    skipped: u64,
    rng: StdRng,
    failed: Option<DeviceError>,
}

impl SyntheticQueue {
    /// Produce every message whose availability time has passed. Captures
    /// that would be dropped on overflow anyway are skipped unrendered.
    fn refill(&mut self) {
        let now = self.clock.now();
        let latency = self.timing.latency();
        let horizon = self.timing.period() * self.capacity as u32;

        while self.failed.is_none() && self.next_capture + latency <= now {
            let capture = self.next_capture;
            let age = now - (capture + latency);
            if age < horizon {
                match self.render(capture) {
                    Ok(message) => self.pending.push(message),
                    Err(e) => {
                        tracing::error!(
                            queue = %self.pending.name(),
                            error = %e,
                            "render failed"
                        );
                        self.failed = Some(e);
                    }
                }
            } else {
                self.skipped += 1;
            }
            self.sequence += 1;
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.nominal += self.timing.period();
        let jitter = self.timing.jitter().as_secs_f64();
        if jitter <= 0.0 {
            self.next_capture = self.nominal;
            return;
        }
        let offset = self.rng.gen_range(-jitter..=jitter);
        let jittered = Duration::from_secs_f64((self.nominal.as_secs_f64() + offset).max(0.0));
        self.next_capture = jittered.max(self.next_capture);
    }

    fn render(&self, capture: Duration) -> Result<TimestampedMessage, DeviceError> {
        let payload = match self.source {
            Source::Color {
                width,
                height,
                layout,
            } => {
                let raw = self.scene.render_color(capture, width, height, layout);
                let image = match layout {
                    ColorLayout::Planar => frame::planar_bgr_to_rgb(&raw, width, height)?,
                    ColorLayout::Interleaved => {
                        frame::interleaved_bgr_to_rgb(&raw, width, height)?
                    }
                };
                Payload::Color(image)
            }
            Source::Depth { width, height } => {
                let raw = self.scene.render_disparity(capture, width, height);
                let image = if self.scene.max_disparity > u8::MAX as f32 {
                    let bytes: Vec<u8> = raw.iter().flat_map(|v| v.to_le_bytes()).collect();
                    frame::disparity_from_u16le(&bytes, width, height)?
                } else {
                    let bytes: Vec<u8> = raw.iter().map(|&v| v as u8).collect();
                    frame::disparity_from_u8(&bytes, width, height)?
                };
                Payload::Disparity(image)
            }
            Source::Nn { shape } => {
                let raw = self.scene.render_segmentation(capture, shape);
                let layer = frame::int32_layer_from_le(&raw)?;
                Payload::Segmentation(NnOutput { layer })
            }
        };
        Ok(TimestampedMessage::new(capture, self.sequence, payload))
    }
}

impl OutputQueue for SyntheticQueue {
    fn name(&self) -> &str {
        self.pending.name()
    }

    fn has_data(&mut self) -> bool {
        self.refill();
        self.failed.is_some() || !self.pending.is_empty()
    }

    fn pop(&mut self) -> Result<TimestampedMessage, DeviceError> {
        self.refill();
        if let Some(e) = self.failed.take() {
            return Err(e);
        }
        self.pending.pop()
    }

    fn dropped(&self) -> u64 {
        self.pending.dropped() + self.skipped
    }
}

/// Scene geometry, in coordinates normalized to the central square of a
/// frame (the region the network preview sees).
struct Scene {
    max_disparity: f32,
}

impl Scene {
    fn person_center(capture: Duration) -> (f32, f32) {
        let phase = capture.as_secs_f32() / SWEEP_PERIOD_SECS * TAU;
        (0.5 + 0.25 * phase.sin(), 0.6)
    }

    /// Torso disc plus head disc.
    fn is_person(center: (f32, f32), u: f32, v: f32) -> bool {
        let (cx, cy) = center;
        let torso = (u - cx).powi(2) + (v - cy).powi(2) < 0.22f32.powi(2);
        let head = (u - cx).powi(2) + (v - (cy - 0.32)).powi(2) < 0.11f32.powi(2);
        torso || head
    }

    /// Map pixel (x, y) of a `width`×`height` frame into square coordinates.
    fn to_square(x: u32, y: u32, width: u32, height: u32) -> (f32, f32) {
        let side = width.min(height) as f32;
        let x0 = (width as f32 - side) / 2.0;
        let y0 = (height as f32 - side) / 2.0;
        ((x as f32 + 0.5 - x0) / side, (y as f32 + 0.5 - y0) / side)
    }

    fn render_color(
        &self,
        capture: Duration,
        width: u32,
        height: u32,
        layout: ColorLayout,
    ) -> Vec<u8> {
        let center = Self::person_center(capture);
        let plane = (width * height) as usize;
        let mut raw = vec![0u8; plane * 3];
        for y in 0..height {
            for x in 0..width {
                let (u, v) = Self::to_square(x, y, width, height);
                let (b, g, r) = if Self::is_person(center, u, v) {
                    (90, 140, 210)
                } else {
                    let fy = y as f32 / height as f32;
                    let fx = x as f32 / width as f32;
                    ((80.0 + 100.0 * fy) as u8, (60.0 + 60.0 * fx) as u8, 40)
                };
                let i = (y * width + x) as usize;
                match layout {
                    ColorLayout::Planar => {
                        raw[i] = b;
                        raw[plane + i] = g;
                        raw[2 * plane + i] = r;
                    }
                    ColorLayout::Interleaved => {
                        raw[3 * i..3 * i + 3].copy_from_slice(&[b, g, r]);
                    }
                }
            }
        }
        raw
    }

    fn render_disparity(&self, capture: Duration, width: u32, height: u32) -> Vec<u16> {
        let center = Self::person_center(capture);
        let person = (self.max_disparity * 0.75) as u16;
        let border = (width as f32 * INVALID_BORDER) as u32;
        let mut out = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let (u, v) = Self::to_square(x, y, width, height);
                let value = if x < border {
                    0
                } else if Self::is_person(center, u, v) {
                    person
                } else {
                    let floor = self.max_disparity * (0.1 + 0.3 * y as f32 / height as f32);
                    floor as u16
                };
                out.push(value);
            }
        }
        out
    }

    /// Little-endian int32 class indices, `shape`×`shape`, row-major.
    fn render_segmentation(&self, capture: Duration, shape: usize) -> Vec<u8> {
        let center = Self::person_center(capture);
        let side = shape as u32;
        let mut out = Vec::with_capacity(shape * shape * 4);
        for y in 0..side {
            for x in 0..side {
                let (u, v) = Self::to_square(x, y, side, side);
                let class = i32::from(Self::is_person(center, u, v));
                out.extend_from_slice(&class.to_le_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::path::PathBuf;

    const PROFILE: &str = r#"
        [device]
        name = "test rig"
        stereo = true
        max_disparity = 95.0

        [color]
        width = 64
        height = 36
        fps = 20.0
        latency_ms = 5.0

        [depth]
        width = 32
        height = 18
        fps = 20.0
        latency_ms = 10.0

        [nn]
        fps = 10.0
        latency_ms = 70.0
    "#;

    fn device(src: &str) -> (SyntheticDevice, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let device = SyntheticDevice::new(
            DeviceProfile::parse(src).unwrap(),
            PipelineSpec {
                nn_shape: 16,
                nn_path: PathBuf::from("/nonexistent/model.blob"),
            },
            clock.clone(),
        )
        .unwrap();
        (device, clock)
    }

    #[test]
    fn test_color_available_after_latency() {
        let (mut dev, clock) = device(PROFILE);
        let mut q = dev.output_queue(StreamKind::Color).unwrap();
        assert!(!q.has_data());
        clock.set(Duration::from_millis(5));
        assert!(q.has_data());
        let msg = q.pop().unwrap();
        assert_eq!(msg.timestamp, Duration::ZERO);
        assert_eq!(msg.color_frame().unwrap().dimensions(), (64, 36));
        assert!(!q.has_data());
        assert!(matches!(q.pop(), Err(DeviceError::QueueEmpty(_))));
    }

    #[test]
    fn test_nn_stamped_with_capture_time() {
        let (mut dev, clock) = device(PROFILE);
        let mut q = dev.output_queue(StreamKind::Nn).unwrap();
        clock.set(Duration::from_millis(69));
        assert!(!q.has_data());
        clock.set(Duration::from_millis(170));
        assert!(q.has_data());
        let first = q.pop().unwrap();
        let second = q.pop().unwrap();
        assert_eq!(first.timestamp, Duration::ZERO);
        assert_eq!(second.timestamp, Duration::from_millis(100));
        assert_eq!(first.segmentation().unwrap().layer.len(), 16 * 16);
    }

    #[test]
    fn test_backlog_keeps_newest() {
        let (mut dev, clock) = device(PROFILE);
        let mut q = dev.output_queue(StreamKind::Depth).unwrap();
        clock.set(Duration::from_secs(10));
        let mut stamps = Vec::new();
        while q.has_data() {
            stamps.push(q.pop().unwrap().timestamp);
        }
        assert_eq!(stamps.len(), 4);
        assert_eq!(q.dropped() + 4, 200, "every other capture aged out");
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert!(*stamps.last().unwrap() + Duration::from_millis(10) <= Duration::from_secs(10));
        assert!(stamps[0] >= Duration::from_millis(9700));
    }

    #[test]
    fn test_person_visible_in_all_streams() {
        let (mut dev, clock) = device(PROFILE);
        let mut color = dev.output_queue(StreamKind::Color).unwrap();
        let mut depth = dev.output_queue(StreamKind::Depth).unwrap();
        let mut nn = dev.output_queue(StreamKind::Nn).unwrap();
        clock.set(Duration::from_millis(70));

        let layer = nn.pop().unwrap().segmentation().unwrap().layer.clone();
        let foreground = layer.iter().filter(|&&c| c == 1).count();
        assert!(foreground > 0 && foreground < layer.len(), "foreground = {foreground}");
        assert!(layer.iter().all(|&c| c == 0 || c == 1));

        let disparity = depth.pop().unwrap();
        let disparity = disparity.disparity().unwrap();
        assert_eq!(disparity.get_pixel(0, 9).0[0], 0, "invalid left border");
        assert_eq!(disparity.get_pixel(16, 12).0[0], 71, "person at frame center");
        assert!(disparity.pixels().all(|p| p.0[0] <= 95));

        let frame = color.pop().unwrap();
        let frame = frame.color_frame().unwrap();
        assert_eq!(frame.get_pixel(32, 24).0, [210, 140, 90]);
    }

    #[test]
    fn test_interleaved_color_layout() {
        let src = PROFILE.replace("[color]", "[color]\nlayout = \"interleaved\"");
        let (mut dev, clock) = device(&src);
        let mut color = dev.output_queue(StreamKind::Color).unwrap();
        clock.set(Duration::from_millis(5));
        let frame = color.pop().unwrap();
        let frame = frame.color_frame().unwrap();
        assert_eq!(frame.dimensions(), (64, 36));
        assert_eq!(frame.get_pixel(32, 24).0, [210, 140, 90]);
        assert_eq!(color.dropped(), 0);
    }

    #[test]
    fn test_jitter_keeps_order() {
        let src = PROFILE.replace("latency_ms = 5.0", "latency_ms = 5.0\njitter_ms = 8.0");
        let (mut dev, clock) = device(&src);
        let mut q = dev.output_queue(StreamKind::Color).unwrap();
        let mut last = None;
        for step in 0..200 {
            clock.set(Duration::from_millis(step * 10));
            while q.has_data() {
                let ts = q.pop().unwrap().timestamp;
                if let Some(prev) = last {
                    assert!(ts >= prev);
                }
                last = Some(ts);
            }
        }
        assert!(last.is_some());
    }

    #[test]
    fn test_depth_requires_stereo() {
        let src = PROFILE.replace("stereo = true", "stereo = false");
        let (mut dev, _) = device(&src);
        assert_eq!(dev.connected_cameras(), vec![CameraSocket::Rgb]);
        assert!(matches!(
            dev.output_queue(StreamKind::Depth),
            Err(DeviceError::StreamUnavailable(StreamKind::Depth))
        ));
    }

    #[test]
    fn test_queue_taken_once() {
        let (mut dev, _) = device(PROFILE);
        assert!(dev.output_queue(StreamKind::Nn).is_ok());
        assert!(matches!(
            dev.output_queue(StreamKind::Nn),
            Err(DeviceError::QueueTaken(StreamKind::Nn))
        ));
        assert_eq!(dev.max_disparity(), 95.0);
        assert_eq!(dev.name(), "test rig");
    }
}
