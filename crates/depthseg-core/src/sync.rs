//! Host-side stream synchronizer.
//!
//! Buffers timestamped messages per stream and reports a [`SyncedTriple`]
//! as soon as every stream holds a message within the match tolerance of
//! the newest arrival. Matching takes the first acceptable entry in each
//! buffer (oldest first), not the closest one, so each attempt is a single
//! pass over the buffers.

use crate::types::{StreamKind, SyncedTriple, TimestampedMessage};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// Maximum capture-time difference for two messages to count as synced.
/// Color and depth arrive at ~30 FPS, i.e. one frame every ~33 ms.
pub const SYNC_TOLERANCE: Duration = Duration::from_millis(33);

/// Entries further than this from a sync point are pruned.
pub const STALE_AFTER: Duration = Duration::from_millis(500);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyncError {
    #[error("match tolerance must be non-zero")]
    ZeroTolerance,
    #[error("stale window {stale_after:?} must exceed match tolerance {tolerance:?}")]
    WindowTooSmall {
        tolerance: Duration,
        stale_after: Duration,
    },
}

/// Synchronizer time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Strict upper bound on |ts - reference| for a match.
    pub tolerance: Duration,
    /// Entries with |ts - reference| above this are stale.
    pub stale_after: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance: SYNC_TOLERANCE,
            stale_after: STALE_AFTER,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.tolerance.is_zero() {
            return Err(SyncError::ZeroTolerance);
        }
        if self.stale_after <= self.tolerance {
            return Err(SyncError::WindowTooSmall {
                tolerance: self.tolerance,
                stale_after: self.stale_after,
            });
        }
        Ok(())
    }
}

/// Per-stream message buffers for the color, depth and nn streams.
///
/// Not internally locked: a concurrent caller must serialize
/// [`add_message`](Self::add_message) calls, since append, scan and prune
/// form one step.
pub struct StreamSynchronizer {
    config: SyncConfig,
    buffers: [VecDeque<TimestampedMessage>; 3],
}

impl StreamSynchronizer {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            config,
            buffers: Default::default(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Ingest one message and try to complete a triple around its timestamp.
    ///
    /// Returns `None` while any stream lacks a message within tolerance;
    /// that is the steady state between sync points, not an error.
    pub fn add_message(
        &mut self,
        stream: StreamKind,
        message: TimestampedMessage,
    ) -> Option<SyncedTriple> {
        let reference = message.timestamp;
        self.buffers[stream.index()].push_back(message);

        let tolerance = self.config.tolerance;
        let mut candidates: [Option<&TimestampedMessage>; 3] = [None; 3];
        for kind in StreamKind::ALL {
            candidates[kind.index()] = self.buffers[kind.index()]
                .iter()
                .find(|m| time_diff(m.timestamp, reference) < tolerance);
        }

        let [Some(color), Some(depth), Some(nn)] = candidates else {
            return None;
        };
        let triple = SyncedTriple {
            color: color.clone(),
            depth: depth.clone(),
            nn: nn.clone(),
        };

        tracing::debug!(
            trigger = %stream,
            reference_ms = reference.as_secs_f64() * 1e3,
            color_seq = triple.color.sequence,
            depth_seq = triple.depth.sequence,
            nn_seq = triple.nn.sequence,
            "synced triple"
        );

        self.prune(reference);
        Some(triple)
    }

    /// Drop the stale prefix of every buffer. Removal stops at the first
    /// entry inside the window, so later stale entries survive until they
    /// reach the front.
    fn prune(&mut self, reference: Duration) {
        let stale_after = self.config.stale_after;
        for kind in StreamKind::ALL {
            let buffer = &mut self.buffers[kind.index()];
            let before = buffer.len();
            while buffer
                .front()
                .is_some_and(|m| time_diff(m.timestamp, reference) > stale_after)
            {
                buffer.pop_front();
            }
            let removed = before - buffer.len();
            if removed > 0 {
                tracing::trace!(
                    stream = %kind,
                    removed,
                    remaining = buffer.len(),
                    "pruned stale messages"
                );
            }
        }
    }

    /// Number of messages currently buffered for `stream`.
    pub fn buffered(&self, stream: StreamKind) -> usize {
        self.buffers[stream.index()].len()
    }

    /// Capture timestamps buffered for `stream`, oldest first.
    pub fn buffered_timestamps(&self, stream: StreamKind) -> Vec<Duration> {
        self.buffers[stream.index()]
            .iter()
            .map(|m| m.timestamp)
            .collect()
    }
}

fn time_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NnOutput, Payload};
    use image::RgbImage;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn msg(ts_ms: u64) -> TimestampedMessage {
        TimestampedMessage::new(ms(ts_ms), ts_ms, Payload::Segmentation(NnOutput { layer: vec![] }))
    }

    fn sync() -> StreamSynchronizer {
        StreamSynchronizer::new(SyncConfig::default()).unwrap()
    }

    #[test]
    fn test_triple_then_prune_scenario() {
        let mut s = sync();
        assert!(s.add_message(StreamKind::Color, msg(100)).is_none());
        assert!(s.add_message(StreamKind::Depth, msg(120)).is_none());
        let triple = s
            .add_message(StreamKind::Nn, msg(115))
            .expect("all three within tolerance");
        assert_eq!(triple.color.timestamp, ms(100));
        assert_eq!(triple.depth.timestamp, ms(120));
        assert_eq!(triple.nn.timestamp, ms(115));

        // Nothing to sync with at 700 ms yet, so nothing is pruned.
        assert!(s.add_message(StreamKind::Depth, msg(700)).is_none());
        assert_eq!(s.buffered_timestamps(StreamKind::Color), vec![ms(100)]);
        assert_eq!(s.buffered_timestamps(StreamKind::Nn), vec![ms(115)]);

        assert!(s.add_message(StreamKind::Color, msg(710)).is_none());
        let triple = s.add_message(StreamKind::Nn, msg(705)).expect("second sync point");
        assert_eq!(triple.depth.timestamp, ms(700));
        assert_eq!(s.buffered_timestamps(StreamKind::Color), vec![ms(710)]);
        assert_eq!(s.buffered_timestamps(StreamKind::Depth), vec![ms(700)]);
        assert_eq!(s.buffered_timestamps(StreamKind::Nn), vec![ms(705)]);
    }

    #[test]
    fn test_any_insertion_order_syncs() {
        let entries = [(StreamKind::Color, 100), (StreamKind::Depth, 120), (StreamKind::Nn, 115)];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let mut s = sync();
            let mut result = None;
            for (n, &i) in order.iter().enumerate() {
                let (kind, ts) = entries[i];
                let out = s.add_message(kind, msg(ts));
                if n < 2 {
                    assert!(out.is_none(), "order {order:?}: synced early");
                }
                result = out;
            }
            let triple = result.unwrap_or_else(|| panic!("order {order:?}: no triple"));
            for (kind, ts) in entries {
                assert_eq!(triple.get(kind).timestamp, ms(ts), "order {order:?}");
            }
        }
    }

    #[test]
    fn test_never_matches_outside_tolerance() {
        let mut s = sync();
        s.add_message(StreamKind::Color, msg(100));
        s.add_message(StreamKind::Depth, msg(133));
        // Exactly 33 ms away is not a match.
        assert!(s.add_message(StreamKind::Nn, msg(100)).is_none());

        let triple = s.add_message(StreamKind::Nn, msg(110)).expect("all within 33 ms of 110");
        let trigger = ms(110);
        for kind in StreamKind::ALL {
            assert!(time_diff(triple.get(kind).timestamp, trigger) < SYNC_TOLERANCE);
        }
        // The earlier nn@100 is still first in its buffer and within tolerance.
        assert_eq!(triple.nn.timestamp, ms(100));
    }

    #[test]
    fn test_first_match_wins_over_closest() {
        let mut s = sync();
        s.add_message(StreamKind::Depth, msg(75));
        s.add_message(StreamKind::Depth, msg(100));
        s.add_message(StreamKind::Color, msg(100));
        let triple = s.add_message(StreamKind::Nn, msg(100)).unwrap();
        assert_eq!(triple.depth.timestamp, ms(75));
    }

    #[test]
    fn test_missing_stream_never_syncs() {
        let mut s = sync();
        for i in 0..100u64 {
            assert!(s.add_message(StreamKind::Color, msg(i * 33)).is_none());
            assert!(s.add_message(StreamKind::Depth, msg(i * 33)).is_none());
        }
        // No sync point, so no pruning either.
        assert_eq!(s.buffered(StreamKind::Color), 100);
        assert_eq!(s.buffered(StreamKind::Depth), 100);
        assert_eq!(s.buffered(StreamKind::Nn), 0);
    }

    #[test]
    fn test_no_premature_pruning() {
        let mut s = sync();
        let mut inserted: Vec<u64> = Vec::new();
        let mut syncs = 0;
        for i in 0..120u64 {
            let ts = i * 30;
            inserted.push(ts);
            s.add_message(StreamKind::Color, msg(ts));
            s.add_message(StreamKind::Depth, msg(ts + 3));
            if let Some(triple) = s.add_message(StreamKind::Nn, msg(ts + 1)) {
                syncs += 1;
                let point = triple.nn.timestamp.max(ms(ts + 1));
                let kept = s.buffered_timestamps(StreamKind::Color);
                for &t in &inserted {
                    if time_diff(ms(t), point) <= STALE_AFTER {
                        assert!(kept.contains(&ms(t)), "color@{t} pruned at sync {point:?}");
                    }
                }
            }
        }
        assert!(syncs > 100);
        assert!(s.buffered(StreamKind::Color) <= 18, "stale prefix should be bounded");
    }

    #[test]
    fn test_prune_stops_at_first_fresh_entry() {
        let mut s = sync();
        // Out-of-order stale entry behind a fresh one survives.
        s.add_message(StreamKind::Color, msg(0));
        s.add_message(StreamKind::Color, msg(900));
        s.add_message(StreamKind::Color, msg(10));
        s.add_message(StreamKind::Color, msg(1000));
        s.add_message(StreamKind::Depth, msg(1000));
        assert!(s.add_message(StreamKind::Nn, msg(1000)).is_some());
        assert_eq!(
            s.buffered_timestamps(StreamKind::Color),
            vec![ms(900), ms(10), ms(1000)]
        );
    }

    #[test]
    fn test_boundary_entry_not_pruned() {
        let mut s = sync();
        s.add_message(StreamKind::Color, msg(500));
        s.add_message(StreamKind::Color, msg(1000));
        s.add_message(StreamKind::Depth, msg(1000));
        assert!(s.add_message(StreamKind::Nn, msg(1000)).is_some());
        assert_eq!(s.buffered(StreamKind::Color), 2);
    }

    #[test]
    fn test_matched_messages_stay_buffered() {
        let mut s = sync();
        let color = Payload::Color(RgbImage::new(1, 1));
        s.add_message(StreamKind::Color, TimestampedMessage::new(ms(10), 1, color));
        s.add_message(StreamKind::Depth, msg(12));
        assert!(s.add_message(StreamKind::Nn, msg(11)).is_some());
        assert_eq!(s.buffered(StreamKind::Color), 1);
        // A second nn message near the same point syncs again.
        assert!(s.add_message(StreamKind::Nn, msg(14)).is_some());
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            SyncConfig { tolerance: Duration::ZERO, stale_after: ms(500) }.validate(),
            Err(SyncError::ZeroTolerance)
        );
        assert!(matches!(
            StreamSynchronizer::new(SyncConfig { tolerance: ms(33), stale_after: ms(33) }),
            Err(SyncError::WindowTooSmall { .. })
        ));
        assert!(SyncConfig::default().validate().is_ok());
    }
}
