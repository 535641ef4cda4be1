//! Event types for the MXP event system
//!
//! Provides the preview event definitions and the EventBus used to publish them.
//!
//! Consumers (visualizers, transport UIs, the CLI) subscribe explicitly instead of
//! listening on a global object, so every listener is enumerable and analysis output
//! can be asserted on in tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Instrument label used for analysis of the full preview mix
pub const MASTER_INSTRUMENT: &str = "master";

/// Why a playback session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Caller asked for the preview to stop
    Requested,
    /// A newer preview replaced this one
    Replaced,
    /// Seek restarted playback from a new offset
    Seek,
    /// Source reached the end of its buffer
    Ended,
}

/// Left/right waveform snapshot for stereo visualizations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StereoData {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// One instrument's analysis for a single display frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    pub instrument: String,
    /// Magnitude spectrum (positive frequencies only)
    pub spectrum: Vec<f32>,
    pub stereo: StereoData,
}

/// Analysis payload broadcast once per display frame while a preview plays.
///
/// Shape: `{instruments: [..], spectrum: {name: [..]}, stereo: {name: {left, right}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisUpdate {
    pub instruments: Vec<String>,
    pub spectrum: BTreeMap<String, Vec<f32>>,
    pub stereo: BTreeMap<String, StereoData>,
}

impl AnalysisUpdate {
    /// Collect per-instrument frames into the keyed broadcast payload
    pub fn from_frames(frames: Vec<AnalysisFrame>) -> Self {
        let mut update = Self::default();
        for frame in frames {
            update.instruments.push(frame.instrument.clone());
            update.spectrum.insert(frame.instrument.clone(), frame.spectrum);
            update.stereo.insert(frame.instrument, frame.stereo);
        }
        update
    }
}

/// MXP event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so they can
/// be forwarded to external listeners unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreviewEvent {
    /// A playback session became audible
    PlaybackStarted {
        /// Identifier of this playback session (new for every start, including seeks)
        playback_id: Uuid,
        /// Backend mixing session being previewed
        session_id: String,
        /// Buffer duration in seconds
        duration_secs: f64,
        /// Playback sample rate
        sample_rate: u32,
        /// Channel count of the decoded source
        channels: u16,
        /// Offset playback started from
        offset_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback session was torn down
    PlaybackStopped {
        playback_id: Uuid,
        session_id: String,
        reason: StopReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Gain of the active session changed
    VolumeChanged {
        /// Applied level after clamping (0.0-1.0)
        level: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Live spectrum and stereo analysis for the current display frame
    AnalysisUpdate {
        playback_id: Uuid,
        update: AnalysisUpdate,
    },
}

impl PreviewEvent {
    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            PreviewEvent::PlaybackStarted { .. } => "PlaybackStarted",
            PreviewEvent::PlaybackStopped { .. } => "PlaybackStopped",
            PreviewEvent::VolumeChanged { .. } => "VolumeChanged",
            PreviewEvent::AnalysisUpdate { .. } => "AnalysisUpdate",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and skip
/// old events rather than blocking publishers.
pub struct EventBus {
    tx: broadcast::Sender<PreviewEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use mxp_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PreviewEvent,
    ) -> Result<usize, broadcast::error::SendError<PreviewEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PreviewEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str) -> AnalysisFrame {
        AnalysisFrame {
            instrument: name.to_string(),
            spectrum: vec![0.1, 0.2],
            stereo: StereoData {
                left: vec![0.5],
                right: vec![-0.5],
            },
        }
    }

    #[test]
    fn test_eventbus_subscribe_counts() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);

        let _rx = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(16);
        let event = PreviewEvent::VolumeChanged {
            level: 0.5,
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());

        // Lossy emit must not panic
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(PreviewEvent::VolumeChanged {
            level: 0.25,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PreviewEvent::VolumeChanged { level, .. } => assert_eq!(level, 0.25),
            other => panic!("Wrong event received: {:?}", other),
        }
    }

    #[test]
    fn test_analysis_update_payload_shape() {
        let update = AnalysisUpdate::from_frames(vec![frame(MASTER_INSTRUMENT), frame("drums")]);
        assert_eq!(update.instruments, vec!["master", "drums"]);

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["instruments"][0], "master");
        assert_eq!(json["spectrum"]["drums"].as_array().unwrap().len(), 2);
        assert_eq!(json["stereo"]["master"]["left"][0], 0.5);
        assert_eq!(json["stereo"]["master"]["right"][0], -0.5);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PreviewEvent::PlaybackStopped {
            playback_id: Uuid::new_v4(),
            session_id: "s1".to_string(),
            reason: StopReason::Ended,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["reason"], "ended");
        assert_eq!(json["session_id"], "s1");
    }
}
