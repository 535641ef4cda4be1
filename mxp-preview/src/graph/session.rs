//! One live preview graph: source → effect chain → gain

use crate::audio::{AudioFrame, DecodedAudioBuffer};
use crate::graph::chain::EffectChain;
use crate::graph::gain::{GainHandle, GainNode};
use crate::graph::node::AudioNode;
use crate::graph::source::{BufferSource, StopOutcome};
use std::sync::Arc;
use uuid::Uuid;

/// A connected playback graph.
///
/// Built completely (decoded buffer, effects, gain) before it is handed to the
/// audio context, so a failed fetch or decode never leaves a partial graph.
pub struct PlaybackSession {
    playback_id: Uuid,
    session_id: String,
    source: BufferSource,
    effects: EffectChain,
    gain: GainNode,
    started_at_context_time: f64,
}

impl PlaybackSession {
    pub fn new(
        session_id: impl Into<String>,
        buffer: Arc<DecodedAudioBuffer>,
        offset_secs: f64,
        effects: EffectChain,
        gain: GainNode,
        started_at_context_time: f64,
    ) -> Self {
        Self {
            playback_id: Uuid::new_v4(),
            session_id: session_id.into(),
            source: BufferSource::start(buffer, offset_secs),
            effects,
            gain,
            started_at_context_time,
        }
    }

    /// Render one frame; effect tails keep rendering on silence after the source ends
    pub fn render(&mut self) -> AudioFrame {
        let input = self.source.next_frame().unwrap_or_default();
        let processed = self.effects.process(input);
        self.gain.process(processed)
    }

    pub fn stop(&mut self) -> StopOutcome {
        self.source.stop()
    }

    pub fn playback_id(&self) -> Uuid {
        self.playback_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn gain(&self) -> GainHandle {
        self.gain.handle()
    }

    pub fn effects(&self) -> &EffectChain {
        &self.effects
    }

    pub fn source(&self) -> &BufferSource {
        &self.source
    }

    /// True once the source has played its last frame
    pub fn has_ended(&self) -> bool {
        self.source.is_finished()
    }

    pub fn position_secs(&self) -> f64 {
        self.source.position_secs()
    }

    pub fn started_at_context_time(&self) -> f64 {
        self.started_at_context_time
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("playback_id", &self.playback_id)
            .field("session_id", &self.session_id)
            .field("effects", &self.effects)
            .field("started_at_context_time", &self.started_at_context_time)
            .finish()
    }
}
