//! Audio preview orchestrator
//!
//! Mediates between the render backend and the audio graph. Fetches rendered
//! audio, decodes it, builds the effect chain and drives transport (play, stop,
//! seek, volume). Lifecycle and live analysis are published on the `EventBus`.
//!
//! # Invariants
//! - At most one live graph per orchestrator. Every new graph is connected
//!   only after the previous one has been stopped and disconnected.
//! - A graph is connected only once its buffer has decoded and its effects have
//!   been built, so a failed fetch or decode never leaves a partial graph.
//! - `stop_preview` and a newer `play_preview` supersede an in-flight play: its
//!   fetch is cancelled and it resolves to `Error::Cancelled` without connecting.

use crate::analysis::{spawn_analysis_driver, AnalysisSettings, DEFAULT_TAP_CAPACITY};
use crate::audio::{CpalOutputFactory, DecodedAudioBuffer, OutputFactory, PreviewDecoder};
use crate::cache::BufferCache;
use crate::client::RenderClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{
    setup_effect_chain, AudioContext, EffectChain, GainHandle, GainNode, PlaybackSession,
};
use crate::options::{AudioPreviewOptions, EffectChainConfig, PreviewRequest};
use mxp_common::events::{EventBus, PreviewEvent, StopReason};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Buffer metadata returned when playback starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    #[serde(rename = "duration")]
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PreviewInfo {
    fn of(buffer: &DecodedAudioBuffer) -> Self {
        Self {
            duration_secs: buffer.duration_secs(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
        }
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_duration_secs: f64,
    pub analysis: AnalysisSettings,
    /// Frames buffered between the render callback and the analysis loop
    pub tap_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_duration_secs: crate::options::DEFAULT_PREVIEW_DURATION_SECS,
            analysis: AnalysisSettings::default(),
            tap_capacity: DEFAULT_TAP_CAPACITY,
        }
    }
}

/// The preview currently connected to the audio context
struct ActivePreview {
    playback_id: Uuid,
    session_id: String,
    buffer: Arc<DecodedAudioBuffer>,
    effects: EffectChainConfig,
    gain: GainHandle,
}

#[derive(Default)]
struct TransportState {
    /// Bumped by every play and stop; a play may only connect if it still matches
    generation: u64,
    /// Cancels the in-flight play, if any
    pending: Option<CancellationToken>,
    active: Option<ActivePreview>,
}

/// Transport state shared with the analysis loop
struct Transport {
    state: Mutex<TransportState>,
    events: Arc<EventBus>,
}

impl Transport {
    /// Stop and disconnect the active preview; returns false when nothing was active
    fn teardown(
        &self,
        state: &mut TransportState,
        context: Option<&AudioContext>,
        reason: StopReason,
    ) -> bool {
        let Some(active) = state.active.take() else {
            return false;
        };

        if let Some(context) = context {
            context.disconnect_if(active.playback_id);
        }

        info!(
            playback_id = %active.playback_id,
            session_id = %active.session_id,
            ?reason,
            "Preview stopped"
        );
        self.events.emit_lossy(PreviewEvent::PlaybackStopped {
            playback_id: active.playback_id,
            session_id: active.session_id,
            reason,
            timestamp: chrono::Utc::now(),
        });
        true
    }

    /// Tear down `playback_id` after its source played to the end
    fn finish_if_ended(&self, context: &AudioContext, playback_id: Uuid) {
        let mut state = self.state.lock();
        let is_active = state
            .active
            .as_ref()
            .is_some_and(|active| active.playback_id == playback_id);

        if is_active {
            self.teardown(&mut state, Some(context), StopReason::Ended);
        } else {
            // Connected outside the transport (should not happen); still enforce one graph
            context.disconnect_if(playback_id);
        }
    }
}

/// Fetches, decodes and plays rendered mix previews
pub struct PreviewOrchestrator {
    client: RenderClient,
    output_factory: Arc<dyn OutputFactory>,
    /// Created on the first `play_preview`
    context: OnceCell<Arc<AudioContext>>,
    events: Arc<EventBus>,
    cache: BufferCache,
    transport: Arc<Transport>,
    settings: OrchestratorSettings,
    shutdown: CancellationToken,
}

impl PreviewOrchestrator {
    pub fn new(
        client: RenderClient,
        output_factory: Arc<dyn OutputFactory>,
        events: Arc<EventBus>,
        settings: OrchestratorSettings,
    ) -> Self {
        let transport = Arc::new(Transport {
            state: Mutex::new(TransportState::default()),
            events: Arc::clone(&events),
        });

        Self {
            client,
            output_factory,
            context: OnceCell::new(),
            events,
            cache: BufferCache::new(),
            transport,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build an orchestrator playing through the configured cpal device
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = RenderClient::new(&config.api_base_url, config.request_timeout)?;
        let factory = CpalOutputFactory::new(config.device.clone(), config.buffer_size);
        Ok(Self::new(
            client,
            Arc::new(factory),
            Arc::new(EventBus::new(config.event_capacity)),
            OrchestratorSettings {
                default_duration_secs: config.default_duration_secs,
                analysis: config.analysis.clone(),
                tap_capacity: DEFAULT_TAP_CAPACITY,
            },
        ))
    }

    /// Subscribe to lifecycle and analysis events
    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn client(&self) -> &RenderClient {
        &self.client
    }

    /// Fetch rendered preview bytes without touching the audio graph.
    ///
    /// The bytes are returned exactly as the backend sent them.
    pub async fn generate_preview(
        &self,
        session_id: &str,
        options: &AudioPreviewOptions,
    ) -> Result<Vec<u8>> {
        let request = self.request(session_id, options);
        self.client.render_genre_preview(&request).await
    }

    /// Stop whatever is playing, then fetch, decode and play a new preview.
    ///
    /// # Errors
    /// - `Error::Network`/`Error::HttpStatus` when the render fails
    /// - `Error::Decode` when the rendered bytes cannot be decoded
    /// - `Error::AudioOutput` when the audio context cannot be created
    /// - `Error::Cancelled` when a stop or newer play superseded this call
    ///
    /// On any error no graph is connected.
    pub async fn play_preview(
        &self,
        session_id: &str,
        options: &AudioPreviewOptions,
    ) -> Result<PreviewInfo> {
        let (generation, token) = self.begin_play();
        let result = self.play_inner(session_id, options, generation, &token).await;

        if let Err(e) = &result {
            let mut state = self.transport.state.lock();
            if state.generation == generation {
                state.pending = None;
            }
            warn!(session_id, "Preview playback failed: {}", e);
        }
        result
    }

    async fn play_inner(
        &self,
        session_id: &str,
        options: &AudioPreviewOptions,
        generation: u64,
        token: &CancellationToken,
    ) -> Result<PreviewInfo> {
        let context = cancellable(token, self.ensure_context()).await??;
        let request = self.request(session_id, options);
        let buffer = self.load_buffer(&request, &context, token).await?;

        let effects = request.effects().clone();
        let sample_rate = context.sample_rate();
        let chain = cancellable(token, build_chain(effects.clone(), sample_rate)).await??;

        let mut state = self.transport.state.lock();
        if state.generation != generation || token.is_cancelled() {
            return Err(Error::Cancelled(format!(
                "Preview for session '{}' was superseded",
                session_id
            )));
        }

        let info = PreviewInfo::of(&buffer);
        self.connect(&mut state, &context, session_id, buffer, effects, chain, 0.0, 1.0);
        state.pending = None;
        Ok(info)
    }

    /// Stop the active preview and cancel any in-flight play.
    ///
    /// Safe to call at any time; returns whether a preview was playing.
    pub fn stop_preview(&self) -> bool {
        let mut state = self.transport.state.lock();
        state.generation += 1;
        if let Some(token) = state.pending.take() {
            debug!("Cancelling in-flight preview request");
            token.cancel();
        }
        self.transport
            .teardown(&mut state, self.context.get().map(Arc::as_ref), StopReason::Requested)
    }

    /// Restart the active preview from `time_secs`.
    ///
    /// The source cannot be repositioned, so playback stops and a new graph
    /// starts at the offset: the restart is audible and effect tails are
    /// rebuilt. The volume level carries over. The target is clamped to
    /// `[0, duration]`. Returns the offset used, or `None` without a session.
    pub async fn seek_to(&self, time_secs: f64) -> Result<Option<f64>> {
        let Some(context) = self.context.get().cloned() else {
            return Ok(None);
        };

        let snapshot = {
            let state = self.transport.state.lock();
            state.active.as_ref().map(|active| {
                (
                    active.playback_id,
                    state.generation,
                    Arc::clone(&active.buffer),
                    active.effects.clone(),
                )
            })
        };
        let Some((playback_id, generation, buffer, effects)) = snapshot else {
            debug!("Seek ignored: no active preview");
            return Ok(None);
        };

        let offset = if time_secs.is_finite() {
            time_secs.clamp(0.0, buffer.duration_secs())
        } else {
            0.0
        };

        let chain = build_chain(effects.clone(), context.sample_rate()).await?;

        let mut state = self.transport.state.lock();
        let unchanged = state.generation == generation
            && state
                .active
                .as_ref()
                .is_some_and(|active| active.playback_id == playback_id);
        if !unchanged {
            return Err(Error::Cancelled(
                "Preview changed while seeking".to_string(),
            ));
        }

        let (session_id, level) = match state.active.as_ref() {
            Some(active) => (active.session_id.clone(), active.gain.get()),
            None => return Ok(None),
        };

        self.transport
            .teardown(&mut state, Some(&context), StopReason::Seek);
        self.connect(&mut state, &context, &session_id, buffer, effects, chain, offset, level);

        Ok(Some(offset))
    }

    /// Set the active preview's gain, clamped to `[0, 1]`.
    ///
    /// Returns the applied level, or `None` when nothing is playing.
    pub fn set_volume(&self, level: f32) -> Option<f32> {
        let state = self.transport.state.lock();
        let active = state.active.as_ref()?;
        let applied = active.gain.set(level);

        debug!(requested = level, applied, "Volume changed");
        self.events.emit_lossy(PreviewEvent::VolumeChanged {
            level: applied,
            timestamp: chrono::Utc::now(),
        });
        Some(applied)
    }

    /// Current gain of the active preview
    pub fn volume(&self) -> Option<f32> {
        let state = self.transport.state.lock();
        state.active.as_ref().map(|active| active.gain.get())
    }

    /// Build an effect chain at the audio context rate (or the preferred
    /// output rate before the context exists)
    pub fn setup_effect_chain(&self, config: &EffectChainConfig) -> EffectChain {
        let sample_rate = self
            .context
            .get()
            .map(|context| context.sample_rate())
            .unwrap_or(crate::audio::output::PREFERRED_SAMPLE_RATE);
        setup_effect_chain(config, sample_rate)
    }

    /// Drop all cached decoded buffers; returns how many were dropped
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    pub fn cached_buffers(&self) -> usize {
        self.cache.len()
    }

    pub fn is_playing(&self) -> bool {
        let active = self.transport.state.lock().active.is_some();
        active
            && self
                .context
                .get()
                .is_some_and(|context| context.has_live_session())
    }

    /// Playback position of the active preview in seconds
    pub fn position(&self) -> Option<f64> {
        self.context
            .get()?
            .with_session(|session| session.position_secs())
    }

    pub fn active_playback_id(&self) -> Option<Uuid> {
        self.transport
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| active.playback_id)
    }

    /// Number of graphs connected to the audio context (0 or 1)
    pub fn live_graphs(&self) -> usize {
        self.context
            .get()
            .map_or(0, |context| usize::from(context.has_live_session()))
    }

    /// Audio context sample rate, once the context exists
    pub fn sample_rate(&self) -> Option<u32> {
        self.context.get().map(|context| context.sample_rate())
    }

    fn request(&self, session_id: &str, options: &AudioPreviewOptions) -> PreviewRequest {
        PreviewRequest::new(session_id, options, self.settings.default_duration_secs)
    }

    /// Supersede any in-flight play and tear down the active preview
    fn begin_play(&self) -> (u64, CancellationToken) {
        let mut state = self.transport.state.lock();
        state.generation += 1;
        if let Some(previous) = state.pending.take() {
            previous.cancel();
        }
        self.transport
            .teardown(&mut state, self.context.get().map(Arc::as_ref), StopReason::Replaced);

        let token = CancellationToken::new();
        state.pending = Some(token.clone());
        (state.generation, token)
    }

    async fn ensure_context(&self) -> Result<Arc<AudioContext>> {
        let context = self
            .context
            .get_or_try_init(|| async {
                let factory = Arc::clone(&self.output_factory);
                let tap_capacity = self.settings.tap_capacity;

                // Device setup blocks on the output thread
                let context = tokio::task::spawn_blocking(move || {
                    let output = factory.open()?;
                    AudioContext::new(output, tap_capacity)
                })
                .await
                .map_err(|e| Error::Internal(format!("Audio context setup panicked: {}", e)))??;

                let context = Arc::new(context);
                self.start_analysis(&context);
                Ok::<_, Error>(context)
            })
            .await?;
        Ok(Arc::clone(context))
    }

    fn start_analysis(&self, context: &Arc<AudioContext>) {
        let transport = Arc::clone(&self.transport);
        let ended_context = Arc::clone(context);
        spawn_analysis_driver(
            Arc::clone(context),
            Arc::clone(&self.events),
            self.settings.analysis.clone(),
            self.shutdown.child_token(),
            move |playback_id| transport.finish_if_ended(&ended_context, playback_id),
        );
    }

    async fn load_buffer(
        &self,
        request: &PreviewRequest,
        context: &AudioContext,
        token: &CancellationToken,
    ) -> Result<Arc<DecodedAudioBuffer>> {
        let key = request.cache_key()?;
        if let Some(buffer) = self.cache.get(&key) {
            debug!(session_id = %request.session_id(), "Playing preview from cache");
            return Ok(buffer);
        }

        let bytes = cancellable(token, self.client.render_mix_preview(request)).await??;

        let format = request.format();
        let sample_rate = context.sample_rate();
        let decode = tokio::task::spawn_blocking(move || {
            PreviewDecoder::decode(bytes, Some(format), sample_rate)
        });
        let buffer = cancellable(token, decode)
            .await?
            .map_err(|e| Error::Internal(format!("Decode task panicked: {}", e)))??;

        let buffer = Arc::new(buffer);
        self.cache.insert(key, Arc::clone(&buffer));
        Ok(buffer)
    }

    #[allow(clippy::too_many_arguments)]
    fn connect(
        &self,
        state: &mut TransportState,
        context: &AudioContext,
        session_id: &str,
        buffer: Arc<DecodedAudioBuffer>,
        effects: EffectChainConfig,
        chain: EffectChain,
        offset_secs: f64,
        level: f32,
    ) {
        let gain = GainNode::with_level(level);
        let gain_handle = gain.handle();
        let info = PreviewInfo::of(&buffer);

        let session = PlaybackSession::new(
            session_id,
            Arc::clone(&buffer),
            offset_secs,
            chain,
            gain,
            context.current_time(),
        );
        let playback_id = session.playback_id();
        let started_at = session.started_at_context_time();

        if let Some(displaced) = context.connect(session) {
            warn!(
                playback_id = %displaced.playback_id(),
                "Displaced a graph the transport did not track"
            );
        }

        state.active = Some(ActivePreview {
            playback_id,
            session_id: session_id.to_string(),
            buffer,
            effects,
            gain: gain_handle,
        });

        info!(
            %playback_id,
            session_id,
            duration_secs = info.duration_secs,
            offset_secs,
            started_at,
            "Preview playing"
        );
        self.events.emit_lossy(PreviewEvent::PlaybackStarted {
            playback_id,
            session_id: session_id.to_string(),
            duration_secs: info.duration_secs,
            sample_rate: info.sample_rate,
            channels: info.channels,
            offset_secs,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl Drop for PreviewOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let mut state = self.transport.state.lock();
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
        state.active = None;
        drop(state);

        if let Some(context) = self.context.get() {
            context.close();
        }
    }
}

/// Build the effect chain off the async runtime (reverb synthesis is CPU bound)
async fn build_chain(effects: EffectChainConfig, sample_rate: u32) -> Result<EffectChain> {
    tokio::task::spawn_blocking(move || setup_effect_chain(&effects, sample_rate))
        .await
        .map_err(|e| Error::Internal(format!("Effect chain task panicked: {}", e)))
}

/// Await `future` unless `token` is cancelled first
async fn cancellable<F: Future>(token: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled("Preview request cancelled".to_string())),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineOutput;

    fn orchestrator() -> PreviewOrchestrator {
        let output = OfflineOutput::new(44100);
        PreviewOrchestrator::new(
            RenderClient::new("http://127.0.0.1:9", None).unwrap(),
            Arc::new(output.factory()),
            Arc::new(EventBus::new(16)),
            OrchestratorSettings::default(),
        )
    }

    #[test]
    fn test_controls_without_session_are_noops() {
        let orchestrator = orchestrator();
        assert!(!orchestrator.stop_preview());
        assert!(!orchestrator.stop_preview());
        assert_eq!(orchestrator.set_volume(0.5), None);
        assert_eq!(orchestrator.position(), None);
        assert!(!orchestrator.is_playing());
        assert_eq!(orchestrator.live_graphs(), 0);
    }

    #[tokio::test]
    async fn test_seek_without_session_is_noop() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.seek_to(3.0).await.unwrap(), None);
    }

    #[test]
    fn test_setup_effect_chain_before_context() {
        let orchestrator = orchestrator();
        let chain = orchestrator.setup_effect_chain(&EffectChainConfig::default());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_preview_info_serializes_like_buffer_metadata() {
        let info = PreviewInfo {
            duration_secs: 5.0,
            sample_rate: 44100,
            channels: 2,
        };
        let json = serde_json::to_value(info).unwrap();
        assert_eq!(json["duration"], 5.0);
        assert_eq!(json["sampleRate"], 44100);
        assert_eq!(json["channels"], 2);
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = cancellable(&token, std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }
}
