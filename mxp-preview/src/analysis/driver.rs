//! Analysis loop
//!
//! One task per audio context. Each display-frame tick it drains the analysis
//! tap, publishes `PreviewEvent::AnalysisUpdate` for the live session and
//! reports a session whose source has played to the end.

use crate::analysis::spectrum::SpectrumAnalyzer;
use crate::audio::AudioFrame;
use crate::graph::AudioContext;
use mxp_common::events::{AnalysisUpdate, EventBus, PreviewEvent, MASTER_INSTRUMENT};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Analysis loop tuning
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    /// Publish analysis events; end-of-buffer detection runs regardless
    pub enabled: bool,
    /// Ticks per second
    pub frame_rate_hz: u32,
    pub fft_size: usize,
    /// Frames per channel in the stereo waveform
    pub waveform_len: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_rate_hz: 60,
            fft_size: 2048,
            waveform_len: 1024,
        }
    }
}

impl AnalysisSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }
}

/// Spawn the analysis loop for `context`.
///
/// `on_ended` is called with the playback id of a session whose source has
/// finished; it runs on every tick until the session is disconnected.
pub fn spawn_analysis_driver<F>(
    context: Arc<AudioContext>,
    events: Arc<EventBus>,
    settings: AnalysisSettings,
    cancel: CancellationToken,
    on_ended: F,
) -> JoinHandle<()>
where
    F: Fn(Uuid) + Send + Sync + 'static,
{
    info!(
        "Starting analysis loop ({}Hz, fft_size={}, enabled={})",
        settings.frame_rate_hz, settings.fft_size, settings.enabled
    );

    tokio::spawn(async move {
        let mut timer = interval(settings.tick_period());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut analyzer = SpectrumAnalyzer::new(settings.fft_size, settings.waveform_len);
        let mut frames: Vec<AudioFrame> = Vec::new();
        let mut current: Option<Uuid> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            frames.clear();
            context.drain_tap(&mut frames);

            let live = context.with_session(|session| (session.playback_id(), session.has_ended()));
            let Some((playback_id, ended)) = live else {
                if current.take().is_some() {
                    analyzer.clear();
                }
                continue;
            };

            if current != Some(playback_id) {
                analyzer.clear();
                current = Some(playback_id);
            }

            if settings.enabled && !frames.is_empty() {
                analyzer.push_frames(&frames);
                if events.subscriber_count() > 0 {
                    let frame = analyzer.analyze(MASTER_INSTRUMENT);
                    events.emit_lossy(PreviewEvent::AnalysisUpdate {
                        playback_id,
                        update: AnalysisUpdate::from_frames(vec![frame]),
                    });
                }
            }

            if ended {
                debug!(%playback_id, "Source reached end of buffer");
                on_ended(playback_id);
            }
        }

        debug!("Analysis loop stopped");
    })
}
