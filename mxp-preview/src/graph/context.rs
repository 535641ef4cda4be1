//! Audio context
//!
//! Owns the output device, the context clock and the single live-graph slot.
//! The render callback installed on the output renders whatever session occupies
//! the slot (or silence) and feeds every rendered frame to the analysis tap.
//!
//! At most one session is connected at any time: `connect` displaces and stops
//! the previous occupant before the new one becomes audible.

use crate::analysis::tap::{analysis_tap, TapReader};
use crate::audio::{AudioFrame, AudioOutput};
use crate::error::Result;
use crate::graph::session::PlaybackSession;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type SessionSlot = Arc<Mutex<Option<PlaybackSession>>>;

pub struct AudioContext {
    output: Mutex<Box<dyn AudioOutput>>,
    slot: SessionSlot,
    /// Frames rendered since the context started
    clock: Arc<AtomicU64>,
    tap: Mutex<TapReader>,
    sample_rate: u32,
    device_name: String,
    closed: AtomicBool,
}

impl AudioContext {
    /// Start rendering on `output`; the context is silent until a session connects
    pub fn new(mut output: Box<dyn AudioOutput>, tap_capacity: usize) -> Result<Self> {
        let slot: SessionSlot = Arc::new(Mutex::new(None));
        let clock = Arc::new(AtomicU64::new(0));
        let (mut tap_writer, tap_reader) = analysis_tap(tap_capacity);

        let callback_slot = Arc::clone(&slot);
        let callback_clock = Arc::clone(&clock);
        output.start(Box::new(move || {
            let rendered = callback_slot.lock().as_mut().map(|session| session.render());
            callback_clock.fetch_add(1, Ordering::Relaxed);
            match rendered {
                Some(frame) => {
                    tap_writer.write(frame);
                    frame
                }
                None => AudioFrame::zero(),
            }
        }))?;

        let sample_rate = output.sample_rate();
        let device_name = output.device_name();
        info!(
            "Audio context started: device={}, sample_rate={}Hz",
            device_name, sample_rate
        );

        Ok(Self {
            output: Mutex::new(output),
            slot,
            clock,
            tap: Mutex::new(tap_reader),
            sample_rate,
            device_name,
            closed: AtomicBool::new(false),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Context time in seconds (frames rendered / sample rate)
    pub fn current_time(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.clock.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    /// Make `session` the live graph, returning the displaced session (stopped)
    pub fn connect(&self, session: PlaybackSession) -> Option<PlaybackSession> {
        let playback_id = session.playback_id();
        let mut displaced = self.slot.lock().replace(session);

        if let Some(previous) = displaced.as_mut() {
            previous.stop();
            warn!(
                displaced = %previous.playback_id(),
                "Live session displaced by a new connection"
            );
        }

        // Frames from the previous graph must not reach analysis of the new one
        self.tap.lock().clear();
        debug!(%playback_id, "Session connected");
        displaced
    }

    /// Remove the live graph, if any; safe to call repeatedly
    pub fn disconnect(&self) -> Option<PlaybackSession> {
        let mut session = self.slot.lock().take();
        if let Some(session) = session.as_mut() {
            session.stop();
            debug!(playback_id = %session.playback_id(), "Session disconnected");
        }
        session
    }

    /// Remove the live graph only if it is `playback_id`
    pub fn disconnect_if(&self, playback_id: uuid::Uuid) -> Option<PlaybackSession> {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|s| s.playback_id()) != Some(playback_id) {
            return None;
        }
        let mut session = slot.take();
        drop(slot);

        if let Some(session) = session.as_mut() {
            session.stop();
        }
        session
    }

    /// Run `f` against the live session
    pub fn with_session<R>(&self, f: impl FnOnce(&mut PlaybackSession) -> R) -> Option<R> {
        self.slot.lock().as_mut().map(f)
    }

    pub fn has_live_session(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Move frames rendered since the last drain into `out`
    pub fn drain_tap(&self, out: &mut Vec<AudioFrame>) -> usize {
        self.tap.lock().drain_into(out)
    }

    /// Stop the output; the context renders nothing afterwards
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disconnect();
        if let Err(e) = self.output.lock().stop() {
            warn!("Failed to stop audio output: {}", e);
        }
        info!("Audio context closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}
