//! Lock-free tap from the render callback to the analysis loop
//!
//! The render callback pushes every frame it outputs; the analysis loop drains
//! whatever has accumulated once per display frame. When the loop falls behind
//! the ring fills and new frames are dropped, never blocking the audio thread.

use crate::audio::AudioFrame;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Frames of headroom used when no capacity is configured (~0.75s at 44.1kHz)
pub const DEFAULT_TAP_CAPACITY: usize = 32768;

/// Producer half, owned by the render callback
pub struct TapWriter {
    prod: HeapProd<AudioFrame>,
}

/// Consumer half, owned by the audio context
pub struct TapReader {
    cons: HeapCons<AudioFrame>,
}

/// Create a connected writer/reader pair
pub fn analysis_tap(capacity: usize) -> (TapWriter, TapReader) {
    let rb = HeapRb::<AudioFrame>::new(capacity.max(1));
    let (prod, cons) = rb.split();
    (TapWriter { prod }, TapReader { cons })
}

impl TapWriter {
    /// Push a frame; returns false when the ring is full and the frame was dropped
    pub fn write(&mut self, frame: AudioFrame) -> bool {
        self.prod.try_push(frame).is_ok()
    }
}

impl TapReader {
    /// Move all buffered frames into `out`; returns the number moved
    pub fn drain_into(&mut self, out: &mut Vec<AudioFrame>) -> usize {
        let before = out.len();
        out.extend(self.cons.pop_iter());
        out.len() - before
    }

    /// Discard everything buffered
    pub fn clear(&mut self) -> usize {
        let mut discarded = 0;
        while self.cons.try_pop().is_some() {
            discarded += 1;
        }
        discarded
    }

    pub fn len(&self) -> usize {
        self.cons.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.cons.is_empty()
    }
}
