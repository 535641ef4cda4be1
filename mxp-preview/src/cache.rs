//! Decoded buffer cache
//!
//! Keyed by `PreviewRequest::cache_key` (session id plus the full request body),
//! so any change in duration, quality, format or effects renders afresh.

use crate::audio::DecodedAudioBuffer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct BufferCache {
    entries: Mutex<HashMap<String, Arc<DecodedAudioBuffer>>>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<DecodedAudioBuffer>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, buffer: Arc<DecodedAudioBuffer>) {
        self.entries.lock().insert(key, buffer);
    }

    /// Remove every entry; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        debug!("Buffer cache cleared ({} entries)", count);
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
