//! Graph node abstraction

use crate::audio::AudioFrame;
use serde::Serialize;
use std::fmt;

/// Kind of a node in a preview graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Source,
    Reverb,
    Delay,
    Filter,
    Gain,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Source => "source",
            NodeKind::Reverb => "reverb",
            NodeKind::Delay => "delay",
            NodeKind::Filter => "filter",
            NodeKind::Gain => "gain",
        };
        f.write_str(name)
    }
}

/// A per-frame stereo processor.
///
/// `process` runs on the audio thread: it must not block, allocate or log.
pub trait AudioNode: Send {
    fn kind(&self) -> NodeKind;

    /// Process one stereo frame
    fn process(&mut self, input: AudioFrame) -> AudioFrame;
}
