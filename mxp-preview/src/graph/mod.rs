//! Audio processing graph
//!
//! A preview plays through exactly one graph: a single-use buffer source, the
//! enabled effect stages in fixed order, and a gain node. The `AudioContext`
//! holds at most one such graph at a time.

pub mod chain;
pub mod context;
pub mod delay;
pub mod filter;
pub mod gain;
pub mod node;
pub mod reverb;
pub mod session;
pub mod source;

pub use chain::{setup_effect_chain, setup_effect_chain_with_rng, EffectChain};
pub use context::AudioContext;
pub use gain::{GainHandle, GainNode};
pub use node::{AudioNode, NodeKind};
pub use session::PlaybackSession;
pub use source::{BufferSource, StopOutcome};
