//! Effect chain construction
//!
//! Stages are built in fixed order reverb → delay → filter. A disabled or absent
//! stage contributes no node: toggling an effect means rebuilding the chain.

use crate::audio::AudioFrame;
use crate::graph::delay::{DelayStage, MAX_DELAY_MS};
use crate::graph::filter::FilterStage;
use crate::graph::node::{AudioNode, NodeKind};
use crate::graph::reverb::{ReverbStage, MAX_REVERB_DECAY_SECS};
use crate::options::EffectChainConfig;
use rand::Rng;
use tracing::{debug, warn};

/// Ordered effect stages between a source and its gain node
#[derive(Default)]
pub struct EffectChain {
    stages: Vec<Box<dyn AudioNode>>,
}

impl EffectChain {
    /// Chain with no stages; the source feeds the gain node directly
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Box<dyn AudioNode>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage kinds in processing order
    pub fn kinds(&self) -> Vec<NodeKind> {
        self.stages.iter().map(|stage| stage.kind()).collect()
    }

    /// Kind of the node whose output feeds the gain node
    pub fn output_kind(&self) -> NodeKind {
        self.stages
            .last()
            .map(|stage| stage.kind())
            .unwrap_or(NodeKind::Source)
    }

    pub fn process(&mut self, input: AudioFrame) -> AudioFrame {
        self.stages
            .iter_mut()
            .fold(input, |frame, stage| stage.process(frame))
    }
}

impl std::fmt::Debug for EffectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectChain")
            .field("stages", &self.kinds())
            .finish()
    }
}

/// Build the effect chain for `config` at `sample_rate`
pub fn setup_effect_chain(config: &EffectChainConfig, sample_rate: u32) -> EffectChain {
    setup_effect_chain_with_rng(config, sample_rate, &mut rand::thread_rng())
}

/// Build the effect chain drawing reverb noise from `rng`
pub fn setup_effect_chain_with_rng<R: Rng + ?Sized>(
    config: &EffectChainConfig,
    sample_rate: u32,
    rng: &mut R,
) -> EffectChain {
    let mut chain = EffectChain::empty();

    if let Some(reverb) = config.enabled_reverb() {
        if reverb.decay > MAX_REVERB_DECAY_SECS {
            warn!(
                requested = reverb.decay,
                limit = MAX_REVERB_DECAY_SECS,
                "Reverb decay capped"
            );
        }
        chain.push(Box::new(ReverbStage::with_rng(reverb, sample_rate, rng)));
    }
    if let Some(delay) = config.enabled_delay() {
        if delay.time > MAX_DELAY_MS {
            warn!(requested = delay.time, limit = MAX_DELAY_MS, "Delay time capped");
        }
        chain.push(Box::new(DelayStage::new(delay, sample_rate)));
    }
    if let Some(filter) = config.enabled_filter() {
        chain.push(Box::new(FilterStage::new(filter, sample_rate)));
    }

    debug!(stages = ?chain.kinds(), sample_rate, "Effect chain built");
    chain
}
