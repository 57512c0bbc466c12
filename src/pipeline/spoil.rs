use std::collections::HashMap;

use crate::doc::DocState;

/// What finalize does with a reference whose current state is bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoilStrategy {
    /// Leave the reference alone.
    Ignore,
    /// Delete the previously committed version, if any.
    Delete,
    /// Tolerate one bad run; delete on the next consecutive bad run.
    GraceOnce,
}

/// Resolves the strategy for a spoiled reference. Returning `None` defers to
/// the core's fallback ([`GenericSpoiledReferenceStrategizer::FALLBACK`]).
pub trait SpoiledReferenceStrategizer: Send + Sync {
    fn resolve(&self, reference: &str, state: DocState) -> Option<SpoilStrategy>;
}

/// Default strategizer: per-state mappings with a configurable fallback.
#[derive(Debug, Clone)]
pub struct GenericSpoiledReferenceStrategizer {
    mappings: HashMap<DocState, SpoilStrategy>,
    fallback: SpoilStrategy,
}

impl GenericSpoiledReferenceStrategizer {
    /// Strategy assumed when a strategizer resolves nothing.
    pub const FALLBACK: SpoilStrategy = SpoilStrategy::Delete;

    pub fn new(mappings: HashMap<DocState, SpoilStrategy>, fallback: SpoilStrategy) -> Self {
        Self { mappings, fallback }
    }
}

impl Default for GenericSpoiledReferenceStrategizer {
    fn default() -> Self {
        let mut mappings = HashMap::new();
        mappings.insert(DocState::NotFound, SpoilStrategy::Delete);
        mappings.insert(DocState::BadStatus, SpoilStrategy::GraceOnce);
        mappings.insert(DocState::Error, SpoilStrategy::GraceOnce);
        Self {
            mappings,
            fallback: Self::FALLBACK,
        }
    }
}

impl SpoiledReferenceStrategizer for GenericSpoiledReferenceStrategizer {
    fn resolve(&self, _reference: &str, state: DocState) -> Option<SpoilStrategy> {
        Some(*self.mappings.get(&state).unwrap_or(&self.fallback))
    }
}
