//! Launch generations. Every top-level launch bumps the live counter;
//! asynchronous work captures the generation it started under and must
//! abort, without mutating shared state, once it goes stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeneration(u64);

#[derive(Debug, Clone, Default)]
pub struct LaunchSequencer {
    live: Arc<AtomicU64>,
}

impl LaunchSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called exactly once per top-level launch event, never per
    /// navigation.
    pub fn begin_launch(&self) -> LaunchGeneration {
        LaunchGeneration(self.live.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, generation: LaunchGeneration) -> bool {
        self.live.load(Ordering::SeqCst) == generation.0
    }

    pub fn current(&self) -> LaunchGeneration {
        LaunchGeneration(self.live.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_launch_invalidates_older_generations() {
        let sequencer = LaunchSequencer::new();
        let first = sequencer.begin_launch();
        assert!(sequencer.is_current(first));

        let second = sequencer.begin_launch();
        assert!(!sequencer.is_current(first));
        assert!(sequencer.is_current(second));
        assert_eq!(sequencer.current(), second);
    }

    #[test]
    fn clones_share_the_live_counter() {
        let sequencer = LaunchSequencer::new();
        let observer = sequencer.clone();
        let generation = sequencer.begin_launch();
        assert!(observer.is_current(generation));
        observer.begin_launch();
        assert!(!sequencer.is_current(generation));
    }
}
