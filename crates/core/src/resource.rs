//! Per-resource progression state and its cost/output curves.

use crate::catalog::ResourceConfig;

/// Growth factor applied to the upgrade price for every level already bought.
pub const UPGRADE_COST_GROWTH: f64 = 1.15;

/// Mutable progression of one catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    index: usize,
    level: u32,
    unlocked: bool,
    config: ResourceConfig,
}

impl ResourceState {
    pub(crate) fn new(index: usize, config: ResourceConfig) -> Self {
        Self {
            index,
            level: 0,
            unlocked: false,
            config,
        }
    }

    /// Catalog position.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Upgrades purchased so far.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Whether the resource has been unlocked.
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Static definition backing this resource.
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Display name from the catalog.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Fixed unlock price.
    pub fn unlock_cost(&self) -> f64 {
        self.config.unlock_cost
    }

    /// Price of the next upgrade: `upgrade_cost * 1.15^level`.
    pub fn upgrade_cost(&self) -> f64 {
        self.config.upgrade_cost * UPGRADE_COST_GROWTH.powf(f64::from(self.level))
    }

    /// Gold produced at the current level: `output * level`.
    pub fn output(&self) -> f64 {
        self.config.output * f64::from(self.level)
    }

    /// Price of whichever purchase is available next.
    pub fn next_cost(&self) -> f64 {
        if self.unlocked {
            self.upgrade_cost()
        } else {
            self.unlock_cost()
        }
    }

    pub(crate) fn unlock(&mut self) {
        self.unlocked = true;
    }

    pub(crate) fn level_up(&mut self) {
        self.level = self.level.saturating_add(1);
    }

    /// Restore persisted progress; only used while rebuilding from a snapshot.
    pub(crate) fn restore(&mut self, level: u32) {
        self.unlocked = true;
        self.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pan() -> ResourceState {
        ResourceState::new(
            0,
            ResourceConfig {
                name: "Pan".to_string(),
                unlock_cost: 10.0,
                upgrade_cost: 5.0,
                output: 2.0,
            },
        )
    }

    #[test]
    fn output_is_linear_in_level() {
        let mut state = pan();
        assert_eq!(state.output(), 0.0);
        state.restore(3);
        assert_eq!(state.output(), 6.0);
    }

    #[test]
    fn upgrade_cost_grows_with_each_level() {
        let mut state = pan();
        assert_eq!(state.upgrade_cost(), 5.0);
        let mut previous = state.upgrade_cost();
        for _ in 0..20 {
            state.level_up();
            let cost = state.upgrade_cost();
            assert!(cost > previous);
            previous = cost;
        }
        assert!((state.upgrade_cost() - 5.0 * UPGRADE_COST_GROWTH.powi(20)).abs() < 1e-9);
    }

    #[test]
    fn next_cost_switches_after_unlock() {
        let mut state = pan();
        assert_eq!(state.next_cost(), 10.0);
        state.unlock();
        assert_eq!(state.next_cost(), 5.0);
    }
}
