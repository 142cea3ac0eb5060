//! Gold economy: passive collection, taps, unlocks, upgrades and milestones.

use tracing::{debug, info, warn};

use crate::{
    catalog::ResourceCatalog, error::EconomyError, resource::ResourceState,
    snapshot::ProgressSnapshot,
};

/// Gold milestone used when none are configured.
pub const DEFAULT_MILESTONE: f64 = 1_000_000.0;

/// Share of the aggregate output credited automatically every second.
pub const DEFAULT_AUTO_COLLECT_FRACTION: f64 = 0.1;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Domain events for the presentation and achievement collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A resource was unlocked.
    ResourceUnlocked(usize),
    /// A previously hidden resource became visible.
    ResourceRevealed(usize),
    /// Gold rose above a configured milestone for the first time.
    MilestoneReached {
        /// The milestone threshold.
        threshold: f64,
        /// Gold held when it was crossed.
        gold: f64,
    },
}

/// Tunables for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomySettings {
    /// Fraction in `[0, 1]` of the aggregate output credited per second.
    pub auto_collect_fraction: f64,
    /// Gold thresholds that fire [`EngineEvent::MilestoneReached`] once each,
    /// when gold first exceeds them.
    pub milestones: Vec<f64>,
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            auto_collect_fraction: DEFAULT_AUTO_COLLECT_FRACTION,
            milestones: vec![DEFAULT_MILESTONE],
        }
    }
}

#[derive(Debug, Clone)]
struct Milestone {
    threshold: f64,
    reached: bool,
}

/// Owns the resource states and the player's gold.
#[derive(Debug)]
pub struct EconomyEngine {
    resources: Vec<ResourceState>,
    gold: f64,
    auto_collect_fraction: f64,
    collect_nanos: u64,
    carried_levels: Vec<u32>,
    milestones: Vec<Milestone>,
    events: Vec<EngineEvent>,
}

impl EconomyEngine {
    /// Start a fresh game over `catalog`.
    pub fn new(catalog: &ResourceCatalog, settings: EconomySettings) -> Self {
        let fraction = settings.auto_collect_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            warn!(fraction, "auto collect fraction outside [0, 1]; clamping");
        }
        let mut milestones: Vec<Milestone> = settings
            .milestones
            .into_iter()
            .filter(|threshold| threshold.is_finite())
            .map(|threshold| Milestone {
                threshold,
                reached: false,
            })
            .collect();
        milestones.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));

        Self {
            resources: catalog.instantiate(),
            gold: 0.0,
            auto_collect_fraction: if fraction.is_nan() {
                0.0
            } else {
                fraction.clamp(0.0, 1.0)
            },
            collect_nanos: 0,
            carried_levels: Vec::new(),
            milestones,
            events: Vec::new(),
        }
    }

    /// Rebuild the engine from persisted progress.
    ///
    /// Milestones already passed by the restored gold are latched without
    /// firing. Levels saved for resources the catalog no longer lists are
    /// carried through to [`snapshot`](Self::snapshot) untouched.
    pub fn restore(
        catalog: &ResourceCatalog,
        settings: EconomySettings,
        snapshot: &ProgressSnapshot,
    ) -> Self {
        let mut engine = Self::new(catalog, settings);
        let known = snapshot.resource_levels.len().min(engine.resources.len());
        let (restored, carried) = snapshot.resource_levels.split_at(known);
        for (resource, level) in engine.resources.iter_mut().zip(restored) {
            resource.restore(*level);
        }
        if !carried.is_empty() {
            warn!(
                saved = snapshot.resource_levels.len(),
                catalog = catalog.len(),
                "Saved progress has more resources than the catalog; keeping extras unplayed"
            );
            engine.carried_levels = carried.to_vec();
        }
        engine.gold = snapshot.gold.max(0.0);
        for milestone in &mut engine.milestones {
            milestone.reached = engine.gold > milestone.threshold;
        }
        engine
    }

    /// Gold currently held.
    pub fn gold(&self) -> f64 {
        self.gold
    }

    /// All resources in tier order.
    pub fn resources(&self) -> &[ResourceState] {
        &self.resources
    }

    /// Resource at `index`, if any.
    pub fn resource(&self, index: usize) -> Option<&ResourceState> {
        self.resources.get(index)
    }

    /// Number of leading resources the player may see: every unlocked one plus
    /// the first locked one.
    pub fn visible_count(&self) -> usize {
        let unlocked = self.unlocked_count();
        (unlocked + 1).min(self.resources.len())
    }

    fn unlocked_count(&self) -> usize {
        self.resources
            .iter()
            .take_while(|resource| resource.is_unlocked())
            .count()
    }

    /// Sum of the output of every unlocked resource.
    pub fn total_output(&self) -> f64 {
        self.resources
            .iter()
            .filter(|resource| resource.is_unlocked())
            .map(ResourceState::output)
            .sum()
    }

    /// Gold credited by auto-collect for each full second.
    pub fn auto_output_per_second(&self) -> f64 {
        self.auto_collect_fraction * self.total_output()
    }

    /// Advance the passive-collection clock.
    ///
    /// Every whole second accumulated credits one auto-collect payout; the
    /// fractional remainder carries into the next call. Returns the gold
    /// credited, or `None` when no second boundary was crossed.
    /// Deltas are counted in whole nanoseconds so that any split of the same
    /// span crosses the same second boundaries.
    pub fn tick(&mut self, delta_seconds: f64) -> Option<f64> {
        if !delta_seconds.is_finite() || delta_seconds <= 0.0 {
            return None;
        }
        let delta_nanos = (delta_seconds * NANOS_PER_SECOND as f64).round() as u64;
        self.collect_nanos = self.collect_nanos.saturating_add(delta_nanos);
        if self.collect_nanos < NANOS_PER_SECOND {
            return None;
        }

        let seconds = self.collect_nanos / NANOS_PER_SECOND;
        self.collect_nanos %= NANOS_PER_SECOND;
        let credited = self.auto_output_per_second() * seconds as f64;
        self.credit(credited);
        Some(credited)
    }

    /// Manual collection: `1 + total_output()`.
    pub fn collect_tap(&mut self) -> f64 {
        let credited = 1.0 + self.total_output();
        self.credit(credited);
        credited
    }

    /// Whether gold covers the next purchase of `index`, using the same
    /// comparison [`try_unlock`](Self::try_unlock) and
    /// [`try_upgrade`](Self::try_upgrade) apply.
    pub fn affordability_of(&self, index: usize) -> bool {
        self.resources
            .get(index)
            .map(|resource| self.can_pay(resource.next_cost()))
            .unwrap_or(false)
    }

    /// Unlock the resource at `index`, strictly after all earlier tiers.
    pub fn try_unlock(&mut self, index: usize) -> Result<(), EconomyError> {
        let resource = self
            .resources
            .get(index)
            .ok_or(EconomyError::UnknownResource(index))?;
        if resource.is_unlocked() {
            return Err(EconomyError::AlreadyUnlocked(index));
        }
        if let Some(blocking) = self.resources[..index]
            .iter()
            .position(|earlier| !earlier.is_unlocked())
        {
            return Err(EconomyError::OutOfOrder { index, blocking });
        }
        let cost = resource.unlock_cost();
        self.debit(cost)?;

        self.resources[index].unlock();
        info!(index, cost, gold = self.gold, "Resource unlocked");
        self.events.push(EngineEvent::ResourceUnlocked(index));
        if index + 1 < self.resources.len() {
            self.events.push(EngineEvent::ResourceRevealed(index + 1));
        }
        Ok(())
    }

    /// Buy one level of an unlocked resource.
    pub fn try_upgrade(&mut self, index: usize) -> Result<(), EconomyError> {
        let resource = self
            .resources
            .get(index)
            .ok_or(EconomyError::UnknownResource(index))?;
        if !resource.is_unlocked() {
            return Err(EconomyError::NotUnlocked(index));
        }
        let cost = resource.upgrade_cost();
        self.debit(cost)?;

        let resource = &mut self.resources[index];
        resource.level_up();
        debug!(index, level = resource.level(), cost, "Resource upgraded");
        Ok(())
    }

    /// Take all pending events, oldest first.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Capture the persistable part of the state.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let mut resource_levels: Vec<u32> = self
            .resources
            .iter()
            .take_while(|resource| resource.is_unlocked())
            .map(ResourceState::level)
            .collect();
        // Carried levels only exist when every catalog entry was restored unlocked.
        resource_levels.extend_from_slice(&self.carried_levels);
        ProgressSnapshot {
            gold: self.gold,
            resource_levels,
        }
    }

    fn can_pay(&self, cost: f64) -> bool {
        self.gold >= cost
    }

    fn debit(&mut self, cost: f64) -> Result<(), EconomyError> {
        if !self.can_pay(cost) {
            return Err(EconomyError::InsufficientFunds {
                required: cost,
                available: self.gold,
            });
        }
        self.gold -= cost;
        Ok(())
    }

    fn credit(&mut self, amount: f64) {
        if !(amount.is_finite() && amount > 0.0) {
            return;
        }
        self.gold += amount;
        for milestone in self.milestones.iter_mut().filter(|m| !m.reached) {
            if self.gold > milestone.threshold {
                milestone.reached = true;
                info!(threshold = milestone.threshold, gold = self.gold, "Milestone reached");
                self.events.push(EngineEvent::MilestoneReached {
                    threshold: milestone.threshold,
                    gold: self.gold,
                });
            }
        }
    }
}
