//! Generic owned collection of free simulation components.
//!
//! Components are created with a monotonic PID, marked for destruction at
//! any time and only removed by [`ComponentSet::flush`], once per tick.
//! The set's delta carries full initializers for components added since the
//! last collection, the PIDs removed, and per-component deltas for the rest.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::physics::Physics;
use crate::util::{Networked, Pid, TimeDiff};

/// A physics-linked object owned by a `ComponentSet`
pub trait Component: Networked + Sized {
    fn create(physics: &mut Physics, pid: Pid, init: &Self::Init) -> Self;

    fn pre_physics(&mut self, _physics: &mut Physics) {}

    fn post_physics(&mut self, _physics: &Physics, _delta: TimeDiff) {}

    fn is_destroyable(&self) -> bool;

    fn mark_destroy(&mut self);

    /// Destroy the component's body
    fn release(self, physics: &mut Physics);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSetInit<I> {
    pub components: BTreeMap<Pid, I>,
    pub next_pid: Pid,
}

impl<I> Default for ComponentSetInit<I> {
    fn default() -> Self {
        Self {
            components: BTreeMap::new(),
            next_pid: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSetDelta<I, D> {
    pub added: BTreeMap<Pid, I>,
    pub removed: BTreeSet<Pid>,
    pub mutated: BTreeMap<Pid, D>,
}

impl<I, D> Default for ComponentSetDelta<I, D> {
    fn default() -> Self {
        Self {
            added: BTreeMap::new(),
            removed: BTreeSet::new(),
            mutated: BTreeMap::new(),
        }
    }
}

impl<I, D> ComponentSetDelta<I, D> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.mutated.is_empty()
    }
}

#[derive(Debug)]
pub struct ComponentSet<C> {
    components: BTreeMap<Pid, C>,
    next_pid: Pid,
    added: BTreeSet<Pid>,
    removed: BTreeSet<Pid>,
}

impl<C: Component> ComponentSet<C> {
    pub fn new(physics: &mut Physics, init: &ComponentSetInit<C::Init>) -> Self {
        let components = init
            .components
            .iter()
            .map(|(pid, i)| (*pid, C::create(physics, *pid, i)))
            .collect::<BTreeMap<_, _>>();
        let next_pid = components
            .keys()
            .next_back()
            .map_or(init.next_pid, |last| init.next_pid.max(last + 1));
        Self {
            components,
            next_pid,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Create a component under a fresh PID
    pub fn create(&mut self, physics: &mut Physics, init: &C::Init) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.components.insert(pid, C::create(physics, pid, init));
        self.added.insert(pid);
        pid
    }

    pub fn get(&self, pid: Pid) -> Option<&C> {
        self.components.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut C> {
        self.components.get_mut(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pid, &C)> {
        self.components.iter().map(|(pid, c)| (*pid, c))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Flag a component for removal at the next flush
    pub fn mark_destroy(&mut self, pid: Pid) -> bool {
        match self.components.get_mut(&pid) {
            Some(component) => {
                component.mark_destroy();
                true
            }
            None => false,
        }
    }

    pub(crate) fn pre_physics(&mut self, physics: &mut Physics) {
        for component in self.components.values_mut() {
            component.pre_physics(physics);
        }
    }

    pub(crate) fn post_physics(&mut self, physics: &Physics, delta: TimeDiff) {
        for component in self.components.values_mut() {
            component.post_physics(physics, delta);
        }
    }

    /// Remove every destroyable component; returns how many went
    pub fn flush(&mut self, physics: &mut Physics) -> usize {
        let doomed: Vec<Pid> = self
            .components
            .iter()
            .filter(|(_, c)| c.is_destroyable())
            .map(|(pid, _)| *pid)
            .collect();

        for pid in &doomed {
            if let Some(component) = self.components.remove(pid) {
                component.release(physics);
            }
            // never seen remotely: nothing to remove there
            if !self.added.remove(pid) {
                self.removed.insert(*pid);
            }
        }
        doomed.len()
    }

    pub fn capture_initializer(&self) -> ComponentSetInit<C::Init> {
        ComponentSetInit {
            components: self
                .components
                .iter()
                .map(|(pid, c)| (*pid, c.capture_initializer()))
                .collect(),
            next_pid: self.next_pid,
        }
    }

    pub fn collect_delta(&mut self) -> Option<ComponentSetDelta<C::Init, C::Delta>> {
        let added = std::mem::take(&mut self.added);
        let mut delta = ComponentSetDelta {
            removed: std::mem::take(&mut self.removed),
            ..Default::default()
        };

        for (pid, component) in self.components.iter_mut() {
            if added.contains(pid) {
                delta.added.insert(*pid, component.capture_initializer());
                // the initializer already carries the current state
                component.collect_delta();
            } else if let Some(d) = component.collect_delta() {
                delta.mutated.insert(*pid, d);
            }
        }

        (!delta.is_empty()).then_some(delta)
    }

    pub fn apply_delta(&mut self, physics: &mut Physics, delta: &ComponentSetDelta<C::Init, C::Delta>) {
        for (pid, init) in &delta.added {
            if let Some(old) = self.components.insert(*pid, C::create(physics, *pid, init)) {
                old.release(physics);
            }
            self.next_pid = self.next_pid.max(pid + 1);
        }
        for pid in &delta.removed {
            if let Some(component) = self.components.remove(pid) {
                component.release(physics);
            }
        }
        for (pid, d) in &delta.mutated {
            if let Some(component) = self.components.get_mut(pid) {
                component.apply_delta(d);
            }
        }
        // a replica never reports its own additions or removals
        self.added.clear();
        self.removed.clear();
    }

    /// Release every body; used when the owning sky is torn down
    pub(crate) fn release_all(&mut self, physics: &mut Physics) {
        for (_, component) in std::mem::take(&mut self.components) {
            component.release(physics);
        }
        self.added.clear();
        self.removed.clear();
    }
}
