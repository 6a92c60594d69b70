//! A player's presence in the sky: optional plane, controls and props.
//!
//! Authority is split per field: spawn/despawn and `PlaneStateServer` come
//! from the server, while the owning client asserts `PlaneStateClient` and
//! its controls through `ParticipationInput`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::physics::Physics;
use super::plane::{Action, Plane, PlaneControls, PlaneState, PlaneStateClient, PlaneStateServer, PlaneTuning};
use super::prop::{Prop, PropState};
use crate::util::{Pid, TimeDiff, Vec2, VerifyStructure};

/// Everything needed to recreate a spawned plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneSpawn {
    pub tuning: PlaneTuning,
    pub state: PlaneState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipationInit {
    pub spawn: Option<PlaneSpawn>,
    pub controls: PlaneControls,
    pub props: BTreeMap<Pid, PropState>,
}

/// Participation update. `despawn` is applied before `spawn`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipationDelta {
    pub despawn: bool,
    pub spawn: Option<PlaneSpawn>,
    pub server_state: Option<PlaneStateServer>,
    pub client_state: Option<PlaneStateClient>,
    pub controls: Option<PlaneControls>,
    pub props: Option<BTreeMap<Pid, PropState>>,
}

impl ParticipationDelta {
    pub fn is_empty(&self) -> bool {
        !self.despawn
            && self.spawn.is_none()
            && self.server_state.is_none()
            && self.client_state.is_none()
            && self.controls.is_none()
            && self.props.is_none()
    }

    /// The delta as seen by the participation's owner: drops the fields the
    /// owner is authoritative over.
    pub fn for_owner(&self) -> Self {
        Self {
            client_state: None,
            controls: None,
            ..self.clone()
        }
    }
}

impl VerifyStructure for ParticipationDelta {
    fn verify_structure(&self) -> bool {
        self.client_state.verify_structure()
            && self
                .spawn
                .map_or(true, |s| PlaneStateClient::from(&s.state).verify_structure())
    }
}

/// State submitted by the owning client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipationInput {
    pub plane_state: Option<PlaneStateClient>,
    pub controls: Option<PlaneControls>,
}

impl VerifyStructure for ParticipationInput {
    fn verify_structure(&self) -> bool {
        (self.plane_state.is_some() || self.controls.is_some()) && self.plane_state.verify_structure()
    }
}

#[derive(Debug)]
pub struct Participation {
    pid: Pid,
    plane: Option<Plane>,
    controls: PlaneControls,
    props: BTreeMap<Pid, Prop>,
    next_prop: Pid,

    // delta bookkeeping
    spawn_pending: bool,
    despawn_pending: bool,
    synced_client: Option<PlaneStateClient>,
    synced_server: Option<PlaneStateServer>,
    synced_controls: PlaneControls,
    synced_props: BTreeMap<Pid, PropState>,

    // input bookkeeping (client side)
    input_client: Option<PlaneStateClient>,
    input_controls: PlaneControls,
}

impl Participation {
    pub(crate) fn new(physics: &mut Physics, pid: Pid, init: &ParticipationInit) -> Self {
        let plane = init
            .spawn
            .map(|s| Plane::new(physics, pid, s.tuning, s.state));
        let props: BTreeMap<Pid, Prop> = init
            .props
            .iter()
            .map(|(id, state)| (*id, Prop::new(physics, pid, *id, *state)))
            .collect();
        let next_prop = init.props.keys().next_back().map_or(0, |id| id + 1);

        let synced_client = plane.as_ref().map(|p| PlaneStateClient::from(p.state()));
        let synced_server = plane.as_ref().map(|p| PlaneStateServer::from(p.state()));

        Self {
            pid,
            plane,
            controls: init.controls,
            props,
            next_prop,
            spawn_pending: false,
            despawn_pending: false,
            synced_client,
            synced_server,
            synced_controls: init.controls,
            synced_props: init.props.clone(),
            input_client: synced_client,
            input_controls: init.controls,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_spawned(&self) -> bool {
        self.plane.is_some()
    }

    pub fn plane(&self) -> Option<&Plane> {
        self.plane.as_ref()
    }

    pub fn controls(&self) -> PlaneControls {
        self.controls
    }

    pub fn props(&self) -> impl Iterator<Item = (Pid, &PropState)> {
        self.props.iter().map(|(id, p)| (*id, p.state()))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    pub(crate) fn do_action(&mut self, action: Action, state: bool) {
        self.controls.do_action(action, state);
    }

    /// Spawn (or respawn) the plane
    pub(crate) fn spawn(&mut self, physics: &mut Physics, tuning: &PlaneTuning, pos: Vec2, rot: f32) {
        let state = PlaneState::new(tuning, pos, rot);
        self.replace_plane(physics, Some(PlaneSpawn { tuning: *tuning, state }));
        self.spawn_pending = true;
    }

    /// Destroy the plane; returns where it was
    pub(crate) fn kill(&mut self, physics: &mut Physics) -> Option<Vec2> {
        let plane = self.plane.take()?;
        let pos = plane.state().physical.pos;
        plane.release(physics);
        self.despawn_pending = true;
        self.spawn_pending = false;
        Some(pos)
    }

    /// Reduce health; returns true once health is exhausted
    pub(crate) fn damage(&mut self, amount: f32) -> bool {
        match self.plane.as_mut() {
            Some(plane) => {
                let state = plane.state_mut();
                state.health = (state.health - amount).max(0.0);
                state.health <= 0.0
            }
            None => false,
        }
    }

    pub(crate) fn state_mut(&mut self) -> Option<&mut PlaneState> {
        self.plane.as_mut().map(Plane::state_mut)
    }

    fn replace_plane(&mut self, physics: &mut Physics, spawn: Option<PlaneSpawn>) {
        if let Some(old) = self.plane.take() {
            old.release(physics);
        }
        self.plane = spawn.map(|s| Plane::new(physics, self.pid, s.tuning, s.state));
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    pub(crate) fn pre_physics(&mut self, physics: &mut Physics) {
        if let Some(plane) = self.plane.as_mut() {
            plane.pre_physics(physics);
        }
        for prop in self.props.values_mut() {
            prop.pre_physics(physics);
        }
    }

    pub(crate) fn post_physics(&mut self, physics: &mut Physics, gravity: f32, delta: TimeDiff) {
        let fired = self
            .plane
            .as_mut()
            .and_then(|plane| plane.post_physics(physics, &self.controls, gravity, delta));

        for prop in self.props.values_mut() {
            prop.post_physics(physics, delta);
        }
        let expired: Vec<Pid> = self
            .props
            .iter()
            .filter(|(_, p)| p.is_expired())
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(prop) = self.props.remove(&id) {
                prop.release(physics);
            }
        }

        if let Some(state) = fired {
            let id = self.next_prop;
            self.next_prop += 1;
            self.props.insert(id, Prop::new(physics, self.pid, id, state));
        }
    }

    /// Release every body held by this participation
    pub(crate) fn release(mut self, physics: &mut Physics) {
        if let Some(plane) = self.plane.take() {
            plane.release(physics);
        }
        for (_, prop) in std::mem::take(&mut self.props) {
            prop.release(physics);
        }
    }

    // ========================================================================
    // Replication
    // ========================================================================

    fn prop_states(&self) -> BTreeMap<Pid, PropState> {
        self.props.iter().map(|(id, p)| (*id, *p.state())).collect()
    }

    pub fn capture_initializer(&self) -> ParticipationInit {
        ParticipationInit {
            spawn: self.plane.as_ref().map(|p| PlaneSpawn {
                tuning: *p.tuning(),
                state: *p.state(),
            }),
            controls: self.controls,
            props: self.prop_states(),
        }
    }

    pub fn collect_delta(&mut self) -> Option<ParticipationDelta> {
        let mut delta = ParticipationDelta {
            despawn: std::mem::take(&mut self.despawn_pending),
            ..Default::default()
        };

        let spawned = std::mem::take(&mut self.spawn_pending);
        match self.plane.as_ref() {
            Some(plane) => {
                let client = PlaneStateClient::from(plane.state());
                let server = PlaneStateServer::from(plane.state());
                if spawned {
                    delta.spawn = Some(PlaneSpawn {
                        tuning: *plane.tuning(),
                        state: *plane.state(),
                    });
                } else {
                    if self.synced_client != Some(client) {
                        delta.client_state = Some(client);
                    }
                    if self.synced_server != Some(server) {
                        delta.server_state = Some(server);
                    }
                }
                self.synced_client = Some(client);
                self.synced_server = Some(server);
            }
            None => {
                self.synced_client = None;
                self.synced_server = None;
            }
        }

        if self.controls != self.synced_controls {
            delta.controls = Some(self.controls);
            self.synced_controls = self.controls;
        }

        let props = self.prop_states();
        if props != self.synced_props {
            delta.props = Some(props.clone());
            self.synced_props = props;
        }

        (!delta.is_empty()).then_some(delta)
    }

    pub fn apply_delta(&mut self, physics: &mut Physics, delta: &ParticipationDelta) {
        if delta.despawn {
            self.replace_plane(physics, None);
        }
        if let Some(spawn) = delta.spawn {
            self.replace_plane(physics, Some(spawn));
        }
        if let Some(plane) = self.plane.as_mut() {
            if let Some(server) = &delta.server_state {
                plane.state_mut().apply_server(server);
            }
            if let Some(client) = &delta.client_state {
                plane.state_mut().apply_client(client);
            }
        }
        if let Some(controls) = delta.controls {
            self.controls = controls;
        }
        if let Some(props) = &delta.props {
            self.apply_props(physics, props);
        }

        self.synced_client = self.plane.as_ref().map(|p| PlaneStateClient::from(p.state()));
        self.synced_server = self.plane.as_ref().map(|p| PlaneStateServer::from(p.state()));
        self.synced_controls = self.controls;
        self.synced_props = self.prop_states();
    }

    fn apply_props(&mut self, physics: &mut Physics, props: &BTreeMap<Pid, PropState>) {
        let stale: Vec<Pid> = self
            .props
            .keys()
            .filter(|id| !props.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(prop) = self.props.remove(&id) {
                prop.release(physics);
            }
        }
        for (id, state) in props {
            match self.props.get_mut(id) {
                Some(prop) => prop.set_state(*state),
                None => {
                    self.props.insert(*id, Prop::new(physics, self.pid, *id, *state));
                }
            }
            self.next_prop = self.next_prop.max(id + 1);
        }
    }

    // ========================================================================
    // Client input
    // ========================================================================

    /// Accept the owner's client-authoritative state
    pub(crate) fn apply_input(&mut self, input: &ParticipationInput) {
        if let (Some(state), Some(plane)) = (&input.plane_state, self.plane.as_mut()) {
            plane.state_mut().apply_client(state);
        }
        if let Some(controls) = input.controls {
            self.controls = controls;
        }
    }

    /// Owner-side: what changed since the last input was collected
    pub(crate) fn collect_input(&mut self) -> Option<ParticipationInput> {
        let plane_state = self.plane.as_ref().map(|p| PlaneStateClient::from(p.state()));
        let mut input = ParticipationInput::default();

        if plane_state.is_some() && plane_state != self.input_client {
            input.plane_state = plane_state;
        }
        self.input_client = plane_state;

        if self.controls != self.input_controls {
            input.controls = Some(self.controls);
            self.input_controls = self.controls;
        }

        (input.plane_state.is_some() || input.controls.is_some()).then_some(input)
    }
}
