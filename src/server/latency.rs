//! Per-player latency and clock offset estimation.

use std::collections::BTreeMap;

use crate::arena::{Arena, ArenaDelta, LatencyStats, Player, PlayerData, PlayerDelta, Subsystem};
use crate::constants::latency::SAMPLE_WINDOW;
use crate::util::{Pid, Time};
use crate::util::sampler::RollingSampler;

#[derive(Debug, Clone)]
struct Samples {
    latency: RollingSampler,
    offset: RollingSampler,
    reported: Option<LatencyStats>,
}

impl Samples {
    fn new() -> Self {
        Self {
            latency: RollingSampler::new(SAMPLE_WINDOW),
            offset: RollingSampler::new(SAMPLE_WINDOW),
            reported: None,
        }
    }

    fn stats(&self) -> Option<LatencyStats> {
        Some(LatencyStats {
            latency: self.latency.mean()? as f32,
            clock_offset: self.offset.mean()?,
        })
    }
}

/// Rolling latency estimate for every joined player
#[derive(Debug, Default)]
pub struct LatencyTracker {
    samples: PlayerData<Samples>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pong for a ping sent at `ping_time` and answered by the
    /// client at its local `pong_time`; `now` is the server clock
    pub fn register_pong(&mut self, pid: Pid, ping_time: Time, pong_time: Time, now: Time) {
        let Some(samples) = self.samples.get_by_pid_mut(pid) else {
            return;
        };
        let latency = now - ping_time;
        if latency < 0.0 {
            tracing::debug!("Ignoring pong from the future for player {}", pid);
            return;
        }
        samples.latency.push(latency);
        samples.offset.push(pong_time - ping_time + latency / 2.0);
    }

    pub fn stats(&self, pid: Pid) -> Option<LatencyStats> {
        self.samples.get_by_pid(pid)?.stats()
    }

    /// Latency deltas for players whose estimate changed since the last update
    pub fn make_update(&mut self, arena: &Arena) -> Option<ArenaDelta> {
        let mut deltas = BTreeMap::new();
        for (pid, samples) in self.samples.iter_mut() {
            let Some(stats) = samples.stats() else {
                continue;
            };
            if samples.reported == Some(stats) {
                continue;
            }
            let Some(player) = arena.get_player(*pid) else {
                continue;
            };
            samples.reported = Some(stats);
            deltas.insert(*pid, PlayerDelta::zero(player).with_latency(stats));
        }
        (!deltas.is_empty()).then_some(ArenaDelta::PlayerDeltas(deltas))
    }
}

impl Subsystem for LatencyTracker {
    fn register_player(&mut self, player: &Player) {
        self.samples.insert(player, Samples::new());
    }

    fn unregister_player(&mut self, player: &Player) {
        self.samples.remove(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaInit;
    use crate::util::Networked;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn setup() -> (Arena, Arc<Mutex<LatencyTracker>>) {
        let mut arena = Arena::new(&ArenaInit::new("a", "env.json"));
        let tracker = Arc::new(Mutex::new(LatencyTracker::new()));
        arena.attach(Arc::clone(&tracker));
        arena.connect_player("pilot");
        (arena, tracker)
    }

    #[test]
    fn test_latency_and_offset() {
        let (_arena, tracker) = setup();
        let mut tracker = tracker.lock();

        // sent at 10.0, answered at client time 110.05, received at 10.1
        tracker.register_pong(0, 10.0, 110.05, 10.1);
        let stats = tracker.stats(0).unwrap();
        assert!((stats.latency - 0.1).abs() < 1e-6);
        assert!((stats.clock_offset - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_mean() {
        let (_arena, tracker) = setup();
        let mut tracker = tracker.lock();
        tracker.register_pong(0, 0.0, 0.0, 0.1);
        tracker.register_pong(0, 1.0, 1.0, 1.3);
        let stats = tracker.stats(0).unwrap();
        assert!((stats.latency - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_player_ignored() {
        let (_arena, tracker) = setup();
        let mut tracker = tracker.lock();
        tracker.register_pong(9, 0.0, 0.0, 0.1);
        assert!(tracker.stats(9).is_none());
    }

    #[test]
    fn test_make_update_only_on_change() {
        let (mut arena, tracker) = setup();
        assert!(tracker.lock().make_update(&arena).is_none());

        tracker.lock().register_pong(0, 0.0, 0.0, 0.05);
        let update = tracker.lock().make_update(&arena).unwrap();
        arena.apply_delta(&update);
        assert!((arena.get_player(0).unwrap().latency().unwrap().latency - 0.05).abs() < 1e-6);

        assert!(tracker.lock().make_update(&arena).is_none());
    }

    #[test]
    fn test_quit_drops_samples() {
        let (mut arena, tracker) = setup();
        tracker.lock().register_pong(0, 0.0, 0.0, 0.05);
        arena.apply_delta(&ArenaDelta::Quit(0));
        assert!(tracker.lock().stats(0).is_none());
    }
}
