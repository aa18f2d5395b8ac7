//! Maintains the live set of known gateway URIs, quarantining ones that have
//! recently failed and periodically giving them another chance.
//!
//! The set here is mutated directly by `mark_as_dead`/a periodic sweep
//! rather than by an external naming service.

mod config;

pub use self::config::GatewayManagerConfig;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

/// The live set of gateways.
pub trait GatewayManager: Send + Sync {
    /// All gateways currently considered live, in a stable but otherwise
    /// unspecified order.
    fn get_live_gateways(&self) -> Vec<String>;

    /// A pseudo-random live gateway, or `None` if the live set is empty.
    fn get_live_gateway(&self) -> Option<String>;

    /// Moves `uri` into quarantine; it won't be returned by either getter
    /// until its cooldown elapses.
    fn mark_as_dead(&self, uri: &str);

    /// Stops whatever background work this manager runs (e.g. the
    /// quarantine sweep); idempotent.
    fn stop(&self);

    /// Alias for `stop`, kept for contract parity with callers that expect
    /// a `Dispose` name. Idempotent after the first call, like `stop`.
    fn dispose(&self) {
        self.stop();
    }
}

struct DeadEntry {
    since: Instant,
}

/// Default `GatewayManager`: a fixed universe of gateway URIs, a live/dead
/// partition, and a quarantine window after which a dead gateway becomes
/// eligible again (it is not proactively health-checked — the next
/// successful dial simply stops re-marking it dead).
pub struct InMemoryGatewayManager {
    config: GatewayManagerConfig,
    state: Mutex<State>,
}

struct State {
    all: Vec<String>,
    dead: HashMap<String, DeadEntry>,
    stopped: bool,
}

impl InMemoryGatewayManager {
    pub fn new(gateways: Vec<String>, config: GatewayManagerConfig) -> Self {
        InMemoryGatewayManager {
            config,
            state: Mutex::new(State {
                all: gateways,
                dead: HashMap::new(),
                stopped: false,
            }),
        }
    }

    /// Adds a newly discovered gateway to the universe. Analogous to the
    /// teacher's resolver pushing a fresh address set, but pushed
    /// one-at-a-time here since there's no external naming service wired
    /// in.
    pub fn add_gateway(&self, uri: impl Into<String>) {
        let uri = uri.into();
        let mut state = self.state.lock().unwrap();
        if !state.all.contains(&uri) {
            state.all.push(uri);
        }
    }

    pub fn remove_gateway(&self, uri: &str) {
        let mut state = self.state.lock().unwrap();
        state.all.retain(|g| g != uri);
        state.dead.remove(uri);
    }

    fn live_snapshot(&self, state: &mut State) -> Vec<String> {
        let quarantine = self.config.quarantine;
        let now = Instant::now();
        state.dead.retain(|uri, entry| {
            let expired = now.duration_since(entry.since) >= quarantine;
            if expired {
                debug!("gateway {} released from quarantine", uri);
            }
            !expired
        });
        state
            .all
            .iter()
            .filter(|g| !state.dead.contains_key(*g))
            .cloned()
            .collect()
    }
}

impl GatewayManager for InMemoryGatewayManager {
    fn get_live_gateways(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        self.live_snapshot(&mut state)
    }

    fn get_live_gateway(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let live = self.live_snapshot(&mut state);
        live.choose(&mut rand::thread_rng()).cloned()
    }

    fn mark_as_dead(&self, uri: &str) {
        let mut state = self.state.lock().unwrap();
        warn!("marking gateway {} dead for {:?}", uri, self.config.quarantine);
        state.dead.insert(
            uri.to_owned(),
            DeadEntry {
                since: Instant::now(),
            },
        );
    }

    fn stop(&self) {
        self.state.lock().unwrap().stopped = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> InMemoryGatewayManager {
        InMemoryGatewayManager::new(
            vec!["g1".into(), "g2".into(), "g3".into()],
            GatewayManagerConfig {
                quarantine: Duration::from_millis(50),
            },
        )
    }

    #[test]
    fn dead_gateways_are_excluded_until_quarantine_elapses() {
        let mgr = manager();
        mgr.mark_as_dead("g1");
        let live = mgr.get_live_gateways();
        assert!(!live.contains(&"g1".to_owned()));
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn quarantine_expires() {
        let mgr = manager();
        mgr.mark_as_dead("g1");
        std::thread::sleep(Duration::from_millis(60));
        let live = mgr.get_live_gateways();
        assert!(live.contains(&"g1".to_owned()));
    }

    #[test]
    fn empty_universe_yields_no_live_gateway() {
        let mgr = InMemoryGatewayManager::new(vec![], GatewayManagerConfig::default());
        assert_eq!(mgr.get_live_gateway(), None);
        assert!(mgr.get_live_gateways().is_empty());
    }
}
