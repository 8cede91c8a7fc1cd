use std::cell::{Cell, RefCell};
use std::rc::Rc;

use boardsync_core::remote::{FaultInjector, RemoteOp};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Fault injection for the shared remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Percentage of remote calls failed with a transport error.
    pub drop_rate_percent: u8,
    /// Percentage chance per round that the remote goes offline for the
    /// round.
    pub offline_rate_percent: u8,
    /// Percentage chance per round that remote calls are held until the
    /// round ends, so responses interleave with later actions.
    pub hold_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            drop_rate_percent: 5,
            offline_rate_percent: 5,
            hold_rate_percent: 20,
        }
    }
}

/// Seeded [`FaultInjector`] failing a fixed share of calls.
#[derive(Debug)]
pub struct RemoteFaults {
    rng: RefCell<DeterministicRng>,
    drop_rate_percent: u8,
    armed: Rc<Cell<bool>>,
    dropped: Rc<Cell<usize>>,
}

impl RemoteFaults {
    #[must_use]
    pub fn new(rng: DeterministicRng, drop_rate_percent: u8) -> Self {
        Self {
            rng: RefCell::new(rng),
            drop_rate_percent,
            armed: Rc::new(Cell::new(true)),
            dropped: Rc::new(Cell::new(0)),
        }
    }

    /// Shared switch; while it reads `false` no call is failed.
    #[must_use]
    pub fn arm_switch(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.armed)
    }

    /// Shared count of calls failed so far; stays readable after the
    /// injector is handed to the remote.
    #[must_use]
    pub fn dropped_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.dropped)
    }
}

impl FaultInjector for RemoteFaults {
    fn should_fail(&self, op: RemoteOp) -> bool {
        if !self.armed.get() {
            return false;
        }
        let fail = self
            .rng
            .borrow_mut()
            .hit_rate_percent(self.drop_rate_percent);
        if fail {
            self.dropped.set(self.dropped.get() + 1);
            tracing::trace!(%op, "dropping remote call");
        }
        fail
    }
}

#[cfg(test)]
mod tests {
    use super::RemoteFaults;
    use crate::rng::DeterministicRng;
    use boardsync_core::remote::{FaultInjector, RemoteOp};

    #[test]
    fn zero_rate_never_fails() {
        let faults = RemoteFaults::new(DeterministicRng::new(1), 0);
        assert!((0..100).all(|_| !faults.should_fail(RemoteOp::MoveTask)));
    }

    #[test]
    fn full_rate_always_fails_and_records() {
        let faults = RemoteFaults::new(DeterministicRng::new(1), 100);
        let counter = faults.dropped_counter();
        assert!(faults.should_fail(RemoteOp::CreateTask));
        assert!(faults.should_fail(RemoteOp::SendChatMessage));
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn disarmed_injector_passes_everything() {
        let faults = RemoteFaults::new(DeterministicRng::new(1), 100);
        let armed = faults.arm_switch();
        armed.set(false);
        assert!(!faults.should_fail(RemoteOp::ListProjects));
        assert_eq!(faults.dropped_counter().get(), 0);
        armed.set(true);
        assert!(faults.should_fail(RemoteOp::ListProjects));
    }
}
