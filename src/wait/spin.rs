use std::hint::spin_loop;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::time::{Duration, Instant};

/// How long a waiting thread busy-polls before asking the OS to park it.
///
/// Parking and waking through the kernel costs microseconds at best, while
/// the critical sections behind most waits (a spin-lock hand-off, a counter
/// bump) finish well within that. Polling for a few microseconds first
/// keeps those waits out of the kernel entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpinPolicy {
    /// Polls between two looks at the clock. Each poll is one relaxed load
    /// followed by a CPU pause hint.
    pub polls_per_round: u32,
    /// Wall-clock time to keep polling. Zero disables spinning.
    pub budget: Duration,
}

impl SpinPolicy {
    pub const DEFAULT: SpinPolicy = SpinPolicy {
        polls_per_round: 64,
        budget: Duration::from_micros(4),
    };

    /// Go straight to the OS after the first comparison.
    pub const NONE: SpinPolicy = SpinPolicy {
        polls_per_round: 0,
        budget: Duration::ZERO,
    };
}

impl Default for SpinPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static POLLS_PER_ROUND: AtomicU32 = AtomicU32::new(SpinPolicy::DEFAULT.polls_per_round);
static BUDGET_NANOS: AtomicU64 = AtomicU64::new(SpinPolicy::DEFAULT.budget.as_nanos() as u64);

/// Replaces the process-wide spin policy used by every later wait.
///
/// The two fields are stored separately, so a wait that starts while this
/// runs may see one old and one new field. Either combination is a valid
/// policy.
pub fn set_spin_policy(policy: SpinPolicy) {
    let nanos = u64::try_from(policy.budget.as_nanos()).unwrap_or(u64::MAX);
    POLLS_PER_ROUND.store(policy.polls_per_round, Relaxed);
    BUDGET_NANOS.store(nanos, Relaxed);
    tracing::debug!(
        polls_per_round = policy.polls_per_round,
        budget_ns = nanos,
        "spin policy updated"
    );
}

pub fn spin_policy() -> SpinPolicy {
    SpinPolicy {
        polls_per_round: POLLS_PER_ROUND.load(Relaxed),
        budget: Duration::from_nanos(BUDGET_NANOS.load(Relaxed)),
    }
}

pub(crate) struct SpinWait {
    policy: SpinPolicy,
}

impl SpinWait {
    pub(crate) fn new(policy: SpinPolicy) -> Self {
        Self { policy }
    }

    /// Polls `changed` until it returns true or the budget runs out.
    /// Returns whether a change was seen.
    pub(crate) fn spin_until(&self, mut changed: impl FnMut() -> bool) -> bool {
        if self.policy.polls_per_round == 0 || self.policy.budget.is_zero() {
            return false;
        }
        let deadline = Instant::now() + self.policy.budget;
        loop {
            for _ in 0..self.policy.polls_per_round {
                if changed() {
                    return true;
                }
                spin_loop();
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    }
}

#[test]
fn spin_gives_up_after_the_budget() {
    let spin = SpinWait::new(SpinPolicy {
        polls_per_round: 64,
        budget: Duration::from_micros(50),
    });
    let start = Instant::now();
    let mut polls = 0;
    assert!(!spin.spin_until(|| {
        polls += 1;
        false
    }));
    assert!(start.elapsed() >= Duration::from_micros(50));
    // Whole rounds only.
    assert_eq!(polls % 64, 0);
}

#[test]
fn spin_stops_at_the_first_change() {
    let spin = SpinWait::new(SpinPolicy::DEFAULT);
    let mut polls = 0;
    assert!(spin.spin_until(|| {
        polls += 1;
        polls == 10
    }));
    assert_eq!(polls, 10);
}

#[test]
fn disabled_spin_never_polls() {
    let spin = SpinWait::new(SpinPolicy::NONE);
    assert!(!spin.spin_until(|| unreachable!()));
}

#[test]
fn policy_round_trips_through_the_global() {
    // Puts the previous policy back even if an assertion below fails. Waits
    // in other tests may briefly run with the policy set here, which is
    // valid for them too.
    struct Restore(SpinPolicy);

    impl Drop for Restore {
        fn drop(&mut self) {
            set_spin_policy(self.0);
        }
    }

    let _restore = Restore(spin_policy());
    let policy = SpinPolicy {
        polls_per_round: 16,
        budget: Duration::from_micros(2),
    };
    set_spin_policy(policy);
    assert_eq!(spin_policy(), policy);
}
