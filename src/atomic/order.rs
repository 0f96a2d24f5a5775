use std::sync::atomic::Ordering;

/// Memory ordering attached to every atomic operation in this crate.
///
/// Mirrors the relaxed / consume / acquire / release / acq-rel / seq-cst model.
/// Rust has no consume ordering, so `Consume` is carried out as `Acquire`,
/// which is strictly stronger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryOrder {
    Relaxed,
    Consume,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

impl MemoryOrder {
    /// The failure ordering a compare-exchange uses when the caller only
    /// gives a success ordering.
    ///
    /// A failed compare-exchange is just a load, so the store half of the
    /// success ordering is dropped: Release becomes Relaxed, AcqRel becomes
    /// Acquire. The result is never stronger than `self`.
    pub const fn failure(self) -> MemoryOrder {
        match self {
            MemoryOrder::Release => MemoryOrder::Relaxed,
            MemoryOrder::AcqRel => MemoryOrder::Acquire,
            other => other,
        }
    }

    /// Relative strength used to check that a failure ordering does not
    /// exceed its success ordering. Acquire and Release are not comparable
    /// with each other, but both sit between Relaxed and AcqRel.
    const fn rank(self) -> u8 {
        match self {
            MemoryOrder::Relaxed => 0,
            MemoryOrder::Consume | MemoryOrder::Acquire | MemoryOrder::Release => 1,
            MemoryOrder::AcqRel => 2,
            MemoryOrder::SeqCst => 3,
        }
    }

    pub(crate) fn for_rmw(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Consume | MemoryOrder::Acquire => Ordering::Acquire,
            MemoryOrder::Release => Ordering::Release,
            MemoryOrder::AcqRel => Ordering::AcqRel,
            MemoryOrder::SeqCst => Ordering::SeqCst,
        }
    }

    /// Ordering for a plain load. Release and AcqRel have no meaning on a
    /// load; in release builds they are strengthened to SeqCst instead of
    /// reaching the panic inside `std`.
    pub(crate) fn for_load(self) -> Ordering {
        debug_assert!(
            !matches!(self, MemoryOrder::Release | MemoryOrder::AcqRel),
            "{self:?} is not a valid load ordering"
        );
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Consume | MemoryOrder::Acquire => Ordering::Acquire,
            MemoryOrder::Release | MemoryOrder::AcqRel | MemoryOrder::SeqCst => Ordering::SeqCst,
        }
    }

    /// Ordering for a plain store. Consume, Acquire and AcqRel are not valid
    /// store orderings and get strengthened to SeqCst.
    pub(crate) fn for_store(self) -> Ordering {
        debug_assert!(
            !matches!(
                self,
                MemoryOrder::Consume | MemoryOrder::Acquire | MemoryOrder::AcqRel
            ),
            "{self:?} is not a valid store ordering"
        );
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Release => Ordering::Release,
            _ => Ordering::SeqCst,
        }
    }

    /// Success and failure orderings for a compare-exchange.
    pub(crate) fn for_cas(success: MemoryOrder, failure: MemoryOrder) -> (Ordering, Ordering) {
        debug_assert!(
            failure.rank() <= success.rank(),
            "failure ordering {failure:?} is stronger than success ordering {success:?}"
        );
        // A failed compare-exchange only loads, so any store component in
        // the failure ordering is dropped the same way `failure()` does it.
        (success.for_rmw(), failure.failure().for_load())
    }

    pub(crate) fn for_fence(self) -> Option<Ordering> {
        match self {
            MemoryOrder::Relaxed => None,
            other => Some(other.for_rmw()),
        }
    }
}

impl From<Ordering> for MemoryOrder {
    fn from(order: Ordering) -> Self {
        match order {
            Ordering::Relaxed => MemoryOrder::Relaxed,
            Ordering::Acquire => MemoryOrder::Acquire,
            Ordering::Release => MemoryOrder::Release,
            Ordering::AcqRel => MemoryOrder::AcqRel,
            _ => MemoryOrder::SeqCst,
        }
    }
}

#[test]
fn failure_downgrade_table() {
    use MemoryOrder::*;
    assert_eq!(Relaxed.failure(), Relaxed);
    assert_eq!(Consume.failure(), Consume);
    assert_eq!(Acquire.failure(), Acquire);
    assert_eq!(Release.failure(), Relaxed);
    assert_eq!(AcqRel.failure(), Acquire);
    assert_eq!(SeqCst.failure(), SeqCst);

    for order in [Relaxed, Consume, Acquire, Release, AcqRel, SeqCst] {
        assert!(order.failure().rank() <= order.rank());
    }
}

#[test]
fn cas_orderings_are_accepted_by_std() {
    use MemoryOrder::*;
    use std::sync::atomic::AtomicU32;

    let a = AtomicU32::new(0);
    for success in [Relaxed, Consume, Acquire, Release, AcqRel, SeqCst] {
        let (s, f) = MemoryOrder::for_cas(success, success.failure());
        // Would panic inside std if the failure ordering were Release/AcqRel.
        assert!(a.compare_exchange(0, 0, s, f).is_ok());
    }
}

#[test]
fn consume_is_never_weaker_than_acquire() {
    assert_eq!(MemoryOrder::Consume.for_load(), Ordering::Acquire);
    assert_eq!(MemoryOrder::Consume.for_rmw(), Ordering::Acquire);
}
