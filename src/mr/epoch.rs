use crossbeam_epoch::{self as epoch, Guard, Shared};
use log::*;

use super::{Reclaim, Retire, Scope};

///
/// Epoch based reclamation over the global `crossbeam-epoch` collector.
///
/// Stateless: every container using it shares the global collector, so the
/// backend itself is a zero sized value. Retired nodes are destroyed once all
/// threads pinned at retirement time have moved past that epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct Epoch;

impl Epoch {
    pub fn new() -> Self {
        Epoch
    }
}

unsafe impl Reclaim for Epoch {
    type Guard<'a> = EpochScope
    where
        Self: 'a;

    #[inline]
    fn pin(&self) -> EpochScope {
        EpochScope(epoch::pin())
    }
}

///
/// A pinned epoch.
pub struct EpochScope(Guard);

impl EpochScope {
    ///
    /// Push the deferred destructions of this thread to the global queue.
    pub fn flush(&self) {
        self.0.flush();
    }
}

impl Scope for EpochScope {
    #[inline]
    unsafe fn retire<N: Retire>(&self, node: *mut N) {
        debug_assert!(
            (*node).is_logically_deleted(),
            "retired a node that was never logically deleted"
        );
        trace!("epoch: deferring destruction of {:p}", node);
        self.0.defer_destroy(Shared::from(node as *const N));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Probe {
        deleted: AtomicBool,
        drops: Arc<AtomicUsize>,
    }

    impl Retire for Probe {
        fn is_logically_deleted(&self) -> bool {
            self.deleted.load(Ordering::Acquire)
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn epoch_defers_while_pinned() {
        let drops = Arc::new(AtomicUsize::new(0));
        let backend = Epoch::new();

        {
            let scope = backend.pin();
            for _ in 0..16 {
                let probe = Box::into_raw(Box::new(Probe {
                    deleted: AtomicBool::new(true),
                    drops: drops.clone(),
                }));
                unsafe { scope.retire(probe) };
            }
            scope.flush();
            // Nothing can be reclaimed while this scope is pinned.
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }
    }
}
