use log::*;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use super::config::CountedConfig;
use super::errors::ReclaimResult;
use super::{Reclaim, Retire, Scope};

/// Type-erased destructor of a retired node
type DestructorFn = unsafe fn(*mut ());

unsafe fn destroy<N>(node: *mut ()) {
    drop(Box::from_raw(node as *mut N));
}

/// Entry of the retired bag
struct Retired {
    node: *mut (),
    destructor: DestructorFn,
    next: *mut Retired,
}

///
/// Reclamation by counting active scopes.
///
/// Every [Counted::pin] increments the active scope count and every scope
/// drop decrements it. Retired nodes are pushed onto a lock-free bag. A
/// leaving scope detaches the bag *before* it decrements the count; if the
/// decrement takes the count to zero, no scope that could have observed any
/// of the detached nodes is still alive, and the batch is freed. Otherwise
/// the batch is pushed back for a later scope.
///
/// Nodes still in the bag when the backend is dropped are freed then.
pub struct Counted {
    active: AtomicUsize,
    pending: AtomicUsize,
    retired: AtomicPtr<Retired>,
    config: CountedConfig,
}

impl Counted {
    pub fn new() -> Self {
        Self::from_config(CountedConfig::default())
    }

    ///
    /// Build the backend from a validated configuration
    pub fn with_config(config: CountedConfig) -> ReclaimResult<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: CountedConfig) -> Self {
        Counted {
            active: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            retired: AtomicPtr::new(ptr::null_mut()),
            config,
        }
    }

    pub fn config(&self) -> &CountedConfig {
        &self.config
    }

    ///
    /// Number of scopes currently alive
    pub fn active_scopes(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    ///
    /// Number of retired nodes waiting to be freed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn retire_raw(&self, node: *mut (), destructor: DestructorFn) {
        let entry = Box::into_raw(Box::new(Retired {
            node,
            destructor,
            next: ptr::null_mut(),
        }));
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.push_batch(entry, entry);
    }

    fn push_batch(&self, first: *mut Retired, last: *mut Retired) {
        let mut head = self.retired.load(Ordering::Acquire);
        loop {
            unsafe { (*last).next = head };
            match self
                .retired
                .compare_exchange_weak(head, first, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    fn unpin(&self) {
        let batch = if self.pending.load(Ordering::SeqCst) >= self.config.collect_threshold {
            self.retired.swap(ptr::null_mut(), Ordering::SeqCst)
        } else {
            ptr::null_mut()
        };

        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            if !batch.is_null() {
                let freed = unsafe { Self::free_batch(batch) };
                self.pending.fetch_sub(freed, Ordering::SeqCst);
                debug!("counted: freed {} retired nodes", freed);
            }
        } else if !batch.is_null() {
            let mut last = batch;
            unsafe {
                while !(*last).next.is_null() {
                    last = (*last).next;
                }
            }
            trace!("counted: scopes still active, returning batch to the bag");
            self.push_batch(batch, last);
        }
    }

    /// Frees a detached chain of retired entries and returns its length.
    unsafe fn free_batch(mut cur: *mut Retired) -> usize {
        let mut freed = 0;
        while !cur.is_null() {
            let entry = Box::from_raw(cur);
            cur = entry.next;
            (entry.destructor)(entry.node);
            freed += 1;
        }
        freed
    }
}

impl Default for Counted {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Counted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counted")
            .field("active", &self.active_scopes())
            .field("pending", &self.pending())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        let batch = *self.retired.get_mut();
        *self.retired.get_mut() = ptr::null_mut();
        let freed = unsafe { Self::free_batch(batch) };
        if freed > 0 {
            debug!("counted: freed {} retired nodes on teardown", freed);
        }
    }
}

unsafe impl Reclaim for Counted {
    type Guard<'a> = CountedScope<'a>
    where
        Self: 'a;

    #[inline]
    fn pin(&self) -> CountedScope<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        CountedScope { domain: self }
    }
}

///
/// A counted scope, released on drop.
pub struct CountedScope<'a> {
    domain: &'a Counted,
}

impl Scope for CountedScope<'_> {
    #[inline]
    unsafe fn retire<N: Retire>(&self, node: *mut N) {
        debug_assert!(
            (*node).is_logically_deleted(),
            "retired a node that was never logically deleted"
        );
        self.domain.retire_raw(node as *mut (), destroy::<N>);
    }
}

impl Drop for CountedScope<'_> {
    fn drop(&mut self) {
        self.domain.unpin();
    }
}
