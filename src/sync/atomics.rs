use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

// Bit 0 of a link carries the logical deletion mark. Nodes are at least
// word aligned, so the bit is always free in a real address.
const MARK_BIT: usize = 0b1;

/// Snapshot of a markable link: a node address together with its deletion mark.
pub struct MarkedPtr<N> {
    raw: *mut N,
}

impl<N> MarkedPtr<N> {
    /// Unmarked pointer to `ptr`. Any mark carried by `ptr` is dropped.
    #[inline]
    pub fn new(ptr: *mut N) -> Self {
        MarkedPtr {
            raw: Self::unmask(ptr),
        }
    }

    #[inline]
    pub fn null() -> Self {
        MarkedPtr {
            raw: ptr::null_mut(),
        }
    }

    #[inline]
    pub(crate) fn from_raw(raw: *mut N) -> Self {
        MarkedPtr { raw }
    }

    /// Strip the mark bit from a raw pointer.
    #[inline]
    pub fn unmask(ptr: *mut N) -> *mut N {
        (ptr as usize & !MARK_BIT) as *mut N
    }

    /// Address without the mark bit, the one to dereference.
    #[inline]
    pub fn as_ptr(&self) -> *mut N {
        Self::unmask(self.raw)
    }

    /// Raw word with the mark bit intact.
    #[inline]
    pub fn as_raw(&self) -> *mut N {
        self.raw
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.raw as usize & MARK_BIT != 0
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.as_ptr().is_null()
    }

    #[inline]
    pub fn with_mark(&self, mark: bool) -> Self {
        let addr = self.as_ptr() as usize;
        let raw = if mark { addr | MARK_BIT } else { addr };
        MarkedPtr {
            raw: raw as *mut N,
        }
    }
}

impl<N> Clone for MarkedPtr<N> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for MarkedPtr<N> {}

impl<N> PartialEq for MarkedPtr<N> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<N> Eq for MarkedPtr<N> {}

impl<N> fmt::Debug for MarkedPtr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkedPtr")
            .field("ptr", &self.as_ptr())
            .field("marked", &self.is_marked())
            .finish()
    }
}

///
/// AtomicMarkablePtr<N> is a node link that carries a one-bit deletion mark.
///
/// The address and the mark are read and written together. Once a link is
/// marked it stays marked: every compare-exchange expects an unmarked link, so
/// a marked link is frozen for good.
pub struct AtomicMarkablePtr<N> {
    ptr: AtomicPtr<N>,
}

impl<N> AtomicMarkablePtr<N> {
    ///
    /// New unmarked link pointing to `ptr`
    pub fn new(ptr: *mut N) -> AtomicMarkablePtr<N> {
        AtomicMarkablePtr {
            ptr: AtomicPtr::new(MarkedPtr::unmask(ptr)),
        }
    }

    ///
    /// New unmarked empty link
    pub fn null() -> AtomicMarkablePtr<N> {
        Self::new(ptr::null_mut())
    }

    fn strongest_failure_ordering(order: Ordering) -> Ordering {
        use Ordering::*;
        match order {
            Release => Relaxed,
            Relaxed => Relaxed,
            SeqCst => SeqCst,
            Acquire => Acquire,
            AcqRel => Acquire,
            _ => Acquire,
        }
    }

    ///
    /// Read address and mark in one atomic load
    #[inline]
    pub fn load(&self, order: Ordering) -> MarkedPtr<N> {
        MarkedPtr::from_raw(self.ptr.load(order))
    }

    ///
    /// Current mark state of the link
    #[inline]
    pub fn get_mark(&self) -> bool {
        self.load(Ordering::Acquire).is_marked()
    }

    ///
    /// Set the mark if it is unset.
    ///
    /// Returns `true` only for the call that performed the unmarked to marked
    /// transition; every later call sees the mark and returns `false`.
    pub fn mark(&self) -> bool {
        let mut current = self.ptr.load(Ordering::Acquire);
        loop {
            let observed = MarkedPtr::from_raw(current);
            if observed.is_marked() {
                return false;
            }

            match self.ptr.compare_exchange_weak(
                current,
                observed.with_mark(true).as_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    ///
    /// Swing the link from `(expected, unmarked)` to `(desired, unmarked)`.
    ///
    /// Marks carried by either argument are ignored. On failure the link value
    /// that was observed is returned, which is marked whenever the owner of the
    /// link was logically deleted.
    pub fn compare_exchange(
        &self,
        expected: *mut N,
        desired: *mut N,
    ) -> Result<(), MarkedPtr<N>> {
        let order = Ordering::AcqRel;
        self.ptr
            .compare_exchange(
                MarkedPtr::unmask(expected),
                MarkedPtr::unmask(desired),
                order,
                Self::strongest_failure_ordering(order),
            )
            .map(|_| ())
            .map_err(MarkedPtr::from_raw)
    }

    ///
    /// Plain assignment of the referenced node. The mark bit is never copied:
    /// after a store the link is unmarked.
    #[inline]
    pub fn store(&self, ptr: *mut N) {
        self.ptr.store(MarkedPtr::unmask(ptr), Ordering::Release);
    }

    ///
    /// Mark the link through exclusive access, returning the marked value.
    #[inline]
    pub fn mark_mut(&mut self) -> MarkedPtr<N> {
        let raw = self.ptr.get_mut();
        let marked = MarkedPtr::from_raw(*raw).with_mark(true);
        *raw = marked.as_raw();
        marked
    }
}

impl<N> Default for AtomicMarkablePtr<N> {
    fn default() -> Self {
        Self::null()
    }
}

impl<N> fmt::Debug for AtomicMarkablePtr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Acquire), f)
    }
}
