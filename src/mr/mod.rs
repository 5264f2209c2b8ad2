//! Memory reclamation backends for the lock-free containers.
//!
//! A container never frees a node it has unlinked. It hands the node to the
//! [Scope] it entered for the operation, and the backend decides when no
//! thread can observe the node anymore.
//!
//! Two backends ship with the crate:
//!
//! * [Epoch]: epoch based reclamation over the global `crossbeam-epoch`
//!   collector. This is the default.
//! * [Counted]: reference counting of active scopes. Retired nodes pile up in
//!   a bag and are freed by the scope that brings the count back to zero.

/// Configuration of the reclamation backends
pub mod config;
/// Scope counting backend
pub mod counted;
/// Epoch based backend
pub mod epoch;
/// Reclamation errors
pub mod errors;

pub use config::CountedConfig;
pub use counted::{Counted, CountedScope};
pub use epoch::{Epoch, EpochScope};
pub use errors::{ReclaimError, ReclaimResult};

///
/// Record that can be handed to a reclamation backend after it was unlinked.
///
/// Records may be destroyed after the container that retired them, on any
/// thread, so they must not borrow anything.
pub trait Retire: Send + 'static {
    ///
    /// Whether the record went through logical deletion before retirement.
    fn is_logically_deleted(&self) -> bool;
}

///
/// An entered reclamation scope.
///
/// Nodes read while the scope is alive stay allocated until the scope is
/// dropped, even if they are unlinked and retired in the meantime.
pub trait Scope {
    ///
    /// Hand an unlinked record over for deferred destruction.
    ///
    /// # Safety
    ///
    /// * `node` must come from `Box::into_raw` and must be retired exactly once.
    /// * `node` must already be unreachable for any scope entered after this call.
    unsafe fn retire<N: Retire>(&self, node: *mut N);
}

///
/// Reclamation policy injected into a lock-free container.
///
/// # Safety
///
/// Implementors must not free a retired record while a scope that was alive
/// when the record got unlinked is still alive.
pub unsafe trait Reclaim: Send + Sync {
    /// Scope handed out by [Reclaim::pin]
    type Guard<'a>: Scope
    where
        Self: 'a;

    ///
    /// Enter a scope for the duration of one operation or one borrowed value.
    fn pin(&self) -> Self::Guard<'_>;
}
