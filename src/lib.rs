//! Concurrent singly-linked lists.
//!
//! Two containers share one contract, [ListIface](list::ifaces::ListIface):
//!
//! * [LockedList](list::locked::LockedList) serializes every operation behind
//!   a single lock and is the correctness baseline.
//! * [LockFreeList](list::lockfree::LockFreeList) lets readers and writers make
//!   progress without a lock. Deletion marks a link first and unlinks the node
//!   with a compare-exchange afterwards; unlinked nodes are freed by an
//!   injected [reclamation backend](mr::Reclaim).
//!
//! ```
//! use catena::prelude::*;
//!
//! let list: LockFreeList<u64> = LockFreeList::new();
//! list.push_back(1);
//! list.push_back(2);
//! list.remove(&1);
//!
//! assert_eq!(*list.front(), 2);
//! assert_eq!(list.try_pop_front(), Some(2));
//! assert_eq!(list.try_pop_front(), None);
//! ```

/// Singly-linked list containers
pub mod list;
/// Memory reclamation backends for the lock-free containers
pub mod mr;
/// Synchronization primitives the containers are built on
pub mod sync;

///
/// Prelude of the list containers, their backends and primitives
pub mod prelude {
    pub use crate::list::prelude::*;
    pub use crate::mr::{
        Counted, CountedConfig, CountedScope, Epoch, EpochScope, Reclaim, ReclaimError, Retire,
        Scope,
    };
    pub use crate::sync::prelude::*;
}
