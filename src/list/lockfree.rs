use log::*;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::Ordering;

use super::ifaces::ListIface;
use crate::mr::{Epoch, Reclaim, Retire, Scope};
use crate::sync::atomics::AtomicMarkablePtr;

struct Node<T> {
    value: T,
    next: AtomicMarkablePtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(value: T) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value,
            next: AtomicMarkablePtr::null(),
        }))
    }

    #[inline]
    fn is_marked(&self) -> bool {
        self.next.get_mark()
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        // A node has to be logically deleted before it is destroyed.
        assert!(
            self.next.get_mark(),
            "destroyed a list node that was never logically deleted"
        );
    }
}

impl<T: Send + 'static> Retire for Node<T> {
    fn is_logically_deleted(&self) -> bool {
        self.is_marked()
    }
}

///
/// Lock-free singly-linked list with a pluggable reclamation backend.
///
/// Links are [AtomicMarkablePtr]s. Removing a node first marks its outgoing
/// link, which takes it out of the list logically, and then swings the
/// predecessor's link past it with a compare-exchange. The list is anchored
/// by a permanent sentinel link that is never marked, so the first element
/// always has a stable predecessor.
///
/// Unlinked nodes are retired through the backend `R` and freed once no
/// operation can still dereference them. Values handed out as [Ref] stay
/// valid for as long as the `Ref` lives.
///
/// Nodes that are marked but still linked, because the remover lost the race
/// to unlink them, are unlinked by the next `push_back`, `pop_front`, `front`
/// or `remove` that walks over them.
///
/// `size`, `back` and iteration are traversals without a point-in-time view:
/// under concurrent mutation they reflect some interleaving of the updates.
///
/// Elements must be `'static`. A retired node may be destroyed by the
/// backend after the list itself is gone, so the element type can not
/// borrow from anything shorter lived:
///
/// ```compile_fail
/// use catena::prelude::*;
///
/// let owner = String::from("borrowed");
/// let list: LockFreeList<&String> = LockFreeList::new();
/// list.push_back(&owner);
/// ```
pub struct LockFreeList<T, R: Reclaim = Epoch> {
    // Link of the sentinel node; never marked.
    head: AtomicMarkablePtr<Node<T>>,
    reclaimer: R,
    marker: PhantomData<(Box<Node<T>>, *const ())>,
}

unsafe impl<T: Send + Sync, R: Reclaim> Send for LockFreeList<T, R> {}
unsafe impl<T: Send + Sync, R: Reclaim> Sync for LockFreeList<T, R> {}

impl<T: Send + 'static, R: Reclaim + Default> LockFreeList<T, R> {
    pub fn new() -> Self {
        Self::with_reclaimer(R::default())
    }
}

impl<T: Send + 'static, R: Reclaim> LockFreeList<T, R> {
    ///
    /// Build a list on top of a configured reclamation backend.
    pub fn with_reclaimer(reclaimer: R) -> Self {
        LockFreeList {
            head: AtomicMarkablePtr::null(),
            reclaimer,
            marker: PhantomData,
        }
    }

    pub fn reclaimer(&self) -> &R {
        &self.reclaimer
    }

    ///
    /// Swing `pred` from `cur` to `cur`'s successor. `cur` must be marked, so
    /// its successor can not change anymore. Whoever wins the exchange retires
    /// `cur`.
    unsafe fn unlink<S: Scope>(
        pred: &AtomicMarkablePtr<Node<T>>,
        cur: *mut Node<T>,
        scope: &S,
    ) -> bool {
        let succ = (*cur).next.load(Ordering::Acquire);
        debug_assert!(succ.is_marked());
        match pred.compare_exchange(cur, succ.as_ptr()) {
            Ok(()) => {
                scope.retire(cur);
                true
            }
            Err(_) => false,
        }
    }

    /// First unmarked node, unlinking marked nodes in front of it. Null if there is none.
    unsafe fn first_live<S: Scope>(&self, scope: &S) -> *mut Node<T> {
        loop {
            let cur = self.head.load(Ordering::Acquire).as_ptr();
            if cur.is_null() || !(*cur).is_marked() {
                return cur;
            }
            if Self::unlink(&self.head, cur, scope) {
                trace!("lockfree: unlinked a marked node at the head");
            }
        }
    }

    /// Last unmarked reachable node. Null if there is none.
    unsafe fn last_live(&self) -> *mut Node<T> {
        let mut last = ptr::null_mut();
        let mut cur = self.head.load(Ordering::Acquire).as_ptr();
        while !cur.is_null() {
            let next = (*cur).next.load(Ordering::Acquire);
            if !next.is_marked() {
                last = cur;
            }
            cur = next.as_ptr();
        }
        last
    }

    ///
    /// Number of unmarked elements.
    ///
    /// Exact only when no other thread mutates the list during the call.
    pub fn size(&self) -> usize {
        let _scope = self.reclaimer.pin();
        let mut count = 0;
        let mut cur = self.head.load(Ordering::Acquire).as_ptr();
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Acquire) };
            if !next.is_marked() {
                count += 1;
            }
            cur = next.as_ptr();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        let scope = self.reclaimer.pin();
        unsafe { self.first_live(&scope).is_null() }
    }

    ///
    /// First element. Panics on an empty list.
    pub fn front(&self) -> Ref<'_, T, R> {
        let scope = self.reclaimer.pin();
        loop {
            let cur = unsafe { self.first_live(&scope) };
            assert!(!cur.is_null(), "front() called on an empty list");
            let node = unsafe { &*cur };
            if node.is_marked() {
                continue;
            }
            let value = &node.value;
            if node.is_marked() {
                trace!("lockfree: front was deleted while reading, retrying");
                continue;
            }
            return Ref {
                _scope: scope,
                value,
            };
        }
    }

    ///
    /// Last element. Panics on an empty list.
    ///
    /// No tail is cached, so this walks the whole list.
    pub fn back(&self) -> Ref<'_, T, R> {
        let scope = self.reclaimer.pin();
        loop {
            let cur = unsafe { self.last_live() };
            assert!(!cur.is_null(), "back() called on an empty list");
            let node = unsafe { &*cur };
            let value = &node.value;
            if node.is_marked() {
                trace!("lockfree: back was deleted while reading, retrying");
                continue;
            }
            return Ref {
                _scope: scope,
                value,
            };
        }
    }

    ///
    /// Drop the first element. Panics on an empty list.
    pub fn pop_front(&self) {
        let popped = self.pop_with(|_| ());
        assert!(popped.is_some(), "pop_front() called on an empty list");
    }

    ///
    /// Pop the first element, or `None` when the list is empty.
    ///
    /// The popped value is cloned out: readers that still hold a [Ref] to it
    /// keep the original alive until the backend reclaims the node.
    pub fn try_pop_front(&self) -> Option<T>
    where
        T: Clone,
    {
        self.pop_with(T::clone)
    }

    fn pop_with<U, F>(&self, f: F) -> Option<U>
    where
        F: FnOnce(&T) -> U,
    {
        let scope = self.reclaimer.pin();
        loop {
            let cur = unsafe { self.first_live(&scope) };
            if cur.is_null() {
                return None;
            }
            let node = unsafe { &*cur };
            if !node.next.mark() {
                trace!("lockfree: first node was deleted concurrently, retrying pop");
                continue;
            }

            // The mark makes this call the owner of the element. The sentinel
            // is never deleted, so the only competing unlink of `cur` comes
            // from a helper, which retires the node itself.
            let out = f(&node.value);
            unsafe { Self::unlink(&self.head, cur, &scope) };
            return Some(out);
        }
    }

    ///
    /// Append `value` after the last reachable node.
    ///
    /// When two threads race for the same tail one of them wins and the other
    /// appends after it; no order between them is promised.
    pub fn push_back(&self, value: T) {
        let scope = self.reclaimer.pin();
        let node = Node::alloc(value);

        'retry: loop {
            let mut pred = &self.head;
            let mut cur = pred.load(Ordering::Acquire);
            while !cur.is_null() {
                let cur_node = unsafe { &*cur.as_ptr() };
                let next = cur_node.next.load(Ordering::Acquire);
                if next.is_marked() {
                    if unsafe { Self::unlink(pred, cur.as_ptr(), &scope) } {
                        cur = pred.load(Ordering::Acquire);
                        continue;
                    }
                    trace!("lockfree: lost the race to unlink a marked node, retrying push");
                    continue 'retry;
                }
                pred = &cur_node.next;
                cur = next;
            }

            match pred.compare_exchange(ptr::null_mut(), node) {
                Ok(()) => return,
                Err(_) => {
                    trace!("lockfree: tail moved, retrying push");
                    continue 'retry;
                }
            }
        }
    }

    ///
    /// Elements front to back, skipping logically deleted ones.
    pub fn iter(&self) -> Iter<'_, T, R> {
        let scope = self.reclaimer.pin();
        let cur = self.head.load(Ordering::Acquire).as_ptr();
        Iter {
            list: self,
            _scope: scope,
            cur,
        }
    }
}

impl<T: PartialEq + Send + 'static, R: Reclaim> LockFreeList<T, R> {
    ///
    /// Remove every element equal to `value` in one pass.
    ///
    /// Returns the number of nodes this call marked. A marked node whose
    /// unlink fails stays invisible and is unlinked by a later traversal.
    pub fn remove(&self, value: &T) -> usize {
        let scope = self.reclaimer.pin();
        let mut removed = 0;
        let mut pred = &self.head;
        let mut cur = pred.load(Ordering::Acquire).as_ptr();

        while !cur.is_null() {
            let node = unsafe { &*cur };
            if node.value == *value && node.next.mark() {
                removed += 1;
            }

            if node.is_marked() {
                let succ = node.next.load(Ordering::Acquire).as_ptr();
                if !unsafe { Self::unlink(pred, cur, &scope) } {
                    trace!("lockfree: unlink during remove failed, leaving the node marked");
                }
                // Keep the predecessor, it still precedes the successor.
                cur = succ;
            } else {
                pred = &node.next;
                cur = node.next.load(Ordering::Acquire).as_ptr();
            }
        }

        removed
    }
}

impl<T: Send + 'static, R: Reclaim + Default> Default for LockFreeList<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static, R: Reclaim + Default> FromIterator<T> for LockFreeList<T, R> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<T: Send + 'static, R: Reclaim> Extend<T> for LockFreeList<T, R> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T: Send + fmt::Debug + 'static, R: Reclaim> fmt::Debug for LockFreeList<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T, R: Reclaim> Drop for LockFreeList<T, R> {
    fn drop(&mut self) {
        let mut cur = self.head.mark_mut().as_ptr();
        let mut freed = 0_usize;
        while !cur.is_null() {
            // SAFETY: exclusive access; every node still linked is owned by
            // the chain, and retired nodes are not linked anymore.
            let mut node = unsafe { Box::from_raw(cur) };
            cur = node.next.mark_mut().as_ptr();
            drop(node);
            freed += 1;
        }
        debug!("lockfree: dropped list with {} linked nodes", freed);
    }
}

impl<T, R> ListIface<T> for LockFreeList<T, R>
where
    T: PartialEq + Clone + Send + Sync + 'static,
    R: Reclaim,
{
    type Ref<'a> = Ref<'a, T, R>
    where
        Self: 'a;

    fn size(&self) -> usize {
        LockFreeList::size(self)
    }

    fn is_empty(&self) -> bool {
        LockFreeList::is_empty(self)
    }

    fn front(&self) -> Self::Ref<'_> {
        LockFreeList::front(self)
    }

    fn back(&self) -> Self::Ref<'_> {
        LockFreeList::back(self)
    }

    fn pop_front(&self) {
        LockFreeList::pop_front(self)
    }

    fn push_back(&self, value: T) {
        LockFreeList::push_back(self, value)
    }

    fn remove(&self, value: &T) -> usize {
        LockFreeList::remove(self, value)
    }

    fn try_pop_front(&self) -> Option<T> {
        LockFreeList::try_pop_front(self)
    }

    fn for_each<F: FnMut(&T)>(&self, mut f: F) {
        let _scope = self.reclaimer.pin();
        let mut cur = self.head.load(Ordering::Acquire).as_ptr();
        while !cur.is_null() {
            let node = unsafe { &*cur };
            let next = node.next.load(Ordering::Acquire);
            if !next.is_marked() {
                f(&node.value);
            }
            cur = next.as_ptr();
        }
    }
}

///
/// A list element protected by its own reclamation scope.
///
/// The value may be removed from the list while the `Ref` is alive, but its
/// memory is not reused before the `Ref` is dropped.
pub struct Ref<'a, T, R: Reclaim + 'a> {
    _scope: R::Guard<'a>,
    value: &'a T,
}

impl<'a, T, R: Reclaim + 'a> Deref for Ref<'a, T, R> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<'a, T: fmt::Debug, R: Reclaim + 'a> fmt::Debug for Ref<'a, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.value, f)
    }
}

impl<'a, T: fmt::Display, R: Reclaim + 'a> fmt::Display for Ref<'a, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.value, f)
    }
}

///
/// Forward iterator over a [LockFreeList].
///
/// The iterator holds a scope for its whole lifetime. Each yielded [Ref]
/// enters a scope of its own, so items may outlive the iterator.
pub struct Iter<'a, T, R: Reclaim + 'a> {
    list: &'a LockFreeList<T, R>,
    _scope: R::Guard<'a>,
    cur: *mut Node<T>,
}

impl<'a, T, R: Reclaim + 'a> Iterator for Iter<'a, T, R> {
    type Item = Ref<'a, T, R>;

    fn next(&mut self) -> Option<Ref<'a, T, R>> {
        while !self.cur.is_null() {
            // SAFETY: the iterator scope keeps every node read through it alive.
            let node: &'a Node<T> = unsafe { &*self.cur };
            let next = node.next.load(Ordering::Acquire);
            self.cur = next.as_ptr();
            if !next.is_marked() {
                return Some(Ref {
                    _scope: self.list.reclaimer.pin(),
                    value: &node.value,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mr::{Counted, CountedConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct Tracked {
        id: u64,
        drops: Arc<AtomicUsize>,
    }

    impl PartialEq for Tracked {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn eager() -> Counted {
        Counted::with_config(CountedConfig::new().with_collect_threshold(1)).unwrap()
    }

    fn values<R: Reclaim>(list: &LockFreeList<u64, R>) -> Vec<u64> {
        list.iter().map(|r| *r).collect()
    }

    #[test]
    fn lockfree_push_and_iterate_in_order() {
        let list: LockFreeList<u64> = LockFreeList::new();
        for i in 0..10 {
            list.push_back(i);
        }

        assert_eq!(list.size(), 10);
        assert_eq!(values(&list), (0..10).collect::<Vec<u64>>());
        assert_eq!(*list.front(), 0);
        assert_eq!(*list.back(), 9);
    }

    #[test]
    fn lockfree_pop_front() {
        let list: LockFreeList<u64> = LockFreeList::new();
        list.push_back(1);
        list.push_back(2);

        list.pop_front();
        assert_eq!(values(&list), vec![2]);
        assert_eq!(*list.front(), 2);
        assert_eq!(*list.back(), 2);
    }

    #[test]
    fn lockfree_remove_all_matches() {
        let list: LockFreeList<u64> = vec![1, 9, 2, 9, 3].into_iter().collect();

        assert_eq!(list.remove(&9), 2);
        assert_eq!(values(&list), vec![1, 2, 3]);
        assert_eq!(list.remove(&9), 0);
        assert_eq!(values(&list), vec![1, 2, 3]);
    }

    #[test]
    fn lockfree_try_pop_front() {
        let list: LockFreeList<String> = LockFreeList::new();
        assert_eq!(list.try_pop_front(), None);

        list.push_back("a".to_string());
        assert_eq!(list.try_pop_front(), Some("a".to_string()));
        assert!(list.is_empty());
        assert_eq!(list.size(), 0);
    }

    #[test]
    fn lockfree_marked_straggler_is_skipped_and_cleaned() {
        let list: LockFreeList<u64, Counted> = LockFreeList::with_reclaimer(eager());
        for i in 0..3 {
            list.push_back(i);
        }

        // Mark the middle node without unlinking it, as a remover that lost
        // the unlink race would.
        unsafe {
            let first = list.head.load(Ordering::Acquire).as_ptr();
            let second = (*first).next.load(Ordering::Acquire).as_ptr();
            assert!((*second).next.mark());
        }

        assert_eq!(list.size(), 2);
        assert_eq!(values(&list), vec![0, 2]);

        list.push_back(3);
        assert_eq!(values(&list), vec![0, 2, 3]);
        assert_eq!(list.reclaimer().pending(), 0);
    }

    #[test]
    fn lockfree_straggler_at_head_does_not_block_pop() {
        let list: LockFreeList<u64> = vec![7, 8].into_iter().collect();

        unsafe {
            let first = list.head.load(Ordering::Acquire).as_ptr();
            assert!((*first).next.mark());
        }

        assert_eq!(*list.front(), 8);
        assert_eq!(list.try_pop_front(), Some(8));
        assert_eq!(list.try_pop_front(), None);
    }

    #[test]
    fn lockfree_ref_outlives_removal() {
        let drops = Arc::new(AtomicUsize::new(0));
        let list: LockFreeList<Tracked, Counted> = LockFreeList::with_reclaimer(eager());
        list.push_back(Tracked {
            id: 1,
            drops: drops.clone(),
        });

        let front = list.front();
        list.pop_front();
        assert_eq!(front.id, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(list.reclaimer().pending(), 1);

        drop(front);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(list.reclaimer().pending(), 0);
    }

    #[test]
    fn lockfree_drop_frees_linked_nodes() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let list: LockFreeList<Tracked, Counted> = LockFreeList::new();
            for id in 0..5 {
                list.push_back(Tracked {
                    id,
                    drops: drops.clone(),
                });
            }
            list.remove(&Tracked {
                id: 3,
                drops: drops.clone(),
            });
        }
        // Five list nodes plus the probe passed to remove.
        assert_eq!(drops.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn lockfree_iter_items_outlive_iterator() {
        let list: LockFreeList<u64, Counted> = LockFreeList::with_reclaimer(eager());
        list.push_back(1);
        list.push_back(2);

        let items: Vec<Ref<'_, u64, Counted>> = list.iter().collect();
        assert_eq!(list.reclaimer().active_scopes(), 2);

        list.remove(&1);
        assert_eq!(*items[0], 1);
        assert_eq!(*items[1], 2);
        assert_eq!(list.reclaimer().pending(), 1);

        drop(items);
        assert_eq!(list.reclaimer().active_scopes(), 0);
        assert_eq!(list.reclaimer().pending(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn lockfree_epoch_destroys_popped_values_after_list_drop() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let list: LockFreeList<Tracked> = LockFreeList::new();
            list.push_back(Tracked {
                id: 1,
                drops: drops.clone(),
            });
            list.pop_front();
        }
        // The popped node outlives the list in the global collector; the
        // value it owns keeps its counter alive until then.
        let backend = Epoch::new();
        for _ in 0..100_000 {
            if drops.load(Ordering::SeqCst) == 1 {
                break;
            }
            let scope = backend.pin();
            scope.flush();
            drop(scope);
            std::thread::yield_now();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lockfree_holds_static_borrows() {
        static NAMES: [&str; 2] = ["left", "right"];
        let list: LockFreeList<&'static str> = NAMES.iter().copied().collect();

        assert_eq!(*list.front(), "left");
        assert_eq!(list.remove(&"left"), 1);
        assert_eq!(list.try_pop_front(), Some("right"));
    }

    #[test]
    fn lockfree_debug_lists_values() {
        let list: LockFreeList<u64> = vec![4, 5].into_iter().collect();
        assert_eq!(format!("{:?}", list), "[4, 5]");
    }

    #[test]
    #[should_panic(expected = "front() called on an empty list")]
    fn lockfree_front_on_empty_panics() {
        let list: LockFreeList<u64> = LockFreeList::new();
        let _ = list.front();
    }

    #[test]
    #[should_panic(expected = "back() called on an empty list")]
    fn lockfree_back_on_empty_panics() {
        let list: LockFreeList<u64> = LockFreeList::new();
        list.push_back(1);
        list.remove(&1);
        let _ = list.back();
    }

    #[test]
    #[should_panic(expected = "pop_front() called on an empty list")]
    fn lockfree_pop_front_on_empty_panics() {
        let list: LockFreeList<u64> = LockFreeList::new();
        list.pop_front();
    }
}
