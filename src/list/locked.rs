use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::ptr::NonNull;

use super::ifaces::ListIface;

struct Node<T> {
    value: T,
    next: Option<Box<Node<T>>>,
}

/// The node chain. `tail` points into the chain owned by `head` and is only
/// touched under the list lock.
struct Chain<T> {
    head: Option<Box<Node<T>>>,
    tail: Option<NonNull<Node<T>>>,
}

// The raw tail aliases a node owned through `head`.
unsafe impl<T: Send> Send for Chain<T> {}

impl<T> Chain<T> {
    fn new() -> Self {
        Chain {
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.iter().count()
    }

    fn iter(&self) -> LockedIter<'_, T> {
        LockedIter {
            next: self.head.as_deref(),
        }
    }

    fn push_node(&mut self, mut node: Box<Node<T>>) {
        node.next = None;
        let raw = NonNull::from(&mut *node);
        match self.tail {
            None => {
                debug_assert!(self.head.is_none());
                self.head = Some(node);
            }
            // SAFETY: tail points at the last node of the chain, which is
            // alive as long as the chain and only reachable under the lock.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(node) },
        }
        self.tail = Some(raw);
    }

    fn pop_node(&mut self) -> Option<Box<Node<T>>> {
        let mut node = self.head.take()?;
        self.head = node.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        Some(node)
    }

    fn remove(&mut self, value: &T) -> usize
    where
        T: PartialEq,
    {
        // Relink the surviving nodes in place; the tail ends up on the last survivor.
        let mut rest = self.head.take();
        self.tail = None;
        let mut removed = 0;
        while let Some(mut node) = rest {
            rest = node.next.take();
            if node.value == *value {
                removed += 1;
            } else {
                self.push_node(node);
            }
        }
        removed
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        let mut cur = self.head.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
        self.tail = None;
    }
}

///
/// Singly-linked list guarded by one lock per instance.
///
/// Every operation holds the lock for its whole duration, so all operations
/// are linearizable against each other, reads included. References handed
/// out by [LockedList::front], [LockedList::back] and [LockedList::iter] keep
/// the lock until they are dropped.
pub struct LockedList<T> {
    chain: Mutex<Chain<T>>,
}

impl<T> LockedList<T> {
    pub fn new() -> Self {
        LockedList {
            chain: Mutex::new(Chain::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().head.is_none()
    }

    ///
    /// First element. Panics on an empty list.
    pub fn front(&self) -> MappedMutexGuard<'_, T> {
        let chain = self.chain.lock();
        assert!(chain.head.is_some(), "front() called on an empty list");
        MutexGuard::map(chain, |c| match c.head.as_mut() {
            Some(node) => &mut node.value,
            None => unreachable!(),
        })
    }

    ///
    /// Last element. Panics on an empty list.
    pub fn back(&self) -> MappedMutexGuard<'_, T> {
        let chain = self.chain.lock();
        let tail = match chain.tail {
            Some(tail) => tail,
            None => panic!("back() called on an empty list"),
        };
        // SAFETY: the tail node is owned by the locked chain and the mapped
        // guard keeps the lock for the lifetime of the reference.
        MutexGuard::map(chain, |_| unsafe {
            debug_assert!((*tail.as_ptr()).next.is_none());
            &mut (*tail.as_ptr()).value
        })
    }

    ///
    /// Drop the first element. Panics on an empty list.
    pub fn pop_front(&self) {
        let popped = self.chain.lock().pop_node();
        assert!(popped.is_some(), "pop_front() called on an empty list");
    }

    pub fn push_back(&self, value: T) {
        let node = Box::new(Node { value, next: None });
        self.chain.lock().push_node(node);
    }

    ///
    /// Remove every element equal to `value`, returning the number removed.
    pub fn remove(&self, value: &T) -> usize
    where
        T: PartialEq,
    {
        self.chain.lock().remove(value)
    }

    ///
    /// Pop the first element, or `None` when the list is empty.
    pub fn try_pop_front(&self) -> Option<T> {
        // Drop the lock before the node is destructured.
        let popped = self.chain.lock().pop_node();
        popped.map(|node| node.value)
    }

    ///
    /// Lock the list for iteration.
    ///
    /// The returned guard blocks every other operation on this list, reads
    /// included, until it is dropped.
    pub fn iter(&self) -> ListGuard<'_, T> {
        ListGuard {
            chain: self.chain.lock(),
        }
    }
}

impl<T> Default for LockedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for LockedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<T> Extend<T> for LockedList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let chain = self.chain.get_mut();
        for value in iter {
            chain.push_node(Box::new(Node { value, next: None }));
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LockedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().iter()).finish()
    }
}

impl<T> ListIface<T> for LockedList<T>
where
    T: PartialEq,
{
    type Ref<'a> = MappedMutexGuard<'a, T>
    where
        Self: 'a;

    fn size(&self) -> usize {
        LockedList::size(self)
    }

    fn is_empty(&self) -> bool {
        LockedList::is_empty(self)
    }

    fn front(&self) -> Self::Ref<'_> {
        LockedList::front(self)
    }

    fn back(&self) -> Self::Ref<'_> {
        LockedList::back(self)
    }

    fn pop_front(&self) {
        LockedList::pop_front(self)
    }

    fn push_back(&self, value: T) {
        LockedList::push_back(self, value)
    }

    fn remove(&self, value: &T) -> usize {
        LockedList::remove(self, value)
    }

    fn try_pop_front(&self) -> Option<T> {
        LockedList::try_pop_front(self)
    }

    fn for_each<F: FnMut(&T)>(&self, f: F) {
        self.iter().iter().for_each(f)
    }
}

///
/// Exclusive view of a [LockedList], holding its lock.
pub struct ListGuard<'a, T> {
    chain: MutexGuard<'a, Chain<T>>,
}

impl<'a, T> ListGuard<'a, T> {
    pub fn iter(&self) -> LockedIter<'_, T> {
        self.chain.iter()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.head.is_none()
    }
}

impl<'g, 'a, T> IntoIterator for &'g ListGuard<'a, T> {
    type Item = &'g T;
    type IntoIter = LockedIter<'g, T>;

    fn into_iter(self) -> LockedIter<'g, T> {
        self.iter()
    }
}

///
/// Forward iterator over a locked chain.
pub struct LockedIter<'g, T> {
    next: Option<&'g Node<T>>,
}

impl<'g, T> Iterator for LockedIter<'g, T> {
    type Item = &'g T;

    #[inline]
    fn next(&mut self) -> Option<&'g T> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.value)
    }
}
