use std::ops::Deref;

///
/// Container surface shared by [LockedList](super::locked::LockedList) and
/// [LockFreeList](super::lockfree::LockFreeList).
///
/// `front`, `back` and `pop_front` require a non-empty list and panic
/// otherwise; [ListIface::try_pop_front] is the non-failing way to drain.
pub trait ListIface<T: PartialEq> {
    /// Borrowed element handed out by `front` and `back`
    type Ref<'a>: Deref<Target = T>
    where
        Self: 'a;

    /// Number of elements. Exact only without concurrent mutation.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn front(&self) -> Self::Ref<'_>;

    fn back(&self) -> Self::Ref<'_>;

    fn pop_front(&self);

    fn push_back(&self, value: T);

    /// Removes every element equal to `value` and returns how many this call removed.
    fn remove(&self, value: &T) -> usize;

    /// Pops the first element, `None` when the list is empty.
    fn try_pop_front(&self) -> Option<T>;

    /// Visits the elements front to back. Every call starts a new traversal.
    fn for_each<F: FnMut(&T)>(&self, f: F);

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = Vec::new();
        self.for_each(|value| out.push(value.clone()));
        out
    }
}
