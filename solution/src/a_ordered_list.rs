//! Ordered container
//!
//! A double-ended sequence that owns its elements outright.
//! The storage uses it in three places: as the eviction ledger (file names in arrival order), as the set of clients that have a file open, and as the queue of waiting lock requests.
//!
//! Front and back operations are O(1).
//! Lookups and removals by predicate are linear scans, with the equality decided by a closure at the call site.
//! Nothing here ever fails on an empty list: the "not found" case is a `None`, so callers can tell a no-op removal apart from a real one.
//!
//! A [`Handle`] designates a position in the list.
//! It stays valid until the list is next mutated; after that, it may designate a different element or none at all.

use std::collections::VecDeque;

/// Position of an element inside an [`OrderedList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(usize);

/// Double-ended sequence with predicate-based lookup and removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedList<T> {
    items: VecDeque<T>,
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        OrderedList {
            items: VecDeque::new(),
        }
    }
}

impl<T> OrderedList<T> {
    /// Create an empty list
    pub fn new() -> OrderedList<T> {
        OrderedList::default()
    }

    /// Number of elements in the list
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list holds no element
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append `value` at the tail
    pub fn push_back(&mut self, value: T) {
        self.items.push_back(value);
    }

    /// Insert `value` at the head
    pub fn push_front(&mut self, value: T) {
        self.items.push_front(value);
    }

    /// Remove and return the head element
    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Remove and return the tail element
    pub fn pop_back(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    /// Handle to the head element, if any
    pub fn head(&self) -> Option<Handle> {
        if self.items.is_empty() {
            None
        } else {
            Some(Handle(0))
        }
    }

    /// Handle to the element following `handle`, if any
    pub fn next(&self, handle: Handle) -> Option<Handle> {
        let next = handle.0 + 1;
        if next < self.items.len() {
            Some(Handle(next))
        } else {
            None
        }
    }

    /// Element designated by `handle`
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.items.get(handle.0)
    }

    /// Handle to the first element, from the head, matching `pred`
    pub fn find<F>(&self, mut pred: F) -> Option<Handle>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().position(|item| pred(item)).map(Handle)
    }

    /// Remove and return the first element, from the head, matching `pred`
    pub fn remove<F>(&mut self, pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let handle = self.find(pred)?;
        self.items.remove(handle.0)
    }

    /// Remove every element matching `pred`, returning them in list order
    pub fn remove_all<F>(&mut self, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if pred(&item) {
                removed.push(item);
            } else {
                kept.push_back(item);
            }
        }
        self.items = kept;
        removed
    }

    /// Iterate over the elements, head first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Consume the list, handing every element to `destructor`, head first
    pub fn destroy<F>(self, destructor: F)
    where
        F: FnMut(T),
    {
        self.items.into_iter().for_each(destructor);
    }
}

impl<T: PartialEq> OrderedList<T> {
    /// Whether an element equal to `value` is in the list
    pub fn contains(&self, value: &T) -> bool {
        self.find(|item| item == value).is_some()
    }

    /// Remove the first element equal to `value`
    pub fn remove_value(&mut self, value: &T) -> Option<T> {
        self.remove(|item| item == value)
    }
}

#[cfg(test)]
#[path = "../../api/fs-tests/a_test.rs"]
mod tests;
