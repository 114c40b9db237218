//! Id-keyed storage with monotonically allocated ids.
//!
//! Backed by a `BTreeMap` so that iteration order is ascending id
//! order, which every enumeration-order tie-break in the crate relies
//! on.

use std::{
    collections::BTreeMap,
    marker::PhantomData,
    ops::{Index, IndexMut},
};

#[derive(Clone, Debug, PartialEq)]
pub struct Arena<Id: IdLike + Ord + Copy, T> {
    inner: BTreeMap<Id, T>,
    next_id: usize,
    _phantom: PhantomData<Id>,
}

impl<Id: IdLike + Ord + Copy, T> Arena<Id, T> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
            next_id: 0,
            _phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn push(&mut self, x: T) -> Id {
        let id = Id::from_raw(self.next_id);
        self.next_id += 1;
        self.inner.insert(id, x);
        id
    }

    /// Insert under an explicit id. Returns the previous value, if the
    /// id was already taken.
    pub fn insert(&mut self, id: Id, x: T) -> Option<T> {
        self.next_id = self.next_id.max(id.into_raw() + 1);
        self.inner.insert(id, x)
    }

    pub fn remove(&mut self, id: Id) -> Option<T> {
        self.inner.remove(&id)
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.inner.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.inner.get_mut(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.inner.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.inner.iter().map(|(i, v)| (*i, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut T)> {
        self.inner.iter_mut().map(|(i, v)| (*i, v))
    }
}

impl<Id: IdLike + Ord + Copy, T> Default for Arena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: IdLike + Ord + Copy + std::fmt::Debug, T> Index<Id> for Arena<Id, T> {
    type Output = T;

    fn index(&self, index: Id) -> &Self::Output {
        match self.inner.get(&index) {
            Some(x) => x,
            None => panic!("no entry for {index:?}"),
        }
    }
}

impl<Id: IdLike + Ord + Copy + std::fmt::Debug, T> IndexMut<Id> for Arena<Id, T> {
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        match self.inner.get_mut(&index) {
            Some(x) => x,
            None => panic!("no entry for {index:?}"),
        }
    }
}

pub trait IdLike {
    fn from_raw(index: usize) -> Self;
    fn into_raw(self) -> usize;
}

#[cfg(test)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TestId(u32);

#[cfg(test)]
impl IdLike for TestId {
    fn from_raw(index: usize) -> Self {
        Self(index as u32)
    }

    fn into_raw(self) -> usize {
        self.0 as usize
    }
}

#[test]
fn push_after_explicit_insert_skips_taken_ids() {
    let mut arena = Arena::<TestId, &str>::new();
    assert_eq!(arena.insert(TestId(4), "a"), None);
    let id = arena.push("b");
    assert_eq!(id, TestId(5));
    assert_eq!(arena.ids().collect::<Vec<_>>(), vec![TestId(4), TestId(5)]);
    assert_eq!(arena.remove(TestId(4)), Some("a"));
    assert!(!arena.contains(TestId(4)));
    assert_eq!(arena.push("c"), TestId(6));
}
