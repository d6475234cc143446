//! Reusable-id slot tables
//!
//! Ids are slot indices. Removing an entry pushes its id on a free list and
//! the next insertion pops it again (LIFO), so live ids stay dense and are
//! never renumbered while live.

use cpsx_core_types::{CostFunctorId, PointId, RelshpId};

use crate::errors::{CpsError, Result};

/// Identifier usable as a slot index
pub trait PoolId: Copy + Eq + std::fmt::Display {
    fn from_slot(slot: u32) -> Self;
    fn slot(self) -> u32;
}

macro_rules! impl_pool_id {
    ($($t:ty),*) => {$(
        impl PoolId for $t {
            fn from_slot(slot: u32) -> Self {
                <$t>::new(slot)
            }
            fn slot(self) -> u32 {
                self.raw()
            }
        }
    )*};
}

impl_pool_id!(PointId, RelshpId, CostFunctorId);

/// Slot table with a free list of released ids
#[derive(Debug, Clone)]
pub struct SlotTable<I, T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    live: usize,
    _id: std::marker::PhantomData<I>,
}

impl<I, T> Default for SlotTable<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _id: std::marker::PhantomData,
        }
    }
}

impl<I: PoolId, T> SlotTable<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.slot() as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.slot() as usize).and_then(Option::as_mut)
    }

    /// Live entries in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (I::from_slot(i as u32), v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (I::from_slot(i as u32), v)))
    }

    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Reserve room so that inserting `n` more entries cannot fail
    ///
    /// # Errors
    /// * `MemErr` - the slot vector could not grow
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        let fresh = n.saturating_sub(self.free.len());
        if self.slots.len() + fresh >= u32::MAX as usize {
            return Err(CpsError::OutOfMemory { what: "id space" });
        }
        self.slots.try_reserve(fresh)?;
        Ok(())
    }

    /// Insert every value, reusing released ids first.
    ///
    /// All-or-nothing: capacity is reserved up front and, should an insertion
    /// still fail, the ids already handed out go back to the free list.
    ///
    /// # Errors
    /// * `MemErr` - the table could not grow
    pub fn insert_many(&mut self, values: Vec<T>) -> Result<Vec<I>> {
        self.reserve(values.len())?;
        let mut ids = Vec::new();
        ids.try_reserve_exact(values.len())?;
        for value in values {
            match self.insert(value) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids.into_iter().rev() {
                        self.remove(id);
                    }
                    return Err(e);
                }
            }
        }
        Ok(ids)
    }

    /// # Errors
    /// * `MemErr` - the table could not grow
    pub fn insert(&mut self, value: T) -> Result<I> {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(value);
                slot
            }
            None => {
                let slot = self.slots.len();
                if slot >= u32::MAX as usize {
                    return Err(CpsError::OutOfMemory { what: "id space" });
                }
                self.slots.try_reserve(1)?;
                self.slots.push(Some(value));
                slot as u32
            }
        };
        self.live += 1;
        Ok(I::from_slot(slot))
    }

    /// Remove a live entry, returning its id to the free list exactly once
    pub fn remove(&mut self, id: I) -> Option<T> {
        let taken = self.slots.get_mut(id.slot() as usize)?.take()?;
        self.free.push(id.slot());
        self.live -= 1;
        Some(taken)
    }

    /// Drop every entry; all ids become reusable
    pub fn clear(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free.push(i as u32);
            }
        }
        self.live = 0;
    }

    /// Number of ids waiting on the free list
    pub fn free_len(&self) -> usize {
        self.free.len()
    }
}
