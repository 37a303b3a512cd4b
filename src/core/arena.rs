//! Ownership containers for graph elements.
//!
//! An [`Arena`] owns element storage and hands out generation-checked
//! [`Handle`]s. A [`List`] is an ordered sequence of handles into one arena:
//!
//! - an *owning* list claims each element it holds; an element is owned by at
//!   most one list at a time and moving it requires an explicit
//!   [`List::transfer`], never a silent re-attach;
//! - a *view* list only references elements and never claims or destroys them.
//!
//! Lookups by position are linear. Nets are small, so that is fine.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::error::ArenaError;

/// Stable reference to an element stored in an [`Arena`].
///
/// Handles of removed elements never alias later insertions: the slot
/// generation is bumped on removal.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index; unique among live elements of one arena.
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Claims its elements; may destroy them.
    Owning,
    /// Non-owning view.
    View,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    owner: Option<ListId>,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    next_list: u32,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            next_list: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Upper bound (exclusive) of [`Handle::index`] for this arena.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Create an empty list bound to this arena.
    pub fn list(&mut self, ownership: Ownership) -> List<T> {
        let id = ListId(self.next_list);
        self.next_list = self.next_list.wrapping_add(1);
        List {
            id,
            ownership,
            items: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Handle<T> {
        let entry = Some(Entry { value, owner: None });
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = entry;
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry,
        });
        Handle::new(index, 0)
    }

    fn entry(&self, h: Handle<T>) -> Option<&Entry<T>> {
        let slot = self.slots.get(h.index())?;
        if slot.generation != h.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, h: Handle<T>) -> Option<&mut Entry<T>> {
        let slot = self.slots.get_mut(h.index())?;
        if slot.generation != h.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub fn contains(&self, h: Handle<T>) -> bool {
        self.entry(h).is_some()
    }

    pub fn get(&self, h: Handle<T>) -> Option<&T> {
        self.entry(h).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, h: Handle<T>) -> Option<&mut T> {
        self.entry_mut(h).map(|e| &mut e.value)
    }

    /// The owning list currently holding `h`, if any.
    pub fn owner(&self, h: Handle<T>) -> Option<ListId> {
        self.entry(h).and_then(|e| e.owner)
    }

    /// Remove an unowned element. Owned elements must be destroyed through
    /// their owning list so the list never keeps a dead handle.
    pub fn remove(&mut self, h: Handle<T>) -> Result<T, ArenaError> {
        match self.entry(h) {
            None => return Err(ArenaError::Stale),
            Some(e) if e.owner.is_some() => return Err(ArenaError::OwnedElsewhere),
            Some(_) => {}
        }
        Ok(self.take(h))
    }

    // Caller has checked that `h` is live.
    fn take(&mut self, h: Handle<T>) -> T {
        let slot = &mut self.slots[h.index()];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(h.index);
        self.len -= 1;
        match slot.entry.take() {
            Some(e) => e.value,
            None => unreachable!("take() on a vacant slot"),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry
                .as_ref()
                .map(|e| (Handle::new(i as u32, slot.generation), &e.value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.entry
                .as_mut()
                .map(|e| (Handle::new(i as u32, generation), &mut e.value))
        })
    }
}

/// Ordered sequence of handles into one [`Arena`].
///
/// A `List` does not borrow its arena; every mutating call takes the arena
/// explicitly. Dropping a list does not free anything: storage belongs to the
/// arena and goes away with it.
#[derive(Debug, Clone)]
pub struct List<T> {
    id: ListId,
    ownership: Ownership,
    items: Vec<Handle<T>>,
}

impl<T> List<T> {
    pub fn id(&self) -> ListId {
        self.id
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_owning(&self) -> bool {
        self.ownership == Ownership::Owning
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<Handle<T>> {
        self.items.first().copied()
    }

    pub fn last(&self) -> Option<Handle<T>> {
        self.items.last().copied()
    }

    pub fn get(&self, index: usize) -> Option<Handle<T>> {
        self.items.get(index).copied()
    }

    pub fn index_of(&self, h: Handle<T>) -> Option<usize> {
        self.items.iter().position(|&x| x == h)
    }

    pub fn contains(&self, h: Handle<T>) -> bool {
        self.items.contains(&h)
    }

    pub fn as_slice(&self) -> &[Handle<T>] {
        &self.items
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Handle<T>> + ExactSizeIterator + '_ {
        self.items.iter().copied()
    }

    /// Restartable traversal that tolerates detaching the element it just
    /// returned.
    pub fn cursor(&self) -> Cursor<T> {
        Cursor {
            next: 0,
            last: None,
        }
    }

    fn claim(&self, arena: &mut Arena<T>, h: Handle<T>) -> Result<(), ArenaError> {
        let id = self.id;
        let owning = self.is_owning();
        let present = self.contains(h);
        let entry = arena.entry_mut(h).ok_or(ArenaError::Stale)?;
        if present {
            return Err(ArenaError::AlreadyPresent);
        }
        if owning {
            if entry.owner.is_some() {
                return Err(ArenaError::OwnedElsewhere);
            }
            entry.owner = Some(id);
        }
        Ok(())
    }

    fn release(&self, arena: &mut Arena<T>, h: Handle<T>) {
        if !self.is_owning() {
            return;
        }
        if let Some(entry) = arena.entry_mut(h) {
            if entry.owner == Some(self.id) {
                entry.owner = None;
            }
        }
    }

    /// Insert at the front.
    pub fn attach(&mut self, arena: &mut Arena<T>, h: Handle<T>) -> Result<(), ArenaError> {
        self.claim(arena, h)?;
        self.items.insert(0, h);
        Ok(())
    }

    pub fn attach_last(&mut self, arena: &mut Arena<T>, h: Handle<T>) -> Result<(), ArenaError> {
        self.claim(arena, h)?;
        self.items.push(h);
        Ok(())
    }

    pub fn attach_before(
        &mut self,
        arena: &mut Arena<T>,
        h: Handle<T>,
        before: Handle<T>,
    ) -> Result<(), ArenaError> {
        let at = self.index_of(before).ok_or(ArenaError::AnchorMissing)?;
        self.claim(arena, h)?;
        self.items.insert(at, h);
        Ok(())
    }

    pub fn attach_after(
        &mut self,
        arena: &mut Arena<T>,
        h: Handle<T>,
        after: Handle<T>,
    ) -> Result<(), ArenaError> {
        let at = self.index_of(after).ok_or(ArenaError::AnchorMissing)?;
        self.claim(arena, h)?;
        self.items.insert(at + 1, h);
        Ok(())
    }

    /// Insert so that `h` ends up at `index`; `index == len` appends.
    pub fn attach_at(
        &mut self,
        arena: &mut Arena<T>,
        h: Handle<T>,
        index: usize,
    ) -> Result<(), ArenaError> {
        let len = self.items.len();
        if index > len {
            return Err(ArenaError::IndexOutOfRange { index, len });
        }
        self.claim(arena, h)?;
        self.items.insert(index, h);
        Ok(())
    }

    /// Unlink without destroying.
    pub fn detach(&mut self, arena: &mut Arena<T>, h: Handle<T>) -> Result<(), ArenaError> {
        let at = self.index_of(h).ok_or(ArenaError::NotPresent)?;
        self.items.remove(at);
        self.release(arena, h);
        Ok(())
    }

    /// Unlink every element without destroying any.
    pub fn detach_all(&mut self, arena: &mut Arena<T>) {
        for h in core::mem::take(&mut self.items) {
            self.release(arena, h);
        }
    }

    /// Move `h` out of `from` (which must own it) into this list, at the end.
    pub fn transfer(
        &mut self,
        from: &mut List<T>,
        arena: &mut Arena<T>,
        h: Handle<T>,
    ) -> Result<(), ArenaError> {
        if self.contains(h) {
            return Err(ArenaError::AlreadyPresent);
        }
        let at = from.index_of(h).ok_or(ArenaError::NotPresent)?;
        from.detach(arena, h)?;
        if let Err(e) = self.attach_last(arena, h) {
            // Put it back where `transfer` found it.
            from.attach_at(arena, h, at)?;
            return Err(e);
        }
        Ok(())
    }

    /// Detach and free one element. Only valid on an owning list.
    pub fn destroy(&mut self, arena: &mut Arena<T>, h: Handle<T>) -> Result<T, ArenaError> {
        if !self.is_owning() {
            return Err(ArenaError::NotOwning);
        }
        self.detach(arena, h)?;
        arena.remove(h)
    }

    /// Destroy every element, front to back. Only valid on an owning list.
    pub fn empty(&mut self, arena: &mut Arena<T>) -> Result<Vec<T>, ArenaError> {
        if !self.is_owning() {
            return Err(ArenaError::NotOwning);
        }
        let mut out = Vec::with_capacity(self.items.len());
        let mut cursor = self.cursor();
        while let Some(h) = cursor.next(self) {
            out.push(self.destroy(arena, h)?);
        }
        Ok(out)
    }
}

/// Forward traversal over a [`List`] that does not hold a borrow between
/// steps.
///
/// Detaching the element most recently returned is safe: the next call picks
/// up the element that slid into its position.
#[derive(Debug)]
pub struct Cursor<T> {
    next: usize,
    last: Option<Handle<T>>,
}

impl<T> Cursor<T> {
    pub fn next(&mut self, list: &List<T>) -> Option<Handle<T>> {
        if let Some(last) = self.last {
            if self.next > 0 && list.items.get(self.next - 1) != Some(&last) {
                self.next -= 1;
            }
        }
        let h = *list.items.get(self.next)?;
        self.next += 1;
        self.last = Some(h);
        Some(h)
    }

    pub fn restart(&mut self) {
        self.next = 0;
        self.last = None;
    }
}
