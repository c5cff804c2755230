//! Generational arena for frame, block, and job records.
//!
//! Records are addressed by [`ArenaIndex`]. A slot's generation is bumped
//! whenever its occupant is removed, so a stale index held by a handle that
//! outlived its record resolves to `None` instead of aliasing a newer record.

use core::fmt;

/// Index of a record, checked against the slot generation on every access.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaIndex {
    slot: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Builds an index from raw parts.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// The slot position.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// The generation the index was issued under.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}@{})", self.slot, self.generation)
    }
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when no record is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a value and returns its index.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Inserts a value that needs to know its own index.
    pub fn insert_with(&mut self, make: impl FnOnce(ArenaIndex) -> T) -> ArenaIndex {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.entries[slot as usize];
            let index = ArenaIndex::new(slot, entry.generation);
            entry.value = Some(make(index));
            return index;
        }
        let slot = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        let index = ArenaIndex::new(slot, 0);
        self.entries.push(Entry {
            generation: 0,
            value: Some(make(index)),
        });
        index
    }

    /// Removes and returns the record at `index`.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.entries.get_mut(index.slot as usize)?;
        if entry.generation != index.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.len -= 1;
        Some(value)
    }

    /// Shared access to a live record.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        self.entries
            .get(index.slot as usize)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    /// Mutable access to a live record.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        self.entries
            .get_mut(index.slot as usize)
            .filter(|entry| entry.generation == index.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    /// True if `index` still names a live record.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Iterates live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.entries.iter().enumerate().filter_map(|(slot, entry)| {
            let slot = u32::try_from(slot).ok()?;
            entry
                .value
                .as_ref()
                .map(|value| (ArenaIndex::new(slot, entry.generation), value))
        })
    }

    /// Removes every record, returning them in slot order.
    pub fn drain(&mut self) -> Vec<T> {
        let drained: Vec<T> = self
            .entries
            .iter_mut()
            .filter_map(|entry| {
                let value = entry.value.take()?;
                entry.generation = entry.generation.wrapping_add(1);
                Some(value)
            })
            .collect();
        self.free = (0..self.entries.len())
            .rev()
            .filter_map(|slot| u32::try_from(slot).ok())
            .collect();
        self.len = 0;
        drained
    }
}
