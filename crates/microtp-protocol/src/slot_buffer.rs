use crate::packet::SequenceNumber;

/// Fixed-capacity circular store mapping a sequence number to an entry.
///
/// An entry lives at `seq & (capacity - 1)` and is tagged with the sequence
/// number that put it there; lookups with any other sequence number miss. The
/// buffer never grows, so the capacity must exceed the largest reorder or
/// inflight window or unrelated entries overwrite each other.
#[derive(Debug)]
pub struct SlotBuffer<T> {
    entry_sequences: Box<[Option<SequenceNumber>]>,
    entries: Box<[Option<T>]>,
    mask: usize,
}

impl<T> SlotBuffer<T> {
    /// Creates a buffer holding `size` entries.
    ///
    /// # Panics
    /// If `size` is not a power of two. `Config::validate` rejects such sizes.
    pub fn with_capacity(size: u16) -> Self {
        assert!(size.is_power_of_two(), "slot buffer capacity must be a power of two");
        Self {
            entry_sequences: vec![None; size as usize].into_boxed_slice(),
            entries: std::iter::repeat_with(|| None).take(size as usize).collect(),
            mask: size as usize - 1,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> u16 {
        self.entries.len() as u16
    }

    /// Stores `entry` under `sequence_num`, replacing whatever held the slot.
    pub fn put(&mut self, sequence_num: SequenceNumber, entry: T) {
        let index = self.index(sequence_num);
        self.entry_sequences[index] = Some(sequence_num);
        self.entries[index] = Some(entry);
    }

    /// Checks if an entry exists at the given sequence number.
    pub fn exists(&self, sequence_num: SequenceNumber) -> bool {
        self.entry_sequences[self.index(sequence_num)] == Some(sequence_num)
    }

    /// Gets an entry by sequence number.
    pub fn get(&self, sequence_num: SequenceNumber) -> Option<&T> {
        if self.exists(sequence_num) {
            return self.entries[self.index(sequence_num)].as_ref();
        }
        None
    }

    /// Gets a mutable reference to an entry by sequence number.
    pub fn get_mut(&mut self, sequence_num: SequenceNumber) -> Option<&mut T> {
        if self.exists(sequence_num) {
            let index = self.index(sequence_num);
            return self.entries[index].as_mut();
        }
        None
    }

    /// Removes and returns the entry at the specified sequence number.
    pub fn remove(&mut self, sequence_num: SequenceNumber) -> Option<T> {
        if self.exists(sequence_num) {
            let index = self.index(sequence_num);
            self.entry_sequences[index] = None;
            return self.entries[index].take();
        }
        None
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entry_sequences.iter_mut().for_each(|tag| *tag = None);
        self.entries.iter_mut().for_each(|entry| *entry = None);
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.entry_sequences.iter().filter(|tag| tag.is_some()).count()
    }

    /// Returns true if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.entry_sequences.iter().all(Option::is_none)
    }

    fn index(&self, sequence: SequenceNumber) -> usize {
        sequence as usize & self.mask
    }
}
