use crate::hash::{Avalanche, KeyHasher};
use crate::raw::{self, InsertResult};

use std::error::Error;
use std::fmt;

/// A fixed-capacity, lock-free hash table mapping non-zero `u32` keys to
/// non-zero `u32` values.
///
/// All operations except [`clear`](HashTable::clear) take `&self` and may be
/// called from any number of threads at once. See the [crate-level
/// documentation](crate) for the guarantees they provide while racing.
pub struct HashTable<H = Avalanche> {
    raw: raw::HashTable<H>,
}

/// A builder for a [`HashTable`].
///
/// # Examples
///
/// ```rust
/// use backshift::{Avalanche, HashTable};
///
/// let table: HashTable = HashTable::builder()
///     // Set the number of slots.
///     .capacity(4096)
///     // Set the hasher.
///     .hasher(Avalanche)
///     // Construct the hash table.
///     .build();
///
/// assert_eq!(table.capacity(), 4096);
/// ```
pub struct HashTableBuilder<H = Avalanche> {
    hasher: H,
    capacity: usize,
}

impl HashTableBuilder {
    /// Set the hasher used to pick the ideal slot of each key.
    pub fn hasher<H>(self, hasher: H) -> HashTableBuilder<H> {
        HashTableBuilder {
            hasher,
            capacity: self.capacity,
        }
    }
}

impl<H> HashTableBuilder<H> {
    /// Set the number of slots in the table.
    ///
    /// The capacity is fixed for the lifetime of the table and must be a
    /// power of two. Leave generous headroom: probe lengths grow quickly as
    /// the table approaches full occupancy.
    pub fn capacity(self, capacity: usize) -> HashTableBuilder<H> {
        HashTableBuilder {
            capacity,
            hasher: self.hasher,
        }
    }

    /// Construct a [`HashTable`] from the builder, using the configured options.
    ///
    /// # Panics
    ///
    /// Panics if the configured capacity is not a power of two.
    pub fn build(self) -> HashTable<H> {
        HashTable {
            raw: raw::HashTable::new(self.capacity, self.hasher),
        }
    }
}

impl<H: fmt::Debug> fmt::Debug for HashTableBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTableBuilder")
            .field("capacity", &self.capacity)
            .field("hasher", &self.hasher)
            .finish()
    }
}

impl HashTable {
    /// Creates an empty `HashTable` with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    /// let table = HashTable::new(1024);
    /// assert!(table.is_empty());
    /// ```
    pub fn new(capacity: usize) -> HashTable {
        HashTable::with_hasher(capacity, Avalanche)
    }

    /// Returns a builder for a `HashTable`.
    ///
    /// The builder can be used for more complex configuration, such as using
    /// a custom [`KeyHasher`].
    pub fn builder() -> HashTableBuilder {
        HashTableBuilder {
            capacity: DEFAULT_CAPACITY,
            hasher: Avalanche,
        }
    }
}

// The capacity used by `HashTable::default` and `HashTable::builder`.
const DEFAULT_CAPACITY: usize = 1024;

impl Default for HashTable {
    fn default() -> HashTable {
        HashTable::new(DEFAULT_CAPACITY)
    }
}

impl<H> HashTable<H> {
    /// Creates an empty `HashTable` with `capacity` slots, using `hasher` to
    /// pick the ideal slot of each key.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub fn with_hasher(capacity: usize, hasher: H) -> HashTable<H> {
        HashTable {
            raw: raw::HashTable::new(capacity, hasher),
        }
    }

    /// Returns the number of slots in the table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the number of entries in the table.
    ///
    /// The count is exact once every operation has returned. While operations
    /// are in flight it is only an estimate.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the table contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the table's [`KeyHasher`].
    #[inline]
    pub fn hasher(&self) -> &H {
        self.raw.hasher()
    }

    /// Removes every entry from the table.
    ///
    /// The slots are kept allocated. Taking `&mut self` guarantees that no
    /// other operation runs at the same time.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    ///
    /// let mut table = HashTable::new(16);
    /// table.insert(1, 10);
    /// table.clear();
    /// assert_eq!(table.get(1), None);
    /// ```
    pub fn clear(&mut self) {
        self.raw.clear()
    }

    /// Returns the key of every slot, in slot order, each followed by `|`.
    /// Empty slots show as `0`.
    ///
    /// This is a diagnostic aid. Under concurrent modification the output
    /// mixes slots sampled at different times.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    ///
    /// let table = HashTable::new(4);
    /// assert_eq!(table.dump(), "0|0|0|0|");
    /// ```
    pub fn dump(&self) -> String {
        let mut out = String::with_capacity(self.capacity() * 2);
        // Writing to a `String` never fails.
        let _ = self.raw.dump(&mut out);
        out
    }
}

impl<H> HashTable<H>
where
    H: KeyHasher,
{
    /// Returns the value associated with `key`, or `None` if it is absent.
    ///
    /// A lookup racing with an insert or remove of the same key may see the
    /// table before or after that operation. A lookup racing with the removal
    /// of a *different* key may briefly miss an entry that is being shifted
    /// back into the freed slot.
    ///
    /// # Panics
    ///
    /// Panics if `key` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    ///
    /// let table = HashTable::new(16);
    /// table.insert(1, 10);
    /// assert_eq!(table.get(1), Some(10));
    /// assert_eq!(table.get(2), None);
    /// ```
    #[inline]
    pub fn get(&self, key: u32) -> Option<u32> {
        assert_ne!(key, 0, "zero is not a valid key");
        self.raw.get(key)
    }

    /// Returns `true` if the table contains a value for `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is zero.
    #[inline]
    pub fn contains_key(&self, key: u32) -> bool {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair, overwriting the value if the key is already
    /// present.
    ///
    /// # Panics
    ///
    /// Panics if `key` or `value` is zero, or if the table has no room for a
    /// new key. Use [`try_insert`](HashTable::try_insert) to handle a full
    /// table.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    ///
    /// let table = HashTable::new(16);
    /// table.insert(37, 1);
    /// table.insert(37, 2);
    /// assert_eq!(table.get(37), Some(2));
    /// assert_eq!(table.len(), 1);
    /// ```
    #[inline]
    pub fn insert(&self, key: u32, value: u32) {
        if let Err(err) = self.try_insert(key, value) {
            panic!("{err}");
        }
    }

    /// Inserts a key-value pair, returning an error if every slot of the table
    /// is taken by another key.
    ///
    /// Saturation is judged from the slots this call probed. A remove racing
    /// with the insert may free a slot the insert has already passed.
    ///
    /// # Panics
    ///
    /// Panics if `key` or `value` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    ///
    /// let table = HashTable::new(2);
    /// table.try_insert(1, 10).unwrap();
    /// table.try_insert(2, 20).unwrap();
    ///
    /// let err = table.try_insert(3, 30).unwrap_err();
    /// assert_eq!(err.capacity, 2);
    ///
    /// // Updates still succeed.
    /// assert!(table.try_insert(2, 21).is_ok());
    /// ```
    pub fn try_insert(&self, key: u32, value: u32) -> Result<(), TableFull> {
        assert_ne!(key, 0, "zero is not a valid key");
        assert_ne!(value, 0, "zero is not a valid value");

        match self.raw.insert(key, value) {
            InsertResult::Inserted | InsertResult::Updated => Ok(()),
            InsertResult::Full => Err(TableFull {
                capacity: self.capacity(),
            }),
        }
    }

    /// Removes `key` from the table.
    ///
    /// Returns `true` if this call removed the entry, and `false` if the key
    /// was absent or a concurrent remove got to it first. Entries further down
    /// the probe sequence are shifted back into the freed slot, so the table
    /// never accumulates tombstones.
    ///
    /// # Panics
    ///
    /// Panics if `key` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use backshift::HashTable;
    ///
    /// let table = HashTable::new(16);
    /// table.insert(1, 10);
    /// assert!(table.remove(1));
    /// assert!(!table.remove(1));
    /// assert_eq!(table.get(1), None);
    /// ```
    #[inline]
    pub fn remove(&self, key: u32) -> bool {
        assert_ne!(key, 0, "zero is not a valid key");
        self.raw.remove(key)
    }
}

impl<H> fmt::Debug for HashTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}

/// The error returned by [`HashTable::try_insert`] when no slot is free.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableFull {
    /// The capacity of the table.
    pub capacity: usize,
}

impl fmt::Display for TableFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hash table is full: all {} slots are taken",
            self.capacity
        )
    }
}

impl Error for TableFull {}
