/// A function mapping a key to the hash that selects its ideal slot.
///
/// The table masks the hash with `capacity - 1`, so only the low bits matter.
/// Under linear probing, keys that land in neighbouring slots form clusters,
/// so implementations should mix every input bit into the low bits of the
/// output. The default, [`Avalanche`], does exactly that.
///
/// A custom hasher is mostly useful to force collisions in tests.
///
/// # Examples
///
/// ```
/// use backshift::{HashTable, KeyHasher};
///
/// // Sends every key to slot `key % capacity`.
/// struct Identity;
///
/// impl KeyHasher for Identity {
///     fn hash(&self, key: u32) -> u32 {
///         key
///     }
/// }
///
/// let table = HashTable::with_hasher(8, Identity);
/// table.insert(1, 10);
/// table.insert(9, 90);
/// assert_eq!(table.dump(), "0|1|9|0|0|0|0|0|");
/// ```
pub trait KeyHasher {
    /// Hashes a non-zero key.
    fn hash(&self, key: u32) -> u32;
}

impl<H: KeyHasher + ?Sized> KeyHasher for &H {
    #[inline]
    fn hash(&self, key: u32) -> u32 {
        (**self).hash(key)
    }
}

/// The 32-bit finalizer of MurmurHash3.
///
/// Alternating xor-shift and multiply rounds make keys that differ by a small
/// delta land in uncorrelated slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Avalanche;

impl KeyHasher for Avalanche {
    #[inline]
    fn hash(&self, key: u32) -> u32 {
        let mut h = key;
        h ^= h >> 16;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 13;
        h = h.wrapping_mul(0xc2b2_ae35);
        h ^= h >> 16;
        h
    }
}
