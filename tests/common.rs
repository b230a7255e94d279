#![allow(dead_code)]

use backshift::{Avalanche, HashTable, KeyHasher};

// The hashers tests are run with.
#[derive(Clone, Copy, Debug)]
pub enum Hasher {
    // The default avalanche hasher.
    Avalanche,
    // Sends groups of four consecutive keys to the same ideal slot, forcing
    // collisions and long shifts on removal.
    Grouped,
    // The key itself: sequential keys fill sequential slots.
    Identity,
}

impl KeyHasher for Hasher {
    fn hash(&self, key: u32) -> u32 {
        match self {
            Hasher::Avalanche => Avalanche.hash(key),
            Hasher::Grouped => Avalanche.hash(key >> 2),
            Hasher::Identity => key,
        }
    }
}

// Run the test on tables with different hashers.
pub fn with_table(mut test: impl FnMut(&dyn Fn(usize) -> HashTable<Hasher>)) {
    test(&(|capacity| HashTable::with_hasher(capacity, Hasher::Avalanche)));

    // Heavy collisions.
    test(&(|capacity| HashTable::with_hasher(capacity, Hasher::Grouped)));

    // Long runs of entries in their ideal slots.
    if !cfg!(backshift_stress) {
        test(&(|capacity| HashTable::with_hasher(capacity, Hasher::Identity)));
    }
}

// Returns the key stored in every slot, as reported by `HashTable::dump`.
pub fn slots<H>(table: &HashTable<H>) -> Vec<u32> {
    table
        .dump()
        .split_terminator('|')
        .map(|key| key.parse().unwrap())
        .collect()
}

// Asserts that every key is stored once, and reachable from its ideal slot
// without crossing an empty slot.
pub fn check_paths<H: KeyHasher>(table: &HashTable<H>) {
    let slots = slots(table);
    let mask = slots.len() - 1;

    for (at, &key) in slots.iter().enumerate() {
        if key == 0 {
            continue;
        }

        let mut i = table.hasher().hash(key) as usize & mask;
        while i != at {
            assert_ne!(slots[i], 0, "empty slot {i} splits the path of {key} at {at}");
            assert_ne!(slots[i], key, "{key} is stored at both {i} and {at}");
            i = (i + 1) & mask;
        }
    }
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two().clamp(2, 8)
    }
}
