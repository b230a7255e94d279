#![doc = include_str!("../README.md")]

mod hash;
mod raw;
mod table;

pub use hash::{Avalanche, KeyHasher};
pub use table::{HashTable, HashTableBuilder, TableFull};
