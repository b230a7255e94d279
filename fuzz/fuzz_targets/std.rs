#![no_main]

use libfuzzer_sys::fuzz_target;

use arbitrary::Arbitrary;
use backshift::{HashTable, TableFull};
use std::collections::HashMap as StdHashMap;
use std::num::NonZeroU32;

// Small enough that random keys collide and fill the table.
const CAPACITY: usize = 64;

#[derive(Debug, Arbitrary)]
enum Operation<K, V> {
    Insert(K, V),
    Remove(K),
    Get(K),
    Contains(K),
    Clear,
    Len,
    IsEmpty,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    // Keys are drawn from a narrow range so operations hit the same clusters.
    operations: Vec<Operation<u8, NonZeroU32>>,
}

fn fuzz_table(input: FuzzInput) {
    let mut std_map = StdHashMap::new();
    let mut table = HashTable::new(CAPACITY);

    for op in input.operations {
        match op {
            Operation::Insert(k, v) => {
                let (k, v) = (u32::from(k) + 1, v.get());
                let table_result = table.try_insert(k, v);
                if std_map.len() < CAPACITY || std_map.contains_key(&k) {
                    std_map.insert(k, v);
                    assert_eq!(table_result, Ok(()));
                } else {
                    assert_eq!(table_result, Err(TableFull { capacity: CAPACITY }));
                }
            }
            Operation::Remove(k) => {
                let k = u32::from(k) + 1;
                let std_result = std_map.remove(&k).is_some();
                let table_result = table.remove(k);
                assert_eq!(std_result, table_result);
            }
            Operation::Get(k) => {
                let k = u32::from(k) + 1;
                let std_result = std_map.get(&k).copied();
                let table_result = table.get(k);
                assert_eq!(std_result, table_result);
            }
            Operation::Contains(k) => {
                let k = u32::from(k) + 1;
                let std_result = std_map.contains_key(&k);
                let table_result = table.contains_key(k);
                assert_eq!(std_result, table_result);
            }
            Operation::Clear => {
                std_map.clear();
                table.clear();
            }
            Operation::Len => {
                assert_eq!(std_map.len(), table.len());
            }
            Operation::IsEmpty => {
                assert_eq!(std_map.is_empty(), table.is_empty());
            }
        }
    }

    // Final consistency checks
    for (&k, &v) in std_map.iter() {
        assert_eq!(Some(v), table.get(k));
    }
    assert_eq!(std_map.len(), table.len());
    assert_eq!(std_map.is_empty(), table.is_empty());
}

fuzz_target!(|data: FuzzInput| {
    fuzz_table(data);
});
