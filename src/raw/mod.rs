mod probe;
mod utils;

use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use self::probe::{between, Probe};
use self::utils::{CachePadded, Counter};
use crate::hash::KeyHasher;

// The key of an empty slot.
//
// Zero is never a valid key, and a value of zero is never stored by a completed
// insert, so it doubles as the "absent" marker for both fields.
const EMPTY: u32 = 0;

// Every access to a slot is sequentially consistent.
//
// Inserts and moves both follow a "store then re-check the key" handshake with
// the thread clearing the slot, which acquire/release cannot order.
const ORDER: Ordering = Ordering::SeqCst;

// A fixed-capacity, lock-free hash table.
pub struct HashTable<H> {
    slots: Box<[Slot]>,
    count: Counter,
    // The number of compactions that have started and finished. Whenever the
    // two are equal, no entry is being shifted.
    started: CachePadded<AtomicUsize>,
    finished: CachePadded<AtomicUsize>,
    hasher: H,
}

// A slot in the table.
#[derive(Default)]
struct Slot {
    key: AtomicU32,
    value: AtomicU32,
}

// The result of an insert operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertResult {
    // The key was claimed in a previously empty slot.
    Inserted,
    // The key was already present and its value was overwritten.
    Updated,
    // Every slot was probed without finding the key or an empty slot.
    Full,
}

// An entry that was just copied into `slot` and whose source has not been
// cleared yet.
#[derive(Clone, Copy)]
struct Copied {
    slot: usize,
    value: u32,
}

impl<H> HashTable<H> {
    // Allocates a table of `capacity` empty slots.
    pub fn new(capacity: usize, hasher: H) -> HashTable<H> {
        assert!(
            capacity.is_power_of_two(),
            "capacity must be a power of two, found {capacity}"
        );

        HashTable {
            slots: (0..capacity).map(|_| Slot::default()).collect(),
            count: Counter::default(),
            started: CachePadded::default(),
            finished: CachePadded::default(),
            hasher,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count.sum()
    }

    #[inline]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    // Empties every slot.
    //
    // Exclusive access means no other operation can observe the slots, so the
    // atomics are written directly.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.key.get_mut() = EMPTY;
            *slot.value.get_mut() = 0;
        }

        self.count.reset();
    }

    // Writes the key of every slot in index order, `0` for empty slots.
    pub fn dump(&self, f: &mut impl Write) -> fmt::Result {
        for slot in self.slots.iter() {
            write!(f, "{}|", slot.key.load(ORDER))?;
        }

        Ok(())
    }
}

impl<H> HashTable<H>
where
    H: KeyHasher,
{
    // Returns a probe sequence starting at the ideal slot of `key`.
    #[inline]
    fn probe(&self, key: u32) -> Probe {
        Probe::start(self.hasher.hash(key) as usize, self.slots.len())
    }

    // Returns the ideal slot of `key`.
    #[inline]
    fn ideal(&self, key: u32) -> usize {
        self.probe(key).i
    }

    pub fn get(&self, key: u32) -> Option<u32> {
        let mut probe = self.probe(key);

        while probe.in_bounds() {
            let slot = &self.slots[probe.i];

            match slot.key.load(ORDER) {
                found if found == key => {
                    // A zero value means the insert that claimed this slot
                    // has not written its value yet.
                    let value = slot.value.load(ORDER);
                    return (value != 0).then_some(value);
                }

                // Every key is reachable from its ideal slot without crossing
                // an empty slot, so the key is not in the table.
                EMPTY => return None,

                _ => probe.next(),
            }
        }

        // Probed the entire table.
        None
    }

    pub fn insert(&self, key: u32, value: u32) -> InsertResult {
        let mut claimed = false;

        'probe: loop {
            let mut probe = self.probe(key);

            while probe.in_bounds() {
                let slot = &self.slots[probe.i];
                let found = slot.key.load(ORDER);

                if found == EMPTY {
                    if slot
                        .key
                        .compare_exchange(EMPTY, key, ORDER, ORDER)
                        .is_err()
                    {
                        // Lost the slot to another thread. Look at it again,
                        // the winner may have inserted our key.
                        continue;
                    }

                    claimed = true;
                    self.count.get().fetch_add(1, Ordering::Relaxed);
                } else if found != key {
                    // The slot holds another key, keep probing.
                    probe.next();
                    continue;
                }

                slot.value.store(value, ORDER);

                // The entry was shifted to another slot before our write
                // landed. Find it again and write there instead.
                if slot.key.load(ORDER) != key {
                    continue 'probe;
                }

                if !claimed {
                    return InsertResult::Updated;
                }

                if found == EMPTY {
                    self.settle(key, probe.i, Some(value));
                }

                return InsertResult::Inserted;
            }

            return InsertResult::Full;
        }
    }

    // Removes `key`, returning `true` if this call cleared its slot.
    pub fn remove(&self, key: u32) -> bool {
        'probe: loop {
            let finished = self.finished.value.load(ORDER);
            let mut probe = self.probe(key);

            while probe.in_bounds() {
                match self.slots[probe.i].key.load(ORDER) {
                    found if found == key => {
                        if self.backshift(probe.i, key, None) {
                            self.count.get().fetch_sub(1, Ordering::Relaxed);
                            return true;
                        }

                        // The entry was shifted back or removed under us.
                        continue 'probe;
                    }
                    EMPTY => break,
                    _ => probe.next(),
                }
            }

            // A compaction that overlapped the probe may have shifted the key
            // back into a slot the probe had already passed. The miss is only
            // final if none was running at any point during the probe.
            if self.started.value.load(ORDER) != finished {
                continue 'probe;
            }

            return false;
        }
    }

    // Clears `key` from slot `i`, then closes the gap by shifting back later
    // entries whose probe path crosses it.
    //
    // `copied` is set when the clear completes a move of `key` into another
    // slot. Returns `true` if `key` was cleared from `i`.
    fn backshift(&self, i: usize, key: u32, copied: Option<Copied>) -> bool {
        self.started.value.fetch_add(1, ORDER);
        let cleared = self.compact(i, key, copied);
        self.finished.value.fetch_add(1, ORDER);
        cleared
    }

    fn compact(&self, mut i: usize, mut key: u32, mut copied: Option<Copied>) -> bool {
        let mut first = true;

        loop {
            let slot = &self.slots[i];

            if slot
                .key
                .compare_exchange(key, EMPTY, ORDER, ORDER)
                .is_err()
            {
                match copied.take() {
                    // The source of our move was shifted or removed by another
                    // thread. Our copy is a duplicate, clear that instead.
                    Some(copy) => {
                        first = false;
                        i = copy.slot;
                        continue;
                    }

                    // Another thread got to this slot first.
                    None => return !first,
                }
            }

            first = false;

            if let Some(copy) = copied.take() {
                self.finish_move(slot, key, copy);
            }

            // Look for an entry that can be moved back into the hole.
            let mut scan = Probe::start(i, self.slots.len());
            scan.next();

            let candidate = loop {
                if !scan.in_bounds() {
                    break None;
                }

                let found = self.slots[scan.i].key.load(ORDER);

                // Nothing beyond an empty slot can have probed through the hole.
                if found == EMPTY {
                    break None;
                }

                // The entry's ideal slot lies between the hole and the entry,
                // so its probe path never crossed the hole.
                if between(i, self.ideal(found), scan.i) {
                    scan.next();
                    continue;
                }

                break Some((scan.i, found));
            };

            let Some((j, moving)) = candidate else {
                return true;
            };

            // If an insert filled the hole first, there is no gap left to close.
            let Some(copy) = self.claim_copy(i, moving, j) else {
                return true;
            };

            copied = Some(copy);
            key = moving;
            i = j;
        }
    }

    // Claims the empty slot `to` for `key` and copies over the value stored in
    // slot `from`. Returns `None` if another thread claimed `to` first.
    fn claim_copy(&self, to: usize, key: u32, from: usize) -> Option<Copied> {
        let slot = &self.slots[to];

        let stale = slot.value.load(ORDER);
        slot.key.compare_exchange(EMPTY, key, ORDER, ORDER).ok()?;

        // The insert of `key` may already have written its value through to
        // this slot (see `settle`), which takes precedence over the copy.
        let value = self.slots[from].value.load(ORDER);
        let _ = slot.value.compare_exchange(stale, value, ORDER, ORDER);

        Some(Copied { slot: to, value })
    }

    // Completes a move of `key` into `copy.slot`, after its old slot `from`
    // was cleared.
    fn finish_move(&self, from: &Slot, key: u32, copy: Copied) {
        let dest = &self.slots[copy.slot];

        // An update may have landed on the old slot after the value was
        // copied. Carry it over unless the old slot was already reclaimed.
        let value = from.value.load(ORDER);
        if value != copy.value
            && from.key.load(ORDER) == EMPTY
            && dest.key.load(ORDER) == key
        {
            let _ = dest
                .value
                .compare_exchange(copy.value, value, ORDER, ORDER);
        }

        self.settle(key, copy.slot, None);
    }

    // Ensures no empty slot splits the probe path of `key`, which was just
    // placed in slot `at`.
    //
    // A concurrent remove may have left a hole behind `at` after its scan
    // stopped short of it. In that case the entry is moved into the hole.
    // `inserted` is the value written by the insert that placed the entry, if
    // the entry was not placed by a move.
    fn settle(&self, key: u32, at: usize, inserted: Option<u32>) {
        let mut probe = self.probe(key);

        while probe.in_bounds() && probe.i != at {
            let slot = &self.slots[probe.i];

            match slot.key.load(ORDER) {
                EMPTY => {
                    let Some(copy) = self.claim_copy(probe.i, key, at) else {
                        continue;
                    };

                    self.backshift(at, key, Some(copy));
                    return;
                }

                // An earlier copy of the key. Either a concurrent insert of the
                // same key, or a move of this entry that has not cleared `at`
                // yet. The move will clear `at`, so the copy must carry the
                // value of the insert as well.
                found if found == key => {
                    if let Some(value) = inserted {
                        slot.value.store(value, ORDER);
                    }

                    return;
                }

                _ => probe.next(),
            }
        }
    }
}

impl<H> fmt::Debug for HashTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Avalanche;

    // Sends every key to slot `key % capacity`.
    struct Identity;

    impl KeyHasher for Identity {
        fn hash(&self, key: u32) -> u32 {
            key
        }
    }

    fn keys<H>(table: &HashTable<H>) -> Vec<u32> {
        table.slots.iter().map(|slot| slot.key.load(ORDER)).collect()
    }

    // Asserts that every key is reachable from its ideal slot and stored once.
    fn check<H: KeyHasher>(table: &HashTable<H>) {
        let keys = keys(table);
        let mask = keys.len() - 1;

        for (at, &key) in keys.iter().enumerate() {
            if key == EMPTY {
                continue;
            }

            let mut i = table.ideal(key);
            while i != at {
                assert_ne!(keys[i], EMPTY, "empty slot {i} splits the path of {key} at {at}");
                assert_ne!(keys[i], key, "{key} is stored at {i} and {at}");
                i = (i + 1) & mask;
            }
        }
    }

    #[test]
    fn claims_the_ideal_slot() {
        let table = HashTable::new(8, Identity);
        assert_eq!(table.insert(3, 30), InsertResult::Inserted);
        assert_eq!(keys(&table), [0, 0, 0, 3, 0, 0, 0, 0]);
        assert_eq!(table.slots[3].value.load(ORDER), 30);
    }

    #[test]
    fn update_in_place() {
        let table = HashTable::new(8, Identity);
        assert_eq!(table.insert(3, 30), InsertResult::Inserted);
        assert_eq!(table.insert(3, 31), InsertResult::Updated);
        assert_eq!(keys(&table), [0, 0, 0, 3, 0, 0, 0, 0]);
        assert_eq!(table.get(3), Some(31));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn collisions_probe_forward() {
        let table = HashTable::new(8, Identity);
        table.insert(7, 70);
        table.insert(15, 150);
        table.insert(23, 230);
        assert_eq!(keys(&table), [15, 23, 0, 0, 0, 0, 0, 7]);
        assert_eq!(table.get(23), Some(230));
        assert_eq!(table.get(31), None);
        check(&table);
    }

    #[test]
    fn remove_shifts_collisions_back() {
        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        table.insert(9, 90);
        table.insert(17, 170);
        table.insert(2, 20);
        assert_eq!(keys(&table), [0, 1, 9, 17, 2, 0, 0, 0]);

        assert!(table.remove(1));
        // 9 and 17 shift back, 2 follows into the slot 17 vacated.
        assert_eq!(keys(&table), [0, 9, 17, 2, 0, 0, 0, 0]);
        assert_eq!(table.get(9), Some(90));
        assert_eq!(table.get(17), Some(170));
        assert_eq!(table.get(2), Some(20));
        assert_eq!(table.len(), 3);
        check(&table);
    }

    #[test]
    fn remove_keeps_entries_at_home() {
        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        table.insert(9, 90);
        table.insert(3, 30);
        assert_eq!(keys(&table), [0, 1, 9, 3, 0, 0, 0, 0]);

        assert!(table.remove(1));
        // 3 sits in its ideal slot, so it stays put.
        assert_eq!(keys(&table), [0, 9, 0, 3, 0, 0, 0, 0]);
        check(&table);
    }

    #[test]
    fn remove_past_the_ideal_slot() {
        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        table.insert(9, 90);

        // 9 is not in its ideal slot, and removing it must leave 1 alone.
        assert!(table.remove(9));
        assert_eq!(keys(&table), [0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(table.get(1), Some(10));
        assert_eq!(table.get(9), None);
    }

    #[test]
    fn remove_wraps_around() {
        let table = HashTable::new(8, Identity);
        table.insert(6, 60);
        table.insert(14, 140);
        table.insert(22, 220);
        table.insert(30, 300);
        assert_eq!(keys(&table), [22, 30, 0, 0, 0, 0, 6, 14]);

        assert!(table.remove(6));
        assert_eq!(keys(&table), [30, 0, 0, 0, 0, 0, 14, 22]);
        assert_eq!(table.get(30), Some(300));
        check(&table);
    }

    #[test]
    fn remove_missing() {
        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        assert!(!table.remove(9));
        assert!(!table.remove(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_outlasts_an_overlapping_shift() {
        use std::thread;
        use std::time::Duration;

        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        table.insert(9, 90);
        table.insert(17, 170);
        assert_eq!(keys(&table), [0, 1, 9, 17, 0, 0, 0, 0]);

        // Another remove cleared 9 and has not shifted 17 back yet. The empty
        // slot 2 hides 17 from a probe that starts now.
        table.started.value.fetch_add(1, ORDER);
        table.slots[2].key.store(EMPTY, ORDER);
        table.count.get().fetch_sub(1, Ordering::Relaxed);

        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                table.slots[3].key.store(EMPTY, ORDER);
                table.slots[2].value.store(170, ORDER);
                table.slots[2].key.store(17, ORDER);
                table.finished.value.fetch_add(1, ORDER);
            });

            assert!(table.remove(17));
        });

        assert_eq!(keys(&table), [0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(table.get(17), None);
        assert_eq!(table.len(), 1);
        check(&table);
    }

    #[test]
    fn full_table() {
        let table = HashTable::new(4, Identity);
        for key in 1..=4 {
            assert_eq!(table.insert(key, key), InsertResult::Inserted);
        }

        assert_eq!(table.insert(5, 5), InsertResult::Full);
        assert_eq!(table.insert(4, 40), InsertResult::Updated);

        // Probes over a full table still terminate.
        assert_eq!(table.get(8), None);
        assert!(!table.remove(8));

        assert!(table.remove(4));
        assert_eq!(table.insert(8, 80), InsertResult::Inserted);
        assert_eq!(table.get(8), Some(80));
        check(&table);
    }

    #[test]
    fn settle_fills_a_hole_behind_the_entry() {
        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        table.insert(9, 90);

        // Simulate a remove that cleared slot 1 and stopped before 9.
        table.slots[1].key.store(EMPTY, ORDER);
        table.settle(9, 2, None);

        assert_eq!(keys(&table), [0, 9, 0, 0, 0, 0, 0, 0]);
        assert_eq!(table.get(9), Some(90));
    }

    #[test]
    fn settle_writes_through_to_an_earlier_copy() {
        let table = HashTable::new(8, Identity);
        table.insert(1, 10);
        table.insert(9, 90);

        // A move of 9 from slot 3 into slot 2 that has not cleared slot 3 yet.
        table.slots[3].key.store(9, ORDER);
        table.slots[3].value.store(91, ORDER);
        table.settle(9, 3, Some(91));

        assert_eq!(keys(&table), [0, 1, 9, 9, 0, 0, 0, 0]);
        assert_eq!(table.get(9), Some(91));

        // The move completes.
        assert!(table.backshift(3, 9, None));
        assert_eq!(keys(&table), [0, 1, 9, 0, 0, 0, 0, 0]);
        assert_eq!(table.get(9), Some(91));
    }

    #[test]
    fn clear_resets_everything() {
        let mut table = HashTable::new(16, Avalanche);
        for key in 1..=8 {
            table.insert(key, key * 10);
        }
        assert_eq!(table.len(), 8);

        table.clear();
        assert_eq!(table.len(), 0);
        assert!(keys(&table).iter().all(|&key| key == EMPTY));
        assert!(table.slots.iter().all(|slot| slot.value.load(ORDER) == 0));
        for key in 1..=8 {
            assert_eq!(table.get(key), None);
        }
    }

    #[test]
    fn random_operations_keep_paths_intact() {
        use rand::prelude::*;

        let mut rng = rand::thread_rng();
        let table = HashTable::new(64, Avalanche);
        let mut model = std::collections::HashMap::new();

        for _ in 0..10_000 {
            let key = rng.gen_range(1..=96);
            if rng.gen_bool(0.5) && (model.len() < 48 || model.contains_key(&key)) {
                let value = rng.gen_range(1..=u32::MAX);
                table.insert(key, value);
                model.insert(key, value);
            } else {
                assert_eq!(table.remove(key), model.remove(&key).is_some());
            }

            check(&table);
        }

        for key in 1..=96 {
            assert_eq!(table.get(key), model.get(&key).copied());
        }
        assert_eq!(table.len(), model.len());
    }

    #[test]
    #[should_panic]
    fn capacity_must_be_a_power_of_two() {
        let _ = HashTable::new(12, Avalanche);
    }
}
