use std::sync::{
    atomic::{AtomicIsize, AtomicUsize, Ordering},
    OnceLock,
};

use super::CachePadded;

// A sharded atomic counter.
//
// Tracks the number of occupied slots without making a single cache line the
// point of contention for every insert and remove.
pub struct Counter(Box<[CachePadded<AtomicIsize>]>);

impl Default for Counter {
    /// Create a new `Counter`.
    fn default() -> Counter {
        // available_parallelism is quite slow (microseconds).
        static CPUS: OnceLock<usize> = OnceLock::new();
        let num_cpus = *CPUS.get_or_init(|| {
            std::thread::available_parallelism()
                .map(Into::into)
                .unwrap_or(1)
        });

        // Round up to the next power-of-two for fast modulo.
        let shards = (0..num_cpus.next_power_of_two())
            .map(|_| Default::default())
            .collect();

        Counter(shards)
    }
}

impl Counter {
    // Return the shard for the current thread.
    #[inline]
    pub fn get(&self) -> &AtomicIsize {
        let shard = thread_id() & (self.0.len() - 1);
        &self.0[shard].value
    }

    // Returns the sum of all counter shards.
    #[inline]
    pub fn sum(&self) -> usize {
        self.0
            .iter()
            .map(|x| x.value.load(Ordering::Relaxed))
            .sum::<isize>()
            .try_into()
            // A remove can land on a different shard than the insert it undoes,
            // in which case the sum may briefly be negative.
            .unwrap_or(0)
    }

    // Zero every shard.
    pub fn reset(&mut self) {
        for shard in self.0.iter_mut() {
            *shard.value.get_mut() = 0;
        }
    }
}

// Returns a small, stable identifier for the calling thread.
//
// Identifiers are handed out sequentially, so threads spread evenly over the
// shards as long as there are no more threads than shards.
#[inline]
fn thread_id() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(0);

    thread_local! {
        static ID: usize = NEXT.fetch_add(1, Ordering::Relaxed);
    }

    ID.with(|id| *id)
}
