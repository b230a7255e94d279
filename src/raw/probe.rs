// A linear probe sequence.
//
// Walks consecutive slots starting at a key's ideal index, wrapping at the end
// of the table. Every operation on the table visits at most `capacity` slots,
// so a saturated table is reported instead of probed forever.
#[derive(Clone, Copy, Debug)]
pub struct Probe {
    // The current index in the probe sequence.
    pub i: usize,
    // The number of slots visited so far.
    pub len: usize,
    // Mask for the length of the table.
    mask: usize,
}

impl Probe {
    // Initialize the probe sequence at the ideal index of `hash`.
    #[inline]
    pub fn start(hash: usize, len: usize) -> Probe {
        debug_assert!(len.is_power_of_two());

        Probe {
            i: hash & (len - 1),
            len: 0,
            mask: len - 1,
        }
    }

    // Returns `true` while the sequence has not yet covered the whole table.
    #[inline]
    pub fn in_bounds(&self) -> bool {
        self.len <= self.mask
    }

    // Increment the probe sequence.
    #[inline]
    pub fn next(&mut self) {
        self.len += 1;
        self.i = (self.i + 1) & self.mask;
    }
}

// Returns `true` if `k` lies in the cyclic interval `(i, j]` of the table.
//
// An entry stored at `j` whose ideal index is in this interval never probed
// through `i`, so it must not be moved into a hole at `i`.
#[inline]
pub fn between(i: usize, k: usize, j: usize) -> bool {
    if i <= j {
        i < k && k <= j
    } else {
        i < k || k <= j
    }
}
