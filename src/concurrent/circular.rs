use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// A ring buffer that hands out prefix-sum offsets to concurrent producers in
/// ticket order, without a global lock.
///
/// Each producer obtains a ticket with [`next`](CircularPrefixSum::next), then
/// calls [`fetch_and_update`](CircularPrefixSum::fetch_and_update) with the
/// number of items it produced. The call spin-waits until the previous ticket
/// has published its running total, so the returned value is the exact prefix
/// sum over all earlier tickets.
///
/// The window must be strictly larger than the number of tickets in flight,
/// otherwise the producers deadlock waiting on a slot that is never written.
/// Relaxed ordering is sufficient: each slot is written by exactly one
/// producer and consumed by exactly one ordered successor.
pub struct CircularPrefixSum {
    counter: AtomicUsize,
    buffer: Vec<AtomicI64>,
}

// Marks a slot whose value has not been published yet.
const SENTINEL: i64 = i64::MAX;

impl CircularPrefixSum {
    /// Creates a prefix-sum window for at most `size` concurrent tickets.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "ticket window must not be empty");

        let buffer: Vec<AtomicI64> = (0..size + 1).map(|_| AtomicI64::new(SENTINEL)).collect();
        // The slot before ticket 0 seeds the running total with zero.
        buffer[size].store(0, Ordering::Relaxed);

        Self {
            counter: AtomicUsize::new(0),
            buffer,
        }
    }

    /// Returns the next ticket.
    pub fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Blocks until the predecessor of `ticket` has published its running
    /// total, publishes `total + delta` for `ticket` and returns `total`.
    pub fn fetch_and_update(&self, ticket: usize, delta: i64) -> i64 {
        let len = self.buffer.len();
        let pos = ticket % len;
        let prev_pos = if pos == 0 { len - 1 } else { pos - 1 };

        let mut value = self.buffer[prev_pos].load(Ordering::Relaxed);
        while value == SENTINEL {
            std::hint::spin_loop();
            value = self.buffer[prev_pos].load(Ordering::Relaxed);
        }

        debug_assert_ne!(value + delta, SENTINEL);
        self.buffer[prev_pos].store(SENTINEL, Ordering::Relaxed);
        self.buffer[pos].store(value + delta, Ordering::Relaxed);

        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_sequential_prefix_sum() {
        let sums = CircularPrefixSum::new(4);
        let deltas = [3_i64, 1, 4, 1, 5, 9, 2, 6];

        let mut expected = 0;
        for &delta in &deltas {
            let ticket = sums.next();
            assert_eq!(sums.fetch_and_update(ticket, delta), expected);
            expected += delta;
        }
    }

    #[test]
    fn test_window_wraps_around() {
        let sums = CircularPrefixSum::new(2);

        for ticket in 0..10 {
            assert_eq!(sums.next(), ticket);
            assert_eq!(sums.fetch_and_update(ticket, 2), 2 * ticket as i64);
        }
    }

    #[test]
    fn test_concurrent_offsets_are_disjoint() {
        let threads = rayon::current_num_threads();
        let sums = CircularPrefixSum::new(threads.next_power_of_two());

        // Every task claims a range of length `delta`; the ranges must tile
        // [0, tasks * delta) without overlap.
        let delta = 7_i64;
        let tasks = 64;
        let mut offsets: Vec<i64> = (0..tasks)
            .into_par_iter()
            .with_max_len(1)
            .map(|_| {
                let ticket = sums.next();
                sums.fetch_and_update(ticket, delta)
            })
            .collect();

        offsets.sort_unstable();
        for (i, offset) in offsets.into_iter().enumerate() {
            assert_eq!(offset, i as i64 * delta);
        }
    }
}
