use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub fn to_millis(duration: Duration) -> u64 {
    (duration.as_secs() * 1_000) + (duration.subsec_nanos() / 1_000_000) as u64
}

/// Locks a mutex, ignoring poisoning. All our critical sections only push finished results.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Splits `items` into at most `num_chunks` contiguous chunks of nearly equal size.
pub(crate) fn chunks_for<T>(items: &[T], num_chunks: usize) -> std::slice::Chunks<T> {
    let num_chunks = num_chunks.max(1);
    let chunk_size = ((items.len() + num_chunks - 1) / num_chunks).max(1);
    items.chunks(chunk_size)
}
