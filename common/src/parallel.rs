//! Parallel iteration helpers built on rayon.
//!
//! `par_map_limited` keeps at most `max_concurrent` items in flight, which
//! caps how many frame windows are resident at once in batch jobs.

use rayon::prelude::*;

/// Multiplier for number of chunks relative to CPU threads.
const CHUNKS_PER_THREAD: usize = 2;

/// Rows per chunk so that an image of `height` rows splits into roughly
/// `threads * 2` chunks. Never less than 1.
#[inline]
pub fn rows_per_chunk(height: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (height / num_chunks).max(1)
}

/// Fills `data` row by row in parallel; `f(y, row)` writes row `y`.
pub fn par_rows_mut<T, F>(data: &mut [T], width: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if data.is_empty() || width == 0 {
        return;
    }

    let height = data.len() / width;
    let rows = rows_per_chunk(height);

    data.par_chunks_mut(width * rows)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let y_start = chunk_idx * rows;
            for (local_y, row) in chunk.chunks_mut(width).enumerate() {
                f(y_start + local_y, row);
            }
        });
}

/// Maps `f` over `items` in parallel, with at most `max_concurrent` items in flight.
///
/// Same result as `items.par_iter().map(f).collect()`, in input order.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited<T, R, F>(items: &[T], max_concurrent: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(max_concurrent) {
        let chunk_results: Vec<R> = chunk.par_iter().map(&f).collect();
        results.extend(chunk_results);
    }
    results
}
