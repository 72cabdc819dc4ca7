use crate::engine::error::EngineError;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Computes `f(0..count)` in order on a pool of `threads` workers
/// (0 for all available). Runs serially without the `parallel` feature.
pub fn map_indexed<T, F>(count: usize, threads: usize, f: F) -> Result<Vec<T>, EngineError>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| EngineError::ThreadPool {
                threads,
                message: e.to_string(),
            })?;
        Ok(pool.install(|| (0..count).into_par_iter().map(&f).collect()))
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = threads;
        Ok((0..count).map(f).collect())
    }
}

/// Like [`map_indexed`] for fallible work; the first error in index order wins.
pub fn try_map_indexed<T, F>(count: usize, threads: usize, f: F) -> Result<Vec<T>, EngineError>
where
    T: Send,
    F: Fn(usize) -> Result<T, EngineError> + Sync + Send,
{
    map_indexed(count, threads, f)?.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_index_order() {
        let squares = map_indexed(50, 4, |i| i * i).unwrap();
        assert_eq!(squares, (0..50).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn single_thread_matches_pool_of_many() {
        let one = map_indexed(20, 1, |i| (i as f64).sqrt()).unwrap();
        let many = map_indexed(20, 0, |i| (i as f64).sqrt()).unwrap();
        assert_eq!(one, many);
    }

    #[test]
    fn first_error_is_returned() {
        let result: Result<Vec<usize>, _> = try_map_indexed(10, 2, |i| {
            if i >= 3 {
                Err(EngineError::Internal(format!("failed at {}", i)))
            } else {
                Ok(i)
            }
        });
        match result {
            Err(EngineError::Internal(message)) => assert_eq!(message, "failed at 3"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
