use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;

/// Bounded worker pool for inventory requests.
///
/// One pool is created per run and shared by every fan-out, so at most `workers()` requests are in
/// flight across sensors.
#[derive(Debug)]
pub struct FetchPool {
    pool: ThreadPool,
}

impl FetchPool {
    pub fn new(workers: NonZeroUsize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.get())
            .thread_name(|i| format!("inventory-fetch-{}", i))
            .build()?;
        Ok(FetchPool { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `fetch` for every id on the pool. Results come back in input order.
    pub fn map<T, F>(&self, ids: &[String], fetch: F) -> Vec<(String, T)>
    where
        T: Send,
        F: Fn(&str) -> T + Sync + Send,
    {
        if ids.is_empty() {
            return Vec::new();
        }
        self.pool
            .install(|| ids.par_iter().map(|id| (id.clone(), fetch(id))).collect())
    }
}

/// Pretty-print `value` as JSON into `path`, replacing the file.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn pool(workers: usize) -> FetchPool {
        FetchPool::new(NonZeroUsize::new(workers).unwrap()).unwrap()
    }

    #[test]
    fn pool_bounds_concurrent_requests() {
        let pool = pool(3);
        assert_eq!(pool.workers(), 3);
        let ids: Vec<String> = (0..12).map(|i| i.to_string()).collect();
        let current = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = pool.map(&ids, |id| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            current.fetch_sub(1, Ordering::SeqCst);
            id.len()
        });

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(current.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_input_never_touches_the_pool() {
        let results: Vec<(String, ())> = pool(1).map(&[], |_| panic!("called"));
        assert!(results.is_empty());
    }

    #[test]
    fn json_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_json_file(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
