//! Counter events emitted by the core (§6 "Counter events emitted"). These
//! are plain atomics updated on the hot path with no lock; a
//! `(host, database)`-keyed process-wide registry hands out a shared
//! `Counters` instance, constructed idempotently on first use -- the usual
//! metrics-by-label pattern for a registry with no external exporter wired
//! in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Socket-level byte/ call instrumentation, tracked once per channel and
/// folded into the shared registry entry for its `(host, database)`.
#[derive(Default)]
pub struct IoCounters {
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub read_count: AtomicU64,
    pub write_count: AtomicU64,
    pub max_single_read: AtomicUsize,
    pub max_single_write: AtomicUsize,
}

impl IoCounters {
    pub fn record_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.max_single_read.fetch_max(n, Ordering::Relaxed);
    }

    pub fn record_write(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.max_single_write.fetch_max(n, Ordering::Relaxed);
    }
}

/// One counter per error kind named in §7.
#[derive(Default)]
pub struct ErrorCounters {
    pub mysql_error: AtomicU64,
    pub illegal_state: AtomicU64,
    pub timeout: AtomicU64,
    pub invalid_parameter: AtomicU64,
    pub result_set_error: AtomicU64,
    pub unexpected_error: AtomicU64,
    pub slow_execution: AtomicU64,
    pub duplicate_entry_for_key: AtomicU64,
}

impl ErrorCounters {
    pub fn record(&self, error: &crate::error::Error) {
        use crate::error::Error::*;
        let counter = match error {
            MysqlError { .. } => &self.mysql_error,
            IllegalState(_) => &self.illegal_state,
            Timeout => &self.timeout,
            InvalidParameter(_) => &self.invalid_parameter,
            ResultSetError(_) => &self.result_set_error,
            UnexpectedError(_) => &self.unexpected_error,
            SlowExecution => &self.slow_execution,
            DuplicateEntryForKey { .. } => &self.duplicate_entry_for_key,
            UnsupportedFeature(_) | Io(_) | UrlParse(_) => &self.unexpected_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Row counts broken down by SQL shape, plus the per-call maximum for each
/// shape (the largest single result/affected-rows seen for that shape).
#[derive(Default)]
pub struct RowCounters {
    pub select_rows: AtomicU64,
    pub select_max: AtomicU64,
    pub insert_rows: AtomicU64,
    pub insert_max: AtomicU64,
    pub update_rows: AtomicU64,
    pub update_max: AtomicU64,
    pub delete_rows: AtomicU64,
    pub delete_max: AtomicU64,
}

/// The SQL shape a `QueryCommand` was classified as, used only for the row
/// counters above -- never to alter protocol behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlShape {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl SqlShape {
    pub fn classify(sql: &str) -> Self {
        let trimmed = sql.trim_start();
        let head: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .flat_map(|c| c.to_ascii_uppercase())
            .collect();
        match head.as_str() {
            "SELECT" => SqlShape::Select,
            "INSERT" => SqlShape::Insert,
            "UPDATE" => SqlShape::Update,
            "DELETE" => SqlShape::Delete,
            _ => SqlShape::Other,
        }
    }
}

impl RowCounters {
    pub fn record(&self, shape: SqlShape, rows: u64) {
        let (count, max) = match shape {
            SqlShape::Select => (&self.select_rows, &self.select_max),
            SqlShape::Insert => (&self.insert_rows, &self.insert_max),
            SqlShape::Update => (&self.update_rows, &self.update_max),
            SqlShape::Delete => (&self.delete_rows, &self.delete_max),
            SqlShape::Other => return,
        };
        count.fetch_add(rows, Ordering::Relaxed);
        max.fetch_max(rows, Ordering::Relaxed);
    }
}

/// Pool-level gauges: how many leases are outstanding, the high-water mark,
/// how many leaks were force-reclaimed, and how many acquires failed.
#[derive(Default)]
pub struct PoolCounters {
    pub acquired: AtomicUsize,
    pub max_acquired: AtomicUsize,
    pub leak_count: AtomicU64,
    pub acquire_failed: AtomicU64,
}

impl PoolCounters {
    pub fn on_acquire(&self) {
        let now = self.acquired.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_acquired.fetch_max(now, Ordering::Relaxed);
    }

    pub fn on_release(&self) {
        self.acquired.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn on_leak(&self) {
        self.leak_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_acquire_failed(&self) {
        self.acquire_failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// The full bundle of counters for one `(host, database)` pair.
#[derive(Default)]
pub struct Counters {
    pub io: IoCounters,
    pub errors: ErrorCounters,
    pub rows: RowCounters,
    pub pool: PoolCounters,
}

type Registry = Mutex<HashMap<(String, String), Arc<Counters>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Look up (or idempotently construct) the shared counters bundle for a
/// `(host, database)` pair. Never torn down except at process exit.
pub fn counters_for(host: &str, database: &str) -> Arc<Counters> {
    let key = (host.to_owned(), database.to_owned());
    let mut map = registry().lock().unwrap_or_else(|e| e.into_inner());
    map.entry(key).or_insert_with(|| Arc::new(Counters::default())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_for_same_key_are_the_same_instance() {
        let a = counters_for("localhost:3306", "app");
        let b = counters_for("localhost:3306", "app");
        a.pool.on_acquire();
        assert_eq!(b.pool.acquired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn sql_shape_classifies_leading_keyword() {
        assert_eq!(SqlShape::classify("  select 1"), SqlShape::Select);
        assert_eq!(SqlShape::classify("INSERT INTO t"), SqlShape::Insert);
        assert_eq!(SqlShape::classify("update t set x=1"), SqlShape::Update);
        assert_eq!(SqlShape::classify("DELETE FROM t"), SqlShape::Delete);
        assert_eq!(SqlShape::classify("SHOW TABLES"), SqlShape::Other);
    }
}
