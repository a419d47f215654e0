//! Stress tests for units of work.
//!
//! These runs commit many units of work against one store, sequentially
//! and from several threads.

use crate::fixtures::{AuditLog, TestStore, Wallet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use unitwork_core::entity::{shared, EntityRef};
use unitwork_core::{Config, CoreError, UnitOfWork, UnitOfWorkManager};
use unitwork_store::MemoryStore;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Units of work attempted.
    pub total_units: usize,
    /// Units that committed.
    pub committed: usize,
    /// Units that failed or were rolled back.
    pub failed: usize,
    /// Total duration.
    pub duration: Duration,
    /// Units per second.
    pub units_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(committed: usize, failed: usize, duration: Duration) -> Self {
        let total = committed + failed;
        let units_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_units: total,
            committed,
            failed,
            duration,
            units_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Units: {}", self.total_units);
        println!("Committed: {}", self.committed);
        println!("Failed: {}", self.failed);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} units/sec", self.units_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Units of work to commit.
    pub units: usize,
    /// Entities registered in each unit.
    pub entities_per_unit: usize,
    /// Threads for concurrent runs.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            units: 1_000,
            entities_per_unit: 10,
            threads: 4,
        }
    }
}

fn commit_logs(uow: &UnitOfWork, count: usize, tag: usize) -> Result<(), CoreError> {
    for i in 0..count {
        uow.register_new(EntityRef::new(AuditLog::new(&format!("unit {tag} entry {i}"))))?;
    }
    uow.commit()
}

/// Commits `config.units` units of work one after another.
pub fn stress_sequential_commits(store: &TestStore, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut committed = 0usize;
    let mut failed = 0usize;

    for unit in 0..config.units {
        match commit_logs(&store.uow(), config.entities_per_unit, unit) {
            Ok(()) => committed += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(committed, failed, start.elapsed())
}

/// Commits units of work from `config.threads` threads sharing one store.
pub fn stress_concurrent_commits(store: Arc<MemoryStore>, config: &StressConfig) -> StressTestResult {
    let committed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let units_per_thread = config.units / config.threads.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let committed = Arc::clone(&committed);
            let failed = Arc::clone(&failed);
            let per_unit = config.entities_per_unit;

            thread::spawn(move || {
                for i in 0..units_per_thread {
                    let uow = UnitOfWork::new(store.clone(), Config::default());
                    match commit_logs(&uow, per_unit, t * units_per_thread + i) {
                        Ok(()) => {
                            committed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        committed.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Runs units through a manager, failing every other closure on purpose.
pub fn stress_closure_failures(manager: &UnitOfWorkManager, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut committed = 0usize;
    let mut failed = 0usize;

    for unit in 0..config.units {
        let should_fail = unit % 2 == 0;
        let result = manager.execute(|uow| {
            for i in 0..config.entities_per_unit {
                uow.register_new(EntityRef::new(AuditLog::new(&format!("{unit}/{i}"))))?;
            }
            if should_fail {
                return Err(CoreError::invalid_state("intentional"));
            }
            Ok(())
        });

        match result {
            Ok(()) => committed += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(committed, failed, start.elapsed())
}

/// Updates one wallet from `config.threads` threads, each loading it at the
/// same revision. Exactly one writer per round can win.
pub fn stress_optimistic_conflicts(store: &TestStore, config: &StressConfig) -> StressTestResult {
    let wallet = shared(Wallet::persisted(0, 1, 0));
    store.seed(&wallet);
    let id = wallet.read().id;

    let start = Instant::now();
    let mut committed = 0usize;
    let mut failed = 0usize;

    for round in 0..config.units {
        let version = round as u64 + 1;
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..config.threads)
                .map(|t| {
                    let store = store.handle();
                    scope.spawn(move || {
                        let copy = shared(Wallet::persisted(id, version, 0));
                        let uow = UnitOfWork::new(store, Config::default());
                        uow.register_clean(&copy)?;
                        copy.write().balance = (round * 10 + t) as i64;
                        uow.commit()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("Thread panicked"))
                .collect()
        });

        for result in results {
            match result {
                Ok(()) => committed += 1,
                Err(_) => failed += 1,
            }
        }
    }

    StressTestResult::new(committed, failed, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_commits() {
        let store = TestStore::new();
        let config = StressConfig {
            units: 200,
            entities_per_unit: 5,
            ..Default::default()
        };

        let result = stress_sequential_commits(&store, &config);
        assert_eq!(result.failed, 0);
        assert_eq!(store.count("audit_logs"), 1_000);
    }

    #[test]
    fn test_concurrent_commits() {
        let store = TestStore::new();
        let config = StressConfig {
            units: 200,
            entities_per_unit: 3,
            threads: 4,
        };

        let result = stress_concurrent_commits(store.handle(), &config);
        assert_eq!(result.failed, 0);
        assert_eq!(result.committed, 200);
        assert_eq!(store.count("audit_logs"), 600);
    }

    #[test]
    fn test_closure_failures() {
        let store = TestStore::new();
        let config = StressConfig {
            units: 100,
            entities_per_unit: 2,
            ..Default::default()
        };

        let result = stress_closure_failures(&store.manager(), &config);
        assert_eq!(result.committed, 50);
        assert_eq!(result.failed, 50);
        assert_eq!(store.count("audit_logs"), 100);
    }

    #[test]
    fn test_optimistic_conflicts() {
        let store = TestStore::new();
        let config = StressConfig {
            units: 20,
            threads: 4,
            ..Default::default()
        };

        let result = stress_optimistic_conflicts(&store, &config);
        assert_eq!(result.committed, 20);
        assert_eq!(result.failed, 60);
    }
}
