//! Supervised background threads

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Running flag handed to a worker body
#[derive(Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Whether the worker should keep going
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleep up to `duration`, waking early once the flag is cleared.
    /// Returns whether the worker is still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(20);
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLICE));
        }
        self.is_running()
    }
}

/// A named thread with a stop flag; dropping it stops and joins
pub struct Worker {
    name: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a thread called `name`
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(RunFlag) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = RunFlag(running.clone());
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                info!("{} started", thread_name);
                body(flag);
                info!("{} stopped", thread_name);
            })
            .with_context(|| format!("Failed to spawn {}", name))?;

        Ok(Self {
            name: name.to_string(),
            running,
            handle: Some(handle),
        })
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the body has returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Ask the body to return
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Wait for the body to return
    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("{} panicked", self.name);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
        self.join_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_stop_and_join() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let worker = Worker::spawn("test-worker", move |flag| {
            while flag.is_running() {
                counter.fetch_add(1, Ordering::Relaxed);
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert_eq!(worker.name(), "test-worker");
        thread::sleep(Duration::from_millis(20));
        worker.stop();
        worker.join();
        let after = ticks.load(Ordering::Relaxed);
        assert!(after > 0);

        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::Relaxed), after);
    }

    #[test]
    fn test_drop_stops_worker() {
        let worker = Worker::spawn("dropped", |flag| {
            while flag.sleep(Duration::from_secs(60)) {}
        })
        .unwrap();
        let started = Instant::now();
        drop(worker);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_body_may_finish_early() {
        let worker = Worker::spawn("short", |_| {}).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(worker.is_finished());
    }

    #[test]
    fn test_run_flag_sleep_wakes_on_stop() {
        let running = Arc::new(AtomicBool::new(true));
        let flag = RunFlag(running.clone());
        assert!(flag.sleep(Duration::from_millis(5)));

        running.store(false, Ordering::Relaxed);
        let started = Instant::now();
        assert!(!flag.sleep(Duration::from_secs(60)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
