use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Runs a task on a fixed interval in its own thread.
///
/// - The first tick happens one interval after spawning
/// - A panicking tick is logged and the worker keeps its schedule
/// - Shutdown interrupts the wait immediately
#[derive(Debug)]
pub struct PeriodicWorker;

impl PeriodicWorker {
    pub fn spawn<F>(name: &'static str, interval: Duration, mut tick: F) -> io::Result<WorkerHandle>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, interval, shutdown_rx, &mut tick))?;

        debug!(worker = name, interval_ms = interval.as_millis() as u64, "worker started");

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<F>(name: &'static str, interval: Duration, shutdown_rx: mpsc::Receiver<()>, tick: &mut F)
where
    F: FnMut(),
{
    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if panic::catch_unwind(AssertUnwindSafe(&mut *tick)).is_err() {
                    error!(worker = name, "periodic task panicked");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(worker = name, "worker stopped");
}
