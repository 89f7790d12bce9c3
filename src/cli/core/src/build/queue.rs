/* src/cli/core/src/build/queue.rs */

// Bounded worker pool: a fixed set of workers pull boxed jobs from one shared
// channel. Used with N workers for pages and with one for critical CSS.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

type Job = BoxFuture<'static, ()>;

/// Outcome of one job: its value, or the panic that ended it.
pub type JobResult<T> = std::thread::Result<T>;

#[derive(Debug, Default)]
struct Gauge {
  active: AtomicUsize,
  peak: AtomicUsize,
}

impl Gauge {
  fn enter(&self) {
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
  }

  fn exit(&self) {
    self.active.fetch_sub(1, Ordering::SeqCst);
  }
}

pub struct WorkQueue {
  name: &'static str,
  tx: mpsc::UnboundedSender<Job>,
  workers: Vec<JoinHandle<()>>,
  gauge: Arc<Gauge>,
}

impl WorkQueue {
  /// Start `concurrency` workers (at least one). Jobs start in submission order.
  pub fn new(name: &'static str, concurrency: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel::<Job>();
    let rx = Arc::new(Mutex::new(rx));
    let gauge = Arc::new(Gauge::default());
    let workers = (0..concurrency.max(1))
      .map(|worker| {
        let rx = Arc::clone(&rx);
        let gauge = Arc::clone(&gauge);
        tokio::spawn(async move {
          loop {
            // The lock is held only while waiting, so the next idle worker
            // takes the next job.
            let job = rx.lock().await.recv().await;
            let Some(job) = job else { break };
            gauge.enter();
            job.await;
            gauge.exit();
          }
          tracing::trace!(queue = name, worker, "worker stopped");
        })
      })
      .collect();

    tracing::debug!(queue = name, concurrency = concurrency.max(1), "queue started");
    Self { name, tx, workers, gauge }
  }

  /// Schedule `fut`. The receiver resolves once it settled; a panic is caught
  /// and reported instead of taking the worker down.
  pub fn add<F, T>(&self, fut: F) -> oneshot::Receiver<JobResult<T>>
  where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
  {
    let (done_tx, done_rx) = oneshot::channel();
    let job = async move {
      let result = AssertUnwindSafe(fut).catch_unwind().await;
      let _ = done_tx.send(result);
    }
    .boxed();
    if self.tx.send(job).is_err() {
      // Workers are gone; dropping the job drops `done_tx` and the receiver errors.
      tracing::warn!(queue = self.name, "job submitted to a stopped queue");
    }
    done_rx
  }

  /// Schedule `fut` and wait for its value.
  pub async fn run<F, T>(&self, fut: F) -> Result<T>
  where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
  {
    match self.add(fut).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(panic)) => Err(anyhow!("{} job panicked: {}", self.name, panic_message(&*panic))),
      Err(_) => Err(anyhow!("{} queue stopped before the job finished", self.name)),
    }
  }

  pub fn active(&self) -> usize {
    self.gauge.active.load(Ordering::SeqCst)
  }

  /// Highest number of jobs that were ever running at once.
  pub fn peak(&self) -> usize {
    self.gauge.peak.load(Ordering::SeqCst)
  }

  /// Close the queue and wait until every submitted job has settled.
  /// Returns the peak concurrency.
  pub async fn on_idle(self) -> usize {
    let Self { name, tx, workers, gauge } = self;
    drop(tx);
    for worker in workers {
      if let Err(e) = worker.await {
        tracing::warn!(queue = name, error = %e, "worker ended abnormally");
      }
    }
    let peak = gauge.peak.load(Ordering::SeqCst);
    tracing::debug!(queue = name, peak, "queue drained");
    peak
  }
}

pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
