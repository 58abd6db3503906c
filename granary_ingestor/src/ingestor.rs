//! The writer supervisor: spawns the worker pool and drives its orderly
//! shutdown.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use snafu::ResultExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use granary_log::ConsumerWaker;

use crate::config::IngestorConfig;
use crate::error::{AlreadyStartedSnafu, ConsumerSnafu, Result, StartupTimeoutSnafu};
use crate::worker::{AssignmentPruner, Worker, WrittenOffsets};

/// How long a worker may take to establish log connectivity at startup.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// A pool of independent ingest workers draining one topic into column
/// files.
///
/// Built with [`IngestorBuilder`]; [`start`] is non-blocking and fails
/// fast if any worker cannot establish log connectivity. [`close`] stops
/// every worker, discarding in-flight partial files; it logs and swallows
/// close-time I/O errors so no worker is stranded by an earlier failure.
///
/// [`IngestorBuilder`]: crate::IngestorBuilder
/// [`start`]: Ingestor::start
/// [`close`]: Ingestor::close
pub struct Ingestor<T> {
    config: Arc<IngestorConfig<T>>,
    workers: Vec<WorkerHandle>,
}

impl<T> Ingestor<T> {
    pub(crate) fn new(config: IngestorConfig<T>) -> Self {
        Self {
            config: Arc::new(config),
            workers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn config(&self) -> &IngestorConfig<T> {
        &self.config
    }
}

impl<T: Send + 'static> Ingestor<T> {
    /// Create the workers and start ingesting.
    pub async fn start(&mut self) -> Result<()> {
        snafu::ensure!(self.workers.is_empty(), AlreadyStartedSnafu);
        info!(
            instance = %self.config.instance_name,
            topic = %self.config.topic,
            workers = self.config.worker_count,
            "starting ingestor"
        );

        for index in 0..self.config.worker_count {
            let handle = self.start_worker(index).await?;
            self.workers.push(handle);
        }

        info!(instance = %self.config.instance_name, "ingestor started");
        Ok(())
    }

    async fn start_worker(&self, index: usize) -> Result<WorkerHandle> {
        let mut consumer = self
            .config
            .consumer_factory
            .create(&self.config.consumer_properties)
            .await
            .context(ConsumerSnafu {
                operation: "create",
            })?;

        let written_offsets: WrittenOffsets = Arc::new(Mutex::new(BTreeMap::new()));
        let pruner = Arc::new(AssignmentPruner {
            index,
            written_offsets: written_offsets.clone(),
        });
        consumer
            .subscribe(&self.config.topic, pruner)
            .await
            .context(ConsumerSnafu {
                operation: "subscribe",
            })?;

        // One-shot poll to drive the group join and prove the log is
        // reachable before the worker goes to the background.
        match tokio::time::timeout(STARTUP_TIMEOUT, consumer.poll(Duration::ZERO)).await {
            Ok(Ok(_)) => {}
            Ok(Err(source)) => {
                return Err(source).context(ConsumerSnafu {
                    operation: "connect",
                });
            }
            Err(_) => return StartupTimeoutSnafu.fail(),
        }
        debug!(worker = index, "consumer initialized");

        let waker = consumer.waker();
        let running = Arc::new(AtomicBool::new(true));
        let close_lock = Arc::new(tokio::sync::Mutex::new(()));
        let ct = CancellationToken::new();

        let worker = Worker::new(
            index,
            self.config.clone(),
            consumer,
            written_offsets,
            running.clone(),
            close_lock.clone(),
            ct.clone(),
        );
        let join = tokio::spawn(async move {
            if let Err(err) = worker.run().await {
                error!(worker = index, error = %err, "ingest worker terminated");
            }
        });

        Ok(WorkerHandle {
            index,
            running,
            waker,
            close_lock,
            ct,
            join,
        })
    }

    /// Stop and join every worker. In-flight partial files are discarded;
    /// their uncommitted records will be re-delivered after a restart.
    pub async fn close(&mut self) {
        info!(instance = %self.config.instance_name, "closing ingestor");
        for handle in self.workers.drain(..) {
            handle.close().await;
        }
        info!(instance = %self.config.instance_name, "ingestor closed");
    }
}

struct WorkerHandle {
    index: usize,
    running: Arc<AtomicBool>,
    waker: ConsumerWaker,
    close_lock: Arc<tokio::sync::Mutex<()>>,
    ct: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    async fn close(mut self) {
        info!(worker = self.index, "closing ingest worker");
        self.running.store(false, Ordering::Release);
        self.waker.wake();
        {
            // The worker holds this lock for the duration of every writer
            // close, so the stop signal cannot land between attempts of a
            // half-finished close.
            let _close_guard = self.close_lock.lock().await;
            self.ct.cancel();
        }
        if let Err(error) = (&mut self.join).await {
            warn!(worker = self.index, error = %error, "ingest worker task failed");
        }
        info!(worker = self.index, "ingest worker closed");
    }
}
