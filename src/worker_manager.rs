
use crate::worker::{Worker, WorkerSettings};
use async_executor::Executor;
use async_oneshot::Sender;
use event_listener_primitives::{Bag, HandlerId};
use futures_lite::{future, AsyncRead, AsyncWrite};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::{fmt, io};

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_worker: Bag<Arc<dyn Fn(&Worker) + Send + Sync>>,
}

struct Inner {
    executor: Arc<Executor<'static>>,
    handlers: Handlers,
    /// Dropping this stops the executor thread started by `WorkerManager::new()`.
    _stop_sender: Option<Sender<()>>,
    worker_binary: PathBuf,
}

/// Spawns worker processes and hands out [`Worker`] handles for them.
///
/// # Examples
/// ```no_run
/// use futures_lite::future;
/// use mediasoup_controller::worker::WorkerSettings;
/// use mediasoup_controller::worker_manager::WorkerManager;
///
/// let worker_manager = WorkerManager::new("/path/to/mediasoup-worker".into());
///
/// future::block_on(async move {
///     let worker = worker_manager
///         .create_worker(WorkerSettings::default())
///         .await
///         .unwrap();
/// })
/// ```
///
/// [`WorkerManager::with_executor()`] reuses an existing [`async_executor::Executor`] instead of
/// starting a thread.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerManager")
            .field("worker_binary", &self.inner.worker_binary)
            .finish()
    }
}

impl WorkerManager {
    /// Starts a dedicated executor thread for worker I/O.
    #[must_use]
    pub fn new(worker_binary: PathBuf) -> Self {
        let executor = Arc::new(Executor::new());
        let (stop_sender, stop_receiver) = async_oneshot::oneshot::<()>();
        {
            let executor = Arc::clone(&executor);
            std::thread::spawn(move || {
                // Will return Err(Closed) when `WorkerManager` struct is dropped
                let _ = future::block_on(executor.run(stop_receiver));
            });
        }

        let inner = Arc::new(Inner {
            executor,
            handlers: Handlers::default(),
            _stop_sender: Some(stop_sender),
            worker_binary,
        });

        Self { inner }
    }

    /// Runs worker I/O on the given executor.
    #[must_use]
    pub fn with_executor(worker_binary: PathBuf, executor: Arc<Executor<'static>>) -> Self {
        let inner = Arc::new(Inner {
            executor,
            handlers: Handlers::default(),
            _stop_sender: None,
            worker_binary,
        });

        Self { inner }
    }

    /// Spawns a worker process. The returned [`Worker`] keeps this manager alive.
    pub async fn create_worker(&self, worker_settings: WorkerSettings) -> io::Result<Worker> {
        debug!("create_worker()");

        let worker = Worker::new(
            Arc::clone(&self.inner.executor),
            self.inner.worker_binary.clone(),
            worker_settings,
            self.clone(),
        )
        .await?;

        self.inner.handlers.new_worker.call(|callback| {
            callback(&worker);
        });

        Ok(worker)
    }

    /// Create a [`Worker`] talking to a worker over already connected streams instead of
    /// spawning a new process.
    ///
    /// `pid` is the id the worker uses as target of its process level notifications.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_worker_with_streams<R, W, PR, PW>(
        &self,
        channel_reader: R,
        channel_writer: W,
        payload_channel_reader: PR,
        payload_channel_writer: PW,
        pid: u32,
        worker_settings: WorkerSettings,
    ) -> io::Result<Worker>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        PR: AsyncRead + Unpin + Send + 'static,
        PW: AsyncWrite + Unpin + Send + 'static,
    {
        debug!("create_worker_with_streams()");

        let worker = Worker::new_with_streams(
            Arc::clone(&self.inner.executor),
            channel_reader,
            channel_writer,
            payload_channel_reader,
            payload_channel_writer,
            pid,
            worker_settings,
            self.clone(),
        )
        .await?;

        self.inner.handlers.new_worker.call(|callback| {
            callback(&worker);
        });

        Ok(worker)
    }

    /// Callback is called when a new worker is created.
    pub fn on_new_worker<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&Worker) + Send + Sync + 'static,
    {
        self.inner.handlers.new_worker.add(Arc::new(callback))
    }
}
