//! A worker represents a mediasoup C++ subprocess that runs in a single CPU core and handles
//! [`Router`] instances.

mod channel;
mod common;
mod data_structures;
mod payload_channel;
mod utils;

use crate::data_structures::AppData;
use crate::messages::{
    WorkerCloseRequest, WorkerCreateRouterRequest, WorkerCreateWebRtcServerRequest,
    WorkerDumpRequest, WorkerGetResourceRequest, WorkerUpdateSettingsRequest,
};
use crate::ortc;
use crate::ortc::RtpCapabilitiesError;
use crate::router::{Router, RouterId, RouterOptions};
use crate::webrtc_server::{WebRtcServer, WebRtcServerId, WebRtcServerOptions};
use crate::worker_manager::WorkerManager;
use async_executor::Executor;
use async_process::{Child, Command, ExitStatus, Stdio};
pub(crate) use channel::Channel;
pub use channel::RequestError;
pub(crate) use common::{SubscriptionHandler, SubscriptionTarget};
pub use data_structures::*;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use futures_lite::io::BufReader;
use futures_lite::{future, AsyncBufReadExt, AsyncRead, AsyncWrite, StreamExt};
use hash_hasher::HashedMap;
use log::{debug, error, warn};
use parking_lot::Mutex;
pub use payload_channel::NotificationError;
pub(crate) use payload_channel::PayloadChannel;
use serde::Deserialize;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::{fmt, io, mem};
use thiserror::Error;

/// Settings for worker to be created with.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WorkerSettings {
    /// Logging level for logs generated by the media worker subprocesses.
    ///
    /// Default [`WorkerLogLevel::Error`].
    pub log_level: WorkerLogLevel,
    /// Log tags for debugging. Check the meaning of each available tag in the worker documentation.
    pub log_tags: Vec<WorkerLogTag>,
    /// RTC port range for ICE, DTLS, RTP, etc. Default 10000..=59999.
    pub rtc_ports_range: RangeInclusive<u16>,
    /// DTLS certificate and private key.
    ///
    /// If `None`, a certificate is dynamically created.
    pub dtls_files: Option<WorkerDtlsFiles>,
    pub app_data: AppData,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            log_level: WorkerLogLevel::default(),
            log_tags: Vec::new(),
            rtc_ports_range: 10000..=59999,
            dtls_files: None,
            app_data: AppData::default(),
        }
    }
}

impl WorkerSettings {
    /// Command line arguments the worker process is spawned with.
    fn spawn_args(&self) -> io::Result<Vec<String>> {
        if self.rtc_ports_range.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid RTC ports range provided",
            ));
        }

        let mut spawn_args = vec![format!("--logLevel={}", self.log_level.as_str())];
        for log_tag in &self.log_tags {
            spawn_args.push(format!("--logTag={}", log_tag.as_str()));
        }
        spawn_args.push(format!("--rtcMinPort={}", self.rtc_ports_range.start()));
        spawn_args.push(format!("--rtcMaxPort={}", self.rtc_ports_range.end()));

        if let Some(dtls_files) = &self.dtls_files {
            spawn_args.push(format!(
                "--dtlsCertificateFile={}",
                dtls_files.certificate.display()
            ));
            spawn_args.push(format!(
                "--dtlsPrivateKeyFile={}",
                dtls_files.private_key.display()
            ));
        }

        Ok(spawn_args)
    }
}

/// Worker settings that can be updated in runtime.
#[derive(Debug, Default, Clone)]
#[non_exhaustive]
pub struct WorkerUpdateSettings {
    /// Logging level for logs generated by the media worker subprocesses.
    ///
    /// If `None`, logging level will not be updated.
    pub log_level: Option<WorkerLogLevel>,
    /// Log tags for debugging.
    ///
    /// If `None`, log tags will not be updated.
    pub log_tags: Option<Vec<WorkerLogTag>>,
}

/// Error that caused [`Worker::create_router`] to fail.
#[derive(Debug, Error)]
pub enum CreateRouterError {
    /// RTP capabilities generation error.
    #[error("RTP capabilities generation error: {0}")]
    FailedRtpCapabilitiesGeneration(RtpCapabilitiesError),
    /// Request to worker failed.
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that caused [`Worker::create_webrtc_server`] to fail.
#[derive(Debug, Error)]
pub enum CreateWebRtcServerError {
    /// Request to worker failed.
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Running,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_router: Bag<Arc<dyn Fn(&Router) + Send + Sync>>,
    new_webrtc_server: Bag<Arc<dyn Fn(&WebRtcServer) + Send + Sync>>,
    dead: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    pid: u32,
    executor: Arc<Executor<'static>>,
    channel: Channel,
    payload_channel: PayloadChannel,
    routers: Mutex<HashedMap<RouterId, Router>>,
    webrtc_servers: Mutex<HashedMap<WebRtcServerId, WebRtcServer>>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
    // Keeps the executor thread of the manager running while any worker is alive
    _worker_manager: WorkerManager,
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("drop()");

        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_internal();
        }
    }
}

impl Inner {
    /// Local side of the worker goes away, everything created on it is closed in cascade.
    fn close_internal(&self) {
        self.channel.close();
        self.payload_channel.close();

        let routers = mem::take(&mut *self.routers.lock());
        for router in routers.into_values() {
            router.worker_closed();
        }

        let webrtc_servers = mem::take(&mut *self.webrtc_servers.lock());
        for webrtc_server in webrtc_servers.into_values() {
            webrtc_server.worker_closed();
        }
    }

    fn died(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        error!("worker died unexpectedly [pid:{}]", self.pid);

        self.close_internal();
        self.handlers.dead.call_simple();
        self.handlers.close.call_simple();
    }
}

/// A worker represents a mediasoup C++ subprocess that runs in a single CPU core and handles
/// [`Router`] instances.
#[derive(Clone)]
#[must_use = "Worker will be destroyed on drop, make sure to keep it around for as long as needed"]
pub struct Worker {
    inner: Arc<Inner>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("pid", &self.inner.pid)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Worker {
    /// Spawn worker binary and wait for it to report readiness.
    pub(crate) async fn new(
        executor: Arc<Executor<'static>>,
        worker_binary: PathBuf,
        worker_settings: WorkerSettings,
        worker_manager: WorkerManager,
    ) -> io::Result<Self> {
        debug!("new()");

        let spawn_args = worker_settings.spawn_args()?;

        debug!(
            "spawning worker process: {} {}",
            worker_binary.display(),
            spawn_args.join(" ")
        );

        let mut command = Command::new(worker_binary);
        command
            .args(spawn_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env("MEDIASOUP_VERSION", env!("CARGO_PKG_VERSION"));

        let utils::SpawnResult {
            child,
            channel_reader,
            channel_writer,
            payload_channel_reader,
            payload_channel_writer,
        } = utils::spawn_with_worker_channels(&mut command)?;

        let pid = child.id();
        Self::watch_child(&executor, child);

        let channel = Channel::new(&executor, channel_reader, channel_writer);
        let payload_channel =
            PayloadChannel::new(&executor, payload_channel_reader, payload_channel_writer);

        Self::init(
            executor,
            pid,
            channel,
            payload_channel,
            worker_settings.app_data,
            worker_manager,
        )
        .await
    }

    /// Create worker on top of already established channel streams, `pid` is the worker's
    /// process id its notifications are addressed with.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn new_with_streams<R, W, PR, PW>(
        executor: Arc<Executor<'static>>,
        channel_reader: R,
        channel_writer: W,
        payload_channel_reader: PR,
        payload_channel_writer: PW,
        pid: u32,
        worker_settings: WorkerSettings,
        worker_manager: WorkerManager,
    ) -> io::Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        PR: AsyncRead + Unpin + Send + 'static,
        PW: AsyncWrite + Unpin + Send + 'static,
    {
        debug!("new_with_streams()");

        let channel = Channel::new(&executor, channel_reader, channel_writer);
        let payload_channel =
            PayloadChannel::new(&executor, payload_channel_reader, payload_channel_writer);

        Self::init(
            executor,
            pid,
            channel,
            payload_channel,
            worker_settings.app_data,
            worker_manager,
        )
        .await
    }

    async fn init(
        executor: Arc<Executor<'static>>,
        pid: u32,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
        worker_manager: WorkerManager,
    ) -> io::Result<Self> {
        let (running_sender, running_receiver) = async_oneshot::oneshot::<()>();
        let running_sender = Mutex::new(Some(running_sender));
        let _subscription_handler =
            channel.subscribe_to_notifications(pid.into(), move |notification| {
                match serde_json::from_value::<Notification>(notification) {
                    Ok(Notification::Running) => {
                        debug!("worker process running [pid:{}]", pid);
                        if let Some(mut running_sender) = running_sender.lock().take() {
                            let _ = running_sender.send(());
                        }
                    }
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            });

        let (closed_sender, closed_receiver) = async_oneshot::oneshot::<()>();
        let closed_handler = channel.on_closed({
            let mut closed_sender = closed_sender;

            move || {
                let _ = closed_sender.send(());
            }
        });

        let running = !channel.is_closed()
            && future::or(async move { running_receiver.await.is_ok() }, async move {
                let _ = closed_receiver.await;
                false
            })
            .await;

        drop(closed_handler);

        if !running {
            channel.close();
            payload_channel.close();

            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "worker process exited before being ready",
            ));
        }

        let inner = Arc::new(Inner {
            pid,
            executor,
            channel,
            payload_channel,
            routers: Mutex::default(),
            webrtc_servers: Mutex::default(),
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            _worker_manager: worker_manager,
        });

        inner
            .channel
            .on_closed({
                let inner_weak = Arc::downgrade(&inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.died();
                    }
                }
            })
            .detach();

        Ok(Self { inner })
    }

    fn watch_child(executor: &Executor<'static>, mut child: Child) {
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            executor
                .spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Some(Ok(line)) = lines.next().await {
                        debug!("(stdout) {}", line);
                    }
                })
                .detach();
        }

        if let Some(stderr) = child.stderr.take() {
            executor
                .spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Some(Ok(line)) = lines.next().await {
                        error!("(stderr) {}", line);
                    }
                })
                .detach();
        }

        executor
            .spawn(async move {
                match child.status().await {
                    Ok(status) => log_exit_status(pid, status),
                    Err(error) => {
                        error!("failed to wait for worker process [pid:{}]: {}", pid, error);
                    }
                }
            })
            .detach();
    }

    /// Worker process identifier (PID).
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Routers currently open on this worker.
    #[must_use]
    pub fn routers(&self) -> Vec<Router> {
        self.inner.routers.lock().values().cloned().collect()
    }

    /// WebRTC servers currently open on this worker.
    #[must_use]
    pub fn webrtc_servers(&self) -> Vec<WebRtcServer> {
        self.inner.webrtc_servers.lock().values().cloned().collect()
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<WorkerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner.channel.request("", WorkerDumpRequest {}).await
    }

    /// Provides resource usage of the mediasoup-worker subprocess.
    pub async fn get_resource_usage(&self) -> Result<WorkerResourceUsage, RequestError> {
        debug!("get_resource_usage()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request("", WorkerGetResourceRequest {})
            .await
    }

    /// Updates the worker settings in runtime. Just a subset of the worker settings can be updated.
    pub async fn update_settings(&self, data: WorkerUpdateSettings) -> Result<(), RequestError> {
        debug!("update_settings()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let WorkerUpdateSettings {
            log_level,
            log_tags,
        } = data;

        self.inner
            .channel
            .request(
                "",
                WorkerUpdateSettingsRequest {
                    log_level,
                    log_tags,
                },
            )
            .await
    }

    /// Create a WebRtcServer.
    pub async fn create_webrtc_server(
        &self,
        webrtc_server_options: WebRtcServerOptions,
    ) -> Result<WebRtcServer, CreateWebRtcServerError> {
        debug!("create_webrtc_server()");

        if self.closed() {
            return Err(CreateWebRtcServerError::Request(RequestError::EntityClosed));
        }

        let WebRtcServerOptions {
            listen_infos,
            app_data,
        } = webrtc_server_options;

        let webrtc_server_id = WebRtcServerId::new();

        self.inner
            .channel
            .request(
                "",
                WorkerCreateWebRtcServerRequest {
                    web_rtc_server_id: webrtc_server_id,
                    listen_infos: listen_infos.to_vec(),
                },
            )
            .await
            .map_err(CreateWebRtcServerError::Request)?;

        let webrtc_server =
            WebRtcServer::new(webrtc_server_id, self.inner.channel.clone(), app_data);

        self.inner
            .webrtc_servers
            .lock()
            .insert(webrtc_server_id, webrtc_server.clone());

        webrtc_server
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.webrtc_servers.lock().remove(&webrtc_server_id);
                    }
                }
            })
            .detach();

        self.inner.handlers.new_webrtc_server.call(|callback| {
            callback(&webrtc_server);
        });

        // Worker might have been closed while request was in flight
        if self.closed() {
            webrtc_server.worker_closed();
        }

        Ok(webrtc_server)
    }

    /// Create a Router.
    pub async fn create_router(
        &self,
        router_options: RouterOptions,
    ) -> Result<Router, CreateRouterError> {
        debug!("create_router()");

        if self.closed() {
            return Err(CreateRouterError::Request(RequestError::EntityClosed));
        }

        let RouterOptions {
            media_codecs,
            app_data,
        } = router_options;

        let rtp_capabilities = ortc::generate_router_rtp_capabilities(media_codecs)
            .map_err(CreateRouterError::FailedRtpCapabilitiesGeneration)?;

        let router_id = RouterId::new();

        self.inner
            .channel
            .request("", WorkerCreateRouterRequest { router_id })
            .await
            .map_err(CreateRouterError::Request)?;

        let router = Router::new(
            router_id,
            Arc::clone(&self.inner.executor),
            rtp_capabilities,
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            app_data,
        );

        self.inner.routers.lock().insert(router_id, router.clone());

        router
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.routers.lock().remove(&router_id);
                    }
                }
            })
            .detach();

        self.inner.handlers.new_router.call(|callback| {
            callback(&router);
        });

        // Worker might have been closed while request was in flight
        if self.closed() {
            router.worker_closed();
        }

        Ok(router)
    }

    /// Closes the worker, every router and WebRTC server created on it is closed as well.
    ///
    /// Does nothing if the worker is already closed.
    pub async fn close(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner.channel.request("", WorkerCloseRequest {}).await {
            warn!("worker closing failed: {}", error);
        }

        inner.close_internal();
        inner.handlers.close.call_simple();
    }

    /// Callback is called when a new router is created.
    pub fn on_new_router<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&Router) + Send + Sync + 'static,
    {
        self.inner.handlers.new_router.add(Arc::new(callback))
    }

    /// Callback is called when a new WebRTC server is created.
    pub fn on_new_webrtc_server<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&WebRtcServer) + Send + Sync + 'static,
    {
        self.inner.handlers.new_webrtc_server.add(Arc::new(callback))
    }

    /// Callback is called when the worker process unexpectedly dies or its channel is lost.
    pub fn on_dead<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.dead.add(Box::new(callback))
    }

    /// Fires once whatever caused the close, immediately if already closed.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakWorker {
        WeakWorker {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

fn log_exit_status(pid: u32, status: ExitStatus) {
    if status.success() {
        debug!("worker process exited [pid:{}]", pid);
    } else {
        error!("worker process exited [pid:{}, status:{}]", pid, status);
    }
}

/// Non-owning handle to a [`Worker`].
#[derive(Clone)]
pub struct WeakWorker {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakWorker").finish()
    }
}

impl WeakWorker {
    #[must_use]
    pub fn upgrade(&self) -> Option<Worker> {
        let inner = self.inner.upgrade()?;

        Some(Worker { inner })
    }
}

/// Channel that is not connected to any worker.
#[cfg(test)]
pub(crate) fn test_channel() -> Channel {
    Channel::new(
        &Executor::new(),
        futures_lite::io::empty(),
        futures_lite::io::sink(),
    )
}

/// Payload channel that is not connected to any worker.
#[cfg(test)]
pub(crate) fn test_payload_channel() -> PayloadChannel {
    PayloadChannel::new(
        &Executor::new(),
        futures_lite::io::empty(),
        futures_lite::io::sink(),
    )
}
