use crate::messages::Request;
use crate::worker::common::{
    EventHandlers, SubscriptionHandler, SubscriptionTarget, WeakEventHandlers,
};
use crate::worker::utils;
use async_executor::Executor;
use event_listener_primitives::{BagOnce, HandlerId};
use futures_lite::io::BufReader;
use futures_lite::{future, AsyncRead, AsyncWrite, AsyncWriteExt};
use log::{debug, error, trace, warn};
use nohash_hasher::IntMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

// netstring length for a 4194304 bytes payload.
pub(super) const NS_MESSAGE_MAX_LEN: usize = 4194313;
pub(super) const NS_PAYLOAD_MAX_LEN: usize = 4194304;

/// Timeout of a request given the number of requests already waiting for response.
pub(crate) fn request_timeout(pending_requests: usize) -> Duration {
    Duration::from_millis((1000.0 * (15.0 + (0.1 * pending_requests as f64))).round() as u64)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum ChannelReceiveMessage {
    #[serde(rename_all = "camelCase")]
    Notification {
        target_id: Value,
        event: String,
        data: Option<Value>,
    },
    ResponseSuccess {
        id: u32,
        #[allow(dead_code)]
        accepted: bool,
        data: Option<Value>,
    },
    ResponseError {
        id: u32,
        error: String,
        reason: String,
    },
}

/// Log line produced by the worker.
#[derive(Debug, Eq, PartialEq)]
pub(super) enum InternalMessage {
    Debug(String),
    Warn(String),
    Error(String),
    Dump(String),
    Unexpected(Vec<u8>),
}

impl InternalMessage {
    pub(super) fn parse(bytes: &[u8]) -> Self {
        match bytes.split_first() {
            Some((b'D', rest)) => Self::Debug(String::from_utf8_lossy(rest).into_owned()),
            Some((b'W', rest)) => Self::Warn(String::from_utf8_lossy(rest).into_owned()),
            Some((b'E', rest)) => Self::Error(String::from_utf8_lossy(rest).into_owned()),
            Some((b'X', rest)) => Self::Dump(String::from_utf8_lossy(rest).into_owned()),
            _ => Self::Unexpected(Vec::from(bytes)),
        }
    }

    pub(super) fn log(self) {
        match self {
            Self::Debug(text) => debug!("[worker] {}", text),
            Self::Warn(text) => warn!("[worker] {}", text),
            Self::Error(text) => error!("[worker] {}", text),
            Self::Dump(text) => trace!("[worker] {}", text),
            Self::Unexpected(data) => error!(
                "worker sent unexpected data: {}",
                String::from_utf8_lossy(&data)
            ),
        }
    }
}

/// Request to the worker failed.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Channel already closed.
    #[error("Channel already closed")]
    ChannelClosed,
    /// Request is too long.
    #[error("Message is too long")]
    MessageTooLong,
    /// The entity the request targets was closed locally, nothing was sent.
    #[error("Entity is closed")]
    EntityClosed,
    /// Request timed out.
    #[error("Request timed out")]
    TimedOut,
    /// Received response error.
    #[error("Received response error: {reason}")]
    Response {
        /// Error reason.
        reason: String,
    },
    /// Worker rejected request as malformed.
    #[error("Received type error: {reason}")]
    TypeError {
        /// Error reason.
        reason: String,
    },
    /// Failed to parse response from worker.
    #[error("Failed to parse response from worker: {error}")]
    FailedToParse {
        /// Error message.
        error: String,
    },
    /// Worker did not return any data in response.
    #[error("Worker did not return any data in response")]
    NoData,
}

pub(super) type Response = Result<Option<Value>, RequestError>;

/// Pending requests with their response senders.
#[derive(Default)]
pub(super) struct RequestsContainer {
    next_id: u32,
    handlers: IntMap<u32, async_oneshot::Sender<Response>>,
    closed: bool,
}

impl RequestsContainer {
    /// Register new request, returns its id and the number of requests that were pending before.
    ///
    /// `None` once the container was cleared on channel close.
    pub(super) fn register(
        &mut self,
        sender: async_oneshot::Sender<Response>,
    ) -> Option<(u32, usize)> {
        if self.closed {
            return None;
        }

        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        let id = self.next_id;
        let pending = self.handlers.len();
        self.handlers.insert(id, sender);

        Some((id, pending))
    }

    pub(super) fn remove(&mut self, id: u32) -> Option<async_oneshot::Sender<Response>> {
        self.handlers.remove(&id)
    }

    pub(super) fn clear(&mut self) {
        self.closed = true;
        // Dropping senders resolves waiting requests with `ChannelClosed`
        self.handlers.clear();
    }
}

/// Resolve pending request identified by `id` with the response from worker.
pub(super) fn resolve_response(
    requests_container: &Mutex<RequestsContainer>,
    id: u32,
    response: Response,
) {
    let sender = requests_container.lock().remove(id);
    match sender {
        Some(mut sender) => {
            let _ = sender.send(response);
        }
        None => {
            warn!(
                "received response does not match any sent request [id:{}]",
                id
            );
        }
    }
}

pub(super) fn response_error(error: &str, reason: String) -> RequestError {
    if error == "TypeError" {
        RequestError::TypeError { reason }
    } else {
        RequestError::Response { reason }
    }
}

/// Notification re-wrapped as `{event, data}` so that entities can deserialize it directly.
pub(super) fn notification_value(event: String, data: Option<Value>) -> Value {
    let mut notification = serde_json::Map::new();
    notification.insert("event".to_string(), Value::String(event));
    if let Some(data) = data {
        notification.insert("data".to_string(), data);
    }

    Value::Object(notification)
}

/// Wait for response with timeout, removing the pending entry on timeout.
pub(super) async fn wait_response(
    requests_container: &Mutex<RequestsContainer>,
    id: u32,
    timeout: Duration,
    receiver: async_oneshot::Receiver<Response>,
) -> Response {
    future::or(
        async move { receiver.await.map_err(|_| RequestError::ChannelClosed)? },
        async move {
            async_io::Timer::after(timeout).await;

            requests_container.lock().remove(id);

            Err(RequestError::TimedOut)
        },
    )
    .await
}

/// Turn response data into the typed response of the request.
pub(super) fn parse_response<T>(data: Option<Value>) -> Result<T, RequestError>
where
    T: serde::de::DeserializeOwned,
{
    match data {
        Some(data) => serde_json::from_value(data).map_err(|error| RequestError::FailedToParse {
            error: error.to_string(),
        }),
        // `()` and optional responses are fine without data
        None => serde_json::from_value(Value::Null).map_err(|_| RequestError::NoData),
    }
}

#[derive(Default)]
pub(super) struct Handlers {
    pub(super) closed: BagOnce<Box<dyn FnOnce() + Send>>,
}

/// State shared between channel handle and its reader task.
pub(super) struct Shared {
    pub(super) closed: AtomicBool,
    pub(super) requests_container: Mutex<RequestsContainer>,
    pub(super) handlers: Handlers,
}

impl Shared {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            requests_container: Mutex::default(),
            handlers: Handlers::default(),
        })
    }

    /// Returns `false` if it was already closed.
    pub(super) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.requests_container.lock().clear();
        self.handlers.closed.call_simple();

        true
    }
}

/// Stops the writer once the channel is closed from either side, queued messages are dropped.
pub(super) fn close_sender_with_channel<T: Send + 'static>(
    shared: &Shared,
    sender: &async_channel::Sender<T>,
) {
    shared
        .handlers
        .closed
        .add(Box::new({
            let sender = sender.clone();

            move || {
                sender.close();
            }
        }))
        .detach();

    if shared.closed.load(Ordering::SeqCst) {
        sender.close();
    }
}

struct Inner {
    sender: async_channel::Sender<Vec<u8>>,
    shared: Arc<Shared>,
    event_handlers: EventHandlers<Value>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.sender.close();
        self.shared.close();
    }
}

/// Control channel: requests with JSON bodies, responses and notifications.
#[derive(Clone)]
pub(crate) struct Channel {
    inner: Arc<Inner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.inner.shared.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Channel {
    pub(super) fn new<R, W>(executor: &Executor<'static>, reader: R, mut writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Shared::new();
        let event_handlers = EventHandlers::new();

        {
            let shared_weak = Arc::downgrade(&shared);
            let event_handlers_weak = event_handlers.downgrade();

            executor
                .spawn(async move {
                    let mut reader = BufReader::new(reader);

                    loop {
                        let bytes = match utils::read_netstring(&mut reader, NS_MESSAGE_MAX_LEN)
                            .await
                        {
                            Ok(Some(bytes)) => bytes,
                            // EOF
                            Ok(None) => break,
                            Err(error) => {
                                error!("failed to read from channel: {}", error);
                                break;
                            }
                        };

                        trace!(
                            "received raw message: {}",
                            String::from_utf8_lossy(&bytes)
                        );

                        if !process_message(&bytes, &shared_weak, &event_handlers_weak) {
                            break;
                        }
                    }

                    if let Some(shared) = shared_weak.upgrade() {
                        if shared.close() {
                            debug!("channel closed by the other side");
                        }
                    }
                })
                .detach();
        }

        let sender = {
            let (sender, receiver) = async_channel::bounded::<Vec<u8>>(1);

            executor
                .spawn(async move {
                    let mut bytes = Vec::with_capacity(NS_MESSAGE_MAX_LEN);

                    while let Ok(message) = receiver.recv().await {
                        bytes.clear();
                        utils::write_netstring(&mut bytes, &message);

                        if let Err(error) = writer.write_all(&bytes).await {
                            error!("failed to write to channel: {}", error);
                            break;
                        }
                        if let Err(error) = writer.flush().await {
                            error!("failed to flush channel: {}", error);
                            break;
                        }
                    }

                    let _ = writer.close().await;
                })
                .detach();

            sender
        };

        close_sender_with_channel(&shared, &sender);

        let inner = Arc::new(Inner {
            sender,
            shared,
            event_handlers,
        });

        Self { inner }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.shared.closed.load(Ordering::SeqCst)
    }

    /// Close the channel, all pending and future requests will fail with
    /// [`RequestError::ChannelClosed`].
    pub(crate) fn close(&self) {
        debug!("close()");

        self.inner.sender.close();
        self.inner.shared.close();
    }

    /// Callback is called once when channel is closed, locally or because the other side went
    /// away.
    pub(crate) fn on_closed<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.shared.handlers.closed.add(Box::new(callback))
    }

    pub(crate) async fn request<R, H>(
        &self,
        handler_id: H,
        request: R,
    ) -> Result<R::Response, RequestError>
    where
        R: Request,
        H: fmt::Display,
    {
        let method = request.as_method();
        let body = serde_json::to_string(&request).map_err(|error| {
            RequestError::FailedToParse {
                error: error.to_string(),
            }
        })?;

        let data = self
            .request_internal(method, handler_id.to_string(), body)
            .await?;

        parse_response(data)
    }

    /// Non-generic method to avoid significant duplication in final binary
    async fn request_internal(
        &self,
        method: &'static str,
        handler_id: String,
        body: String,
    ) -> Result<Option<Value>, RequestError> {
        if self.is_closed() {
            return Err(RequestError::ChannelClosed);
        }

        let shared = &self.inner.shared;
        let (result_sender, result_receiver) = async_oneshot::oneshot();
        let (id, pending) = shared
            .requests_container
            .lock()
            .register(result_sender)
            .ok_or(RequestError::ChannelClosed)?;

        debug!("request() [method:{}, id:{}]", method, id);

        let message = format!("{}:{}:{}:{}", id, method, handler_id, body).into_bytes();

        if message.len() > NS_MESSAGE_MAX_LEN {
            shared.requests_container.lock().remove(id);
            return Err(RequestError::MessageTooLong);
        }

        if self.inner.sender.send(message).await.is_err() {
            shared.requests_container.lock().remove(id);
            return Err(RequestError::ChannelClosed);
        }

        let result = wait_response(
            &shared.requests_container,
            id,
            request_timeout(pending),
            result_receiver,
        )
        .await;

        match &result {
            Ok(_) => {
                debug!("request succeeded [method:{}, id:{}]", method, id);
            }
            Err(error) => {
                debug!("request failed [method:{}, id:{}]: {}", method, id, error);
            }
        }

        result
    }

    pub(crate) fn subscribe_to_notifications<F>(
        &self,
        target_id: SubscriptionTarget,
        callback: F,
    ) -> SubscriptionHandler
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .event_handlers
            .add(target_id, Box::new(callback))
    }
}

/// Returns `false` if reading should stop.
fn process_message(
    bytes: &[u8],
    shared_weak: &Weak<Shared>,
    event_handlers_weak: &WeakEventHandlers<Value>,
) -> bool {
    if bytes.first() != Some(&b'{') {
        InternalMessage::parse(bytes).log();
        return true;
    }

    let message = match serde_json::from_slice::<ChannelReceiveMessage>(bytes) {
        Ok(message) => message,
        Err(error) => {
            error!(
                "failed to deserialize message: {} [message:{}]",
                error,
                String::from_utf8_lossy(bytes)
            );
            return true;
        }
    };

    match message {
        ChannelReceiveMessage::Notification {
            target_id,
            event,
            data,
        } => {
            let target_id = match SubscriptionTarget::from_json(&target_id) {
                Some(target_id) => target_id,
                None => {
                    warn!("notification with invalid target id: {}", target_id);
                    return true;
                }
            };
            match event_handlers_weak.upgrade() {
                Some(event_handlers) => {
                    event_handlers.call_callbacks_with_value(
                        &target_id,
                        notification_value(event, data),
                    );
                }
                None => {
                    return false;
                }
            }
        }
        ChannelReceiveMessage::ResponseSuccess { id, data, .. } => match shared_weak.upgrade() {
            Some(shared) => {
                resolve_response(&shared.requests_container, id, Ok(data));
            }
            None => {
                return false;
            }
        },
        ChannelReceiveMessage::ResponseError { id, error, reason } => {
            match shared_weak.upgrade() {
                Some(shared) => {
                    resolve_response(
                        &shared.requests_container,
                        id,
                        Err(response_error(&error, reason)),
                    );
                }
                None => {
                    return false;
                }
            }
        }
    }

    true
}
