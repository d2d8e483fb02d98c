use crate::messages::{Notification, Request};
use crate::worker::channel::{
    close_sender_with_channel, notification_value, parse_response, request_timeout,
    resolve_response, response_error, wait_response, ChannelReceiveMessage, InternalMessage,
    RequestError, Shared, NS_MESSAGE_MAX_LEN, NS_PAYLOAD_MAX_LEN,
};
use crate::worker::common::{
    EventHandlers, SubscriptionHandler, SubscriptionTarget, WeakEventHandlers,
};
use crate::worker::utils;
use async_executor::Executor;
use bytes::Bytes;
use futures_lite::io::BufReader;
use futures_lite::{AsyncRead, AsyncWrite, AsyncWriteExt};
use log::{debug, error, trace, warn};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use thiserror::Error;

struct MessageWithPayload {
    message: Vec<u8>,
    payload: Bytes,
}

/// Notification from the worker together with its binary payload.
#[derive(Debug, Clone)]
pub(crate) struct PayloadNotification {
    pub(crate) message: Value,
    pub(crate) payload: Bytes,
}

/// Notification to the worker failed.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum NotificationError {
    /// Channel already closed.
    #[error("Channel already closed")]
    ChannelClosed,
    /// Notification message or its payload is too long.
    #[error("Message is too long")]
    MessageTooLong,
    /// Failed to serialize notification.
    #[error("Failed to serialize notification: {error}")]
    FailedToSerialize {
        /// Error message.
        error: String,
    },
}

struct Inner {
    sender: async_channel::Sender<MessageWithPayload>,
    shared: Arc<Shared>,
    event_handlers: EventHandlers<PayloadNotification>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.sender.close();
        self.shared.close();
    }
}

/// Channel whose messages are followed by a binary payload.
#[derive(Clone)]
pub(crate) struct PayloadChannel {
    inner: Arc<Inner>,
}

impl fmt::Debug for PayloadChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadChannel")
            .field("closed", &self.inner.shared.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl PayloadChannel {
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
                                error!("failed to read from payload channel: {}", error);
                                break;
                            }
                        };

                        trace!(
                            "received raw message: {}",
                            String::from_utf8_lossy(&bytes)
                        );

                        let message = if bytes.first() == Some(&b'{') {
                            serde_json::from_slice::<ChannelReceiveMessage>(&bytes)
                        } else {
                            InternalMessage::parse(&bytes).log();
                            continue;
                        };

                        let message = match message {
                            Ok(message) => message,
                            Err(error) => {
                                error!(
                                    "failed to deserialize message: {} [message:{}]",
                                    error,
                                    String::from_utf8_lossy(&bytes)
                                );
                                continue;
                            }
                        };

                        match message {
                            ChannelReceiveMessage::Notification {
                                target_id,
                                event,
                                data,
                            } => {
                                // Notification is always followed by its payload
                                let payload = match utils::read_netstring(
                                    &mut reader,
                                    NS_PAYLOAD_MAX_LEN,
                                )
                                .await
                                {
                                    Ok(Some(payload)) => Bytes::from(payload),
                                    Ok(None) => break,
                                    Err(error) => {
                                        error!("failed to read notification payload: {}", error);
                                        break;
                                    }
                                };

                                trace!("received notification payload of {} bytes", payload.len());

                                if !dispatch_notification(
                                    &event_handlers_weak,
                                    &target_id,
                                    PayloadNotification {
                                        message: notification_value(event, data),
                                        payload,
                                    },
                                ) {
                                    break;
                                }
                            }
                            ChannelReceiveMessage::ResponseSuccess { id, data, .. } => {
                                if !resolve(&shared_weak, id, Ok(data)) {
                                    break;
                                }
                            }
                            ChannelReceiveMessage::ResponseError { id, error, reason } => {
                                if !resolve(&shared_weak, id, Err(response_error(&error, reason)))
                                {
                                    break;
                                }
                            }
                        }
                    }

                    if let Some(shared) = shared_weak.upgrade() {
                        if shared.close() {
                            debug!("payload channel closed by the other side");
                        }
                    }
                })
                .detach();
        }

        let sender = {
            let (sender, receiver) = async_channel::bounded::<MessageWithPayload>(1);

            executor
                .spawn(async move {
                    let mut bytes = Vec::with_capacity(NS_MESSAGE_MAX_LEN);

                    while let Ok(message) = receiver.recv().await {
                        // Message and its payload are written back to back
                        bytes.clear();
                        utils::write_netstring(&mut bytes, &message.message);
                        utils::write_netstring(&mut bytes, &message.payload);

                        if let Err(error) = writer.write_all(&bytes).await {
                            error!("failed to write to payload channel: {}", error);
                            break;
                        }
                        if let Err(error) = writer.flush().await {
                            error!("failed to flush payload channel: {}", error);
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

    pub(crate) fn close(&self) {
        debug!("close()");

        self.inner.sender.close();
        self.inner.shared.close();
    }

    /// Fire-and-forget message with payload.
    pub(crate) async fn notify<N, H>(
        &self,
        handler_id: H,
        notification: N,
        payload: Bytes,
    ) -> Result<(), NotificationError>
    where
        N: Notification,
        H: fmt::Display,
    {
        if self.is_closed() {
            return Err(NotificationError::ChannelClosed);
        }

        let event = notification.as_event();

        debug!("notify() [event:{}]", event);

        let body = serde_json::to_string(&notification).map_err(|error| {
            NotificationError::FailedToSerialize {
                error: error.to_string(),
            }
        })?;
        let message = format!("n:{}:{}:{}", event, handler_id, body).into_bytes();

        if message.len() > NS_MESSAGE_MAX_LEN || payload.len() > NS_PAYLOAD_MAX_LEN {
            return Err(NotificationError::MessageTooLong);
        }

        self.inner
            .sender
            .send(MessageWithPayload { message, payload })
            .await
            .map_err(|_| NotificationError::ChannelClosed)
    }

    pub(crate) async fn request<R, H>(
        &self,
        handler_id: H,
        request: R,
        payload: Bytes,
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
            .request_internal(method, handler_id.to_string(), body, payload)
            .await?;

        parse_response(data)
    }

    /// Non-generic method to avoid significant duplication in final binary
    async fn request_internal(
        &self,
        method: &'static str,
        handler_id: String,
        body: String,
        payload: Bytes,
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

        let message = format!("r:{}:{}:{}:{}", id, method, handler_id, body).into_bytes();

        if message.len() > NS_MESSAGE_MAX_LEN || payload.len() > NS_PAYLOAD_MAX_LEN {
            shared.requests_container.lock().remove(id);
            return Err(RequestError::MessageTooLong);
        }

        if self
            .inner
            .sender
            .send(MessageWithPayload { message, payload })
            .await
            .is_err()
        {
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

        if let Err(error) = &result {
            debug!("request failed [method:{}, id:{}]: {}", method, id, error);
        }

        result
    }

    pub(crate) fn subscribe_to_notifications<F>(
        &self,
        target_id: SubscriptionTarget,
        callback: F,
    ) -> SubscriptionHandler
    where
        F: Fn(PayloadNotification) + Send + Sync + 'static,
    {
        self.inner
            .event_handlers
            .add(target_id, Box::new(callback))
    }
}

/// Returns `false` if the channel is gone and reading should stop.
fn dispatch_notification(
    event_handlers_weak: &WeakEventHandlers<PayloadNotification>,
    target_id: &Value,
    notification: PayloadNotification,
) -> bool {
    let event_handlers = match event_handlers_weak.upgrade() {
        Some(event_handlers) => event_handlers,
        None => {
            return false;
        }
    };

    match SubscriptionTarget::from_json(target_id) {
        Some(target_id) => {
            event_handlers.call_callbacks_with_value(&target_id, notification);
        }
        None => {
            warn!("notification with invalid target id: {}", target_id);
        }
    }

    true
}

fn resolve(
    shared_weak: &Weak<Shared>,
    id: u32,
    response: Result<Option<Value>, RequestError>,
) -> bool {
    match shared_weak.upgrade() {
        Some(shared) => {
            resolve_response(&shared.requests_container, id, response);
            true
        }
        None => false,
    }
}
