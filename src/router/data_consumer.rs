
use crate::data_producer::{DataProducer, DataProducerId};
use crate::data_structures::{AppData, WebRtcMessage};
use crate::messages::{
    DataConsumerDumpRequest, DataConsumerGetBufferedAmountRequest, DataConsumerGetStatsRequest,
    DataConsumerPauseRequest, DataConsumerResumeRequest, DataConsumerSendRequest,
    DataConsumerSetBufferedAmountLowThresholdRequest, TransportCloseDataConsumerRequest,
};
use crate::sctp_parameters::SctpStreamParameters;
use crate::transport::TransportId;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError, SubscriptionHandler};
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// [`DataConsumer`] identifier.
    DataConsumerId
);

/// [`DataConsumer`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DataConsumerOptions {
    /// The id of the data producer to consume.
    pub data_producer_id: DataProducerId,
    /// Just if consuming over SCTP.
    /// Whether data messages must be received in order. If true the messages will be sent
    /// reliably. Defaults to the value in the DataProducer if it has type `Sctp` or to `true` if
    /// it has type `Direct`.
    pub ordered: Option<bool>,
    /// Just if consuming over SCTP.
    /// When ordered is false indicates the time (in milliseconds) after which a SCTP packet will
    /// stop being retransmitted.
    pub max_packet_life_time: Option<u16>,
    /// Just if consuming over SCTP.
    /// When ordered is false indicates the maximum number of times a packet will be retransmitted.
    pub max_retransmits: Option<u16>,
    /// Whether the data consumer must start in paused mode. Default false.
    pub paused: bool,
    pub app_data: AppData,
}

impl DataConsumerOptions {
    /// Inherits parameters of corresponding data producer.
    #[must_use]
    pub fn new_sctp(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: None,
            max_packet_life_time: None,
            max_retransmits: None,
            paused: false,
            app_data: AppData::default(),
        }
    }

    /// For [`DirectTransport`](crate::direct_transport::DirectTransport).
    #[must_use]
    pub fn new_direct(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: None,
            max_packet_life_time: None,
            max_retransmits: None,
            paused: false,
            app_data: AppData::default(),
        }
    }

    /// Messages will be sent reliably in order.
    #[must_use]
    pub fn new_sctp_ordered(data_producer_id: DataProducerId) -> Self {
        Self {
            data_producer_id,
            ordered: Some(true),
            max_packet_life_time: None,
            max_retransmits: None,
            paused: false,
            app_data: AppData::default(),
        }
    }

    /// Messages will be sent unreliably with time (in milliseconds) after which a SCTP packet will
    /// stop being retransmitted.
    #[must_use]
    pub fn new_sctp_unordered_with_life_time(
        data_producer_id: DataProducerId,
        max_packet_life_time: u16,
    ) -> Self {
        Self {
            data_producer_id,
            ordered: Some(false),
            max_packet_life_time: Some(max_packet_life_time),
            max_retransmits: None,
            paused: false,
            app_data: AppData::default(),
        }
    }

    /// Messages will be sent unreliably with a limited number of retransmission attempts.
    #[must_use]
    pub fn new_sctp_unordered_with_retransmits(
        data_producer_id: DataProducerId,
        max_retransmits: u16,
    ) -> Self {
        Self {
            data_producer_id,
            ordered: Some(false),
            max_packet_life_time: None,
            max_retransmits: Some(max_retransmits),
            paused: false,
            app_data: AppData::default(),
        }
    }
}

/// Data consumer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataConsumerType {
    /// The endpoint receives messages using the SCTP protocol.
    Sctp,
    /// Messages are received directly by the Rust process over a direct transport.
    Direct,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct DataConsumerDump {
    pub id: DataConsumerId,
    pub data_producer_id: DataProducerId,
    pub r#type: DataConsumerType,
    pub label: String,
    pub protocol: String,
    pub sctp_stream_parameters: Option<SctpStreamParameters>,
    #[serde(default)]
    pub buffered_amount_low_threshold: u32,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub data_producer_paused: bool,
}

/// RTC statistics of the data consumer.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct DataConsumerStat {
    // `type` field is present in worker, but ignored here
    pub timestamp: u64,
    pub label: String,
    pub protocol: String,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    #[serde(default)]
    pub buffered_amount: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    DataProducerClose,
    DataProducerPause,
    DataProducerResume,
    SctpSendBufferFull,
    #[serde(rename_all = "camelCase")]
    BufferedAmountLow {
        buffered_amount: u32,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum PayloadNotification {
    Message { ppid: u32 },
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    message: Bag<Arc<dyn Fn(&WebRtcMessage) + Send + Sync>>,
    sctp_send_buffer_full: Bag<Arc<dyn Fn() + Send + Sync>>,
    buffered_amount_low: Bag<Arc<dyn Fn(u32) + Send + Sync>>,
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    data_producer_pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    data_producer_resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    data_producer_close: BagOnce<Box<dyn FnOnce() + Send>>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

#[derive(Debug, Copy, Clone)]
struct PausedState {
    paused: bool,
    data_producer_paused: bool,
}

impl PausedState {
    fn effective(self) -> bool {
        self.paused || self.data_producer_paused
    }
}

struct Inner {
    id: DataConsumerId,
    r#type: DataConsumerType,
    sctp_stream_parameters: Option<SctpStreamParameters>,
    label: String,
    protocol: String,
    data_producer_id: DataProducerId,
    paused_state: Mutex<PausedState>,
    buffered_amount_low_threshold: Mutex<u32>,
    transport_id: TransportId,
    channel: Channel,
    payload_channel: PayloadChannel,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
    subscription_handlers: Mutex<Vec<SubscriptionHandler>>,
    data_producer_close_handler: Mutex<Option<HandlerId>>,
}

impl Inner {
    fn handle_notification(&self, notification: Notification) {
        match notification {
            Notification::DataProducerClose => {
                self.data_producer_closed();
            }
            Notification::DataProducerPause => {
                self.set_data_producer_paused(true);
            }
            Notification::DataProducerResume => {
                self.set_data_producer_paused(false);
            }
            Notification::SctpSendBufferFull => {
                self.handlers.sctp_send_buffer_full.call_simple();
            }
            Notification::BufferedAmountLow { buffered_amount } => {
                self.handlers.buffered_amount_low.call(|callback| {
                    callback(buffered_amount);
                });
            }
        }
    }

    fn set_data_producer_paused(&self, data_producer_paused: bool) {
        let (before, after) = {
            let mut paused_state = self.paused_state.lock();
            let before = *paused_state;
            paused_state.data_producer_paused = data_producer_paused;
            (before, *paused_state)
        };

        if before.data_producer_paused == after.data_producer_paused {
            return;
        }

        if data_producer_paused {
            self.handlers.data_producer_pause.call_simple();
        } else {
            self.handlers.data_producer_resume.call_simple();
        }

        self.emit_paused_edge(before, after);
    }

    fn emit_paused_edge(&self, before: PausedState, after: PausedState) {
        match (before.effective(), after.effective()) {
            (false, true) => {
                self.handlers.pause.call_simple();
            }
            (true, false) => {
                self.handlers.resume.call_simple();
            }
            _ => {}
        }
    }

    fn data_producer_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("data_producer_closed()");

        self.subscription_handlers.lock().clear();
        self.handlers.data_producer_close.call_simple();
        self.handlers.close.call_simple();
    }
}

/// A data consumer represents an endpoint capable of receiving data messages from a router.
/// A data consumer can use SCTP (AKA DataChannel) to receive those messages, or can directly
/// receive them in the Rust application if the data consumer was created on top of a
/// [`DirectTransport`](crate::direct_transport::DirectTransport).
#[derive(Clone)]
pub struct DataConsumer {
    inner: Arc<Inner>,
}

impl fmt::Debug for DataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConsumer")
            .field("id", &self.inner.id)
            .field("type", &self.inner.r#type)
            .field("sctp_stream_parameters", &self.inner.sctp_stream_parameters)
            .field("label", &self.inner.label)
            .field("protocol", &self.inner.protocol)
            .field("data_producer_id", &self.inner.data_producer_id)
            .field("paused_state", &self.inner.paused_state)
            .field("transport_id", &self.inner.transport_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl DataConsumer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: DataConsumerId,
        r#type: DataConsumerType,
        sctp_stream_parameters: Option<SctpStreamParameters>,
        label: String,
        protocol: String,
        paused: bool,
        data_producer: &DataProducer,
        data_producer_paused: bool,
        transport_id: TransportId,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            r#type,
            sctp_stream_parameters,
            label,
            protocol,
            data_producer_id: data_producer.id(),
            paused_state: Mutex::new(PausedState {
                paused,
                data_producer_paused,
            }),
            buffered_amount_low_threshold: Mutex::new(0),
            transport_id,
            channel,
            payload_channel,
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            subscription_handlers: Mutex::default(),
            data_producer_close_handler: Mutex::default(),
        });

        let inner_weak = Arc::downgrade(&inner);

        let subscription_handler = inner.channel.subscribe_to_notifications(id.into(), {
            let inner_weak = Weak::clone(&inner_weak);

            move |notification| match serde_json::from_value::<Notification>(notification) {
                Ok(notification) => {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.handle_notification(notification);
                    }
                }
                Err(error) => {
                    error!("Failed to parse notification: {}", error);
                }
            }
        });

        let payload_subscription_handler =
            inner
                .payload_channel
                .subscribe_to_notifications(id.into(), {
                    let inner_weak = Weak::clone(&inner_weak);

                    move |notification| {
                        match serde_json::from_value::<PayloadNotification>(notification.message)
                        {
                            Ok(PayloadNotification::Message { ppid }) => {
                                match WebRtcMessage::new(ppid, notification.payload) {
                                    Ok(message) => {
                                        if let Some(inner) = inner_weak.upgrade() {
                                            inner.handlers.message.call(|callback| {
                                                callback(&message);
                                            });
                                        }
                                    }
                                    Err(error) => {
                                        error!("Failed to decode data consumer message: {}", error);
                                    }
                                }
                            }
                            Err(error) => {
                                error!("Failed to parse payload notification: {}", error);
                            }
                        }
                    }
                });

        *inner.subscription_handlers.lock() =
            vec![subscription_handler, payload_subscription_handler];

        let data_producer_close_handler = data_producer.on_close(move || {
            if let Some(inner) = inner_weak.upgrade() {
                inner.data_producer_closed();
            }
        });
        inner
            .data_producer_close_handler
            .lock()
            .replace(data_producer_close_handler);

        Self { inner }
    }

    /// Data consumer id.
    #[must_use]
    pub fn id(&self) -> DataConsumerId {
        self.inner.id
    }

    /// The associated data producer identifier.
    #[must_use]
    pub fn data_producer_id(&self) -> DataProducerId {
        self.inner.data_producer_id
    }

    /// Id of the transport this data consumer belongs to.
    #[must_use]
    pub fn transport_id(&self) -> TransportId {
        self.inner.transport_id
    }

    /// The type of the data consumer.
    #[must_use]
    pub fn r#type(&self) -> DataConsumerType {
        self.inner.r#type
    }

    /// The SCTP stream parameters (just if the data consumer type is `Sctp`).
    #[must_use]
    pub fn sctp_stream_parameters(&self) -> Option<SctpStreamParameters> {
        self.inner.sctp_stream_parameters
    }

    /// The data consumer label.
    #[must_use]
    pub fn label(&self) -> &String {
        &self.inner.label
    }

    /// The data consumer sub-protocol.
    #[must_use]
    pub fn protocol(&self) -> &String {
        &self.inner.protocol
    }

    /// Whether the data consumer is paused. It does not take into account whether the associated
    /// data producer is paused.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner.paused_state.lock().paused
    }

    /// Whether the associated data producer is paused.
    #[must_use]
    pub fn data_producer_paused(&self) -> bool {
        self.inner.paused_state.lock().data_producer_paused
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<DataConsumerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(self.id(), DataConsumerDumpRequest {})
            .await
    }

    /// Returns current statistics of the data consumer.
    pub async fn get_stats(&self) -> Result<Vec<DataConsumerStat>, RequestError> {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(self.id(), DataConsumerGetStatsRequest {})
            .await
    }

    /// Pauses the data consumer (no messages are sent to the consuming endpoint).
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), DataConsumerPauseRequest {})
            .await?;

        let (before, after) = {
            let mut paused_state = self.inner.paused_state.lock();
            let before = *paused_state;
            paused_state.paused = true;
            (before, *paused_state)
        };

        self.inner.emit_paused_edge(before, after);

        Ok(())
    }

    /// Resumes the data consumer (messages are sent again to the consuming endpoint).
    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), DataConsumerResumeRequest {})
            .await?;

        let (before, after) = {
            let mut paused_state = self.inner.paused_state.lock();
            let before = *paused_state;
            paused_state.paused = false;
            (before, *paused_state)
        };

        self.inner.emit_paused_edge(before, after);

        Ok(())
    }

    /// Returns the number of bytes of data currently buffered to be sent over the underlying SCTP
    /// association.
    ///
    /// # Notes on usage
    /// The underlying SCTP association uses a common send buffer for all data consumers, hence the
    /// value given by this method indicates the data buffered for all data consumers in the
    /// transport.
    pub async fn get_buffered_amount(&self) -> Result<u32, RequestError> {
        debug!("get_buffered_amount()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let response = self
            .inner
            .channel
            .request(self.id(), DataConsumerGetBufferedAmountRequest {})
            .await?;

        Ok(response.buffered_amount)
    }

    /// Whenever the underlying SCTP association buffered bytes drop to this value,
    /// [`DataConsumer::on_buffered_amount_low`] callback is called.
    pub async fn set_buffered_amount_low_threshold(
        &self,
        threshold: u32,
    ) -> Result<(), RequestError> {
        debug!(
            "set_buffered_amount_low_threshold() [threshold:{}]",
            threshold
        );

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(
                self.id(),
                DataConsumerSetBufferedAmountLowThresholdRequest { threshold },
            )
            .await?;

        *self.inner.buffered_amount_low_threshold.lock() = threshold;

        Ok(())
    }

    /// Last threshold set with [`DataConsumer::set_buffered_amount_low_threshold`].
    #[must_use]
    pub fn buffered_amount_low_threshold(&self) -> u32 {
        *self.inner.buffered_amount_low_threshold.lock()
    }

    /// Sends direct messages from the Rust process to the consuming endpoint.
    pub async fn send(&self, message: WebRtcMessage) -> Result<(), RequestError> {
        debug!("send()");

        if self.closed() {
            return Ok(());
        }

        let (ppid, payload) = message.into_ppid_and_payload();

        self.inner
            .payload_channel
            .request(self.id(), DataConsumerSendRequest { ppid }, payload)
            .await
    }

    /// Closes the data consumer.
    ///
    /// Does nothing if the data consumer is already closed.
    pub async fn close(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request(
                inner.transport_id,
                TransportCloseDataConsumerRequest {
                    data_consumer_id: inner.id,
                },
            )
            .await
        {
            error!("data consumer closing failed: {}", error);
        }

        inner.subscription_handlers.lock().clear();
        inner.data_producer_close_handler.lock().take();
        inner.handlers.close.call_simple();
    }

    /// Transport this data consumer belongs to was closed.
    pub(super) fn transport_closed(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("transport_closed()");

        inner.subscription_handlers.lock().clear();
        inner.data_producer_close_handler.lock().take();
        inner.handlers.transport_close.call_simple();
        inner.handlers.close.call_simple();
    }

    /// Callback is called when a message has been received from the corresponding data producer.
    ///
    /// # Notes on usage
    /// Just available in direct transports, this is, those created via
    /// [`Router::create_direct_transport`](crate::router::Router::create_direct_transport).
    pub fn on_message<F: Fn(&WebRtcMessage) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.message.add(Arc::new(callback))
    }

    /// Callback is called when a message could not be sent because the SCTP send buffer was full.
    pub fn on_sctp_send_buffer_full<F: Fn() + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .sctp_send_buffer_full
            .add(Arc::new(callback))
    }

    /// Emitted when the underlying SCTP association buffered bytes drop down to the value set with
    /// [`DataConsumer::set_buffered_amount_low_threshold`].
    pub fn on_buffered_amount_low<F: Fn(u32) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.buffered_amount_low.add(Arc::new(callback))
    }

    /// Callback is called when the data consumer or its associated data producer is paused and,
    /// as result, the data consumer becomes paused.
    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.pause.add(Arc::new(callback))
    }

    /// Callback is called when the data consumer or its associated data producer is resumed and,
    /// as result, the data consumer is no longer paused.
    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.resume.add(Arc::new(callback))
    }

    /// Callback is called when the associated data producer is paused.
    pub fn on_data_producer_pause<F: Fn() + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.data_producer_pause.add(Arc::new(callback))
    }

    /// Callback is called when the associated data producer is resumed.
    pub fn on_data_producer_resume<F: Fn() + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.data_producer_resume.add(Arc::new(callback))
    }

    /// Callback is called when the associated data producer is closed for whatever reason. The
    /// data consumer itself is also closed.
    pub fn on_data_producer_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner
            .handlers
            .data_producer_close
            .add(Box::new(callback))
    }

    /// Owning transport closed, fired right before the close handlers.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
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
    pub fn downgrade(&self) -> WeakDataConsumer {
        WeakDataConsumer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`DataConsumer`].
#[derive(Clone)]
pub struct WeakDataConsumer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakDataConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDataConsumer").finish()
    }
}

impl WeakDataConsumer {
    #[must_use]
    pub fn upgrade(&self) -> Option<DataConsumer> {
        let inner = self.inner.upgrade()?;

        Some(DataConsumer { inner })
    }
}
