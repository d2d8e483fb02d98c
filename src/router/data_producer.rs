
use crate::data_structures::{AppData, WebRtcMessage};
use crate::messages::{
    DataProducerDumpRequest, DataProducerGetStatsRequest, DataProducerPauseRequest,
    DataProducerResumeRequest, DataProducerSendNotification, TransportCloseDataProducerRequest,
};
use crate::sctp_parameters::SctpStreamParameters;
use crate::transport::TransportId;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, NotificationError, PayloadChannel, RequestError};
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    DataProducerId
);

/// Arguments of [`Transport::produce_data`](crate::transport::Transport::produce_data).
///
/// SCTP transports need stream parameters, a direct transport must not get any, which is what
/// the two constructors enforce.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DataProducerOptions {
    /// Only set for the mirror created on the far side of a pipe transport.
    pub(super) id: Option<DataProducerId>,
    pub(super) sctp_stream_parameters: Option<SctpStreamParameters>,
    /// Free-form data channel label.
    pub label: String,
    /// Free-form data channel sub-protocol.
    pub protocol: String,
    pub paused: bool,
    pub app_data: AppData,
}

impl DataProducerOptions {
    fn with_stream(
        id: Option<DataProducerId>,
        sctp_stream_parameters: Option<SctpStreamParameters>,
    ) -> Self {
        Self {
            id,
            sctp_stream_parameters,
            label: String::new(),
            protocol: String::new(),
            paused: false,
            app_data: AppData::default(),
        }
    }

    /// Mirror of `data_producer_id` on a pipe transport.
    #[must_use]
    pub(crate) fn new_pipe_transport(
        data_producer_id: DataProducerId,
        sctp_stream_parameters: SctpStreamParameters,
    ) -> Self {
        Self::with_stream(Some(data_producer_id), Some(sctp_stream_parameters))
    }

    /// For WebRTC, plain and pipe transports with SCTP enabled.
    #[must_use]
    pub fn new_sctp(sctp_stream_parameters: SctpStreamParameters) -> Self {
        Self::with_stream(None, Some(sctp_stream_parameters))
    }

    /// For [`DirectTransport`](crate::direct_transport::DirectTransport).
    #[must_use]
    pub fn new_direct() -> Self {
        Self::with_stream(None, None)
    }

    /// SCTP stream parameters, if any.
    #[must_use]
    pub fn sctp_stream_parameters(&self) -> Option<SctpStreamParameters> {
        self.sctp_stream_parameters
    }
}

/// Where messages come from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataProducerType {
    /// An SCTP stream of the remote endpoint.
    Sctp,
    /// [`DirectDataProducer::send`] calls in this process.
    Direct,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct DataProducerDump {
    pub id: DataProducerId,
    pub r#type: DataProducerType,
    pub label: String,
    pub protocol: String,
    pub sctp_stream_parameters: Option<SctpStreamParameters>,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct DataProducerStat {
    // `type` field is present in worker, but ignored here
    pub timestamp: u64,
    pub label: String,
    pub protocol: String,
    pub messages_received: u64,
    pub bytes_received: u64,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: DataProducerId,
    r#type: DataProducerType,
    sctp_stream_parameters: Option<SctpStreamParameters>,
    label: String,
    protocol: String,
    paused: AtomicBool,
    transport_id: TransportId,
    channel: Channel,
    payload_channel: PayloadChannel,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
}

/// Data producer created on transport other than
/// [`DirectTransport`](crate::direct_transport::DirectTransport).
#[derive(Clone)]
pub struct RegularDataProducer {
    inner: Arc<Inner>,
}

impl fmt::Debug for RegularDataProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegularDataProducer")
            .field("id", &self.inner.id)
            .field("type", &self.inner.r#type)
            .field("sctp_stream_parameters", &self.inner.sctp_stream_parameters)
            .field("label", &self.inner.label)
            .field("protocol", &self.inner.protocol)
            .field("transport_id", &self.inner.transport_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl From<RegularDataProducer> for DataProducer {
    fn from(producer: RegularDataProducer) -> Self {
        DataProducer::Regular(producer)
    }
}

/// Data producer created on [`DirectTransport`](crate::direct_transport::DirectTransport).
#[derive(Clone)]
pub struct DirectDataProducer {
    inner: Arc<Inner>,
}

impl fmt::Debug for DirectDataProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectDataProducer")
            .field("id", &self.inner.id)
            .field("type", &self.inner.r#type)
            .field("label", &self.inner.label)
            .field("protocol", &self.inner.protocol)
            .field("transport_id", &self.inner.transport_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl From<DirectDataProducer> for DataProducer {
    fn from(producer: DirectDataProducer) -> Self {
        DataProducer::Direct(producer)
    }
}

/// Source of data channel messages entering a router, either an SCTP stream or, on a
/// [`DirectTransport`](crate::direct_transport::DirectTransport), this process.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DataProducer {
    /// Data producer created on transport other than
    /// [`DirectTransport`](crate::direct_transport::DirectTransport).
    Regular(RegularDataProducer),
    /// Data producer created on [`DirectTransport`](crate::direct_transport::DirectTransport).
    Direct(DirectDataProducer),
}

impl DataProducer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: DataProducerId,
        r#type: DataProducerType,
        sctp_stream_parameters: Option<SctpStreamParameters>,
        label: String,
        protocol: String,
        paused: bool,
        transport_id: TransportId,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
        direct: bool,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            r#type,
            sctp_stream_parameters,
            label,
            protocol,
            paused: AtomicBool::new(paused),
            transport_id,
            channel,
            payload_channel,
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
        });

        if direct {
            Self::Direct(DirectDataProducer { inner })
        } else {
            Self::Regular(RegularDataProducer { inner })
        }
    }

    #[must_use]
    pub fn id(&self) -> DataProducerId {
        self.inner().id
    }

    #[must_use]
    pub fn transport_id(&self) -> TransportId {
        self.inner().transport_id
    }

    #[must_use]
    pub fn r#type(&self) -> DataProducerType {
        self.inner().r#type
    }

    /// `None` for direct data producers.
    #[must_use]
    pub fn sctp_stream_parameters(&self) -> Option<SctpStreamParameters> {
        self.inner().sctp_stream_parameters
    }

    #[must_use]
    pub fn label(&self) -> &String {
        &self.inner().label
    }

    #[must_use]
    pub fn protocol(&self) -> &String {
        &self.inner().protocol
    }

    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner().paused.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner().app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner().closed.load(Ordering::SeqCst)
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<DataProducerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner()
            .channel
            .request(self.id(), DataProducerDumpRequest {})
            .await
    }

    pub async fn get_stats(&self) -> Result<Vec<DataProducerStat>, RequestError> {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner()
            .channel
            .request(self.id(), DataProducerGetStatsRequest {})
            .await
    }

    /// Messages stop reaching data consumers, which get a `dataproducerpause` notification.
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Ok(());
        }

        self.inner()
            .channel
            .request(self.id(), DataProducerPauseRequest {})
            .await?;

        let was_paused = self.inner().paused.swap(true, Ordering::SeqCst);

        if !was_paused {
            self.inner().handlers.pause.call_simple();
        }

        Ok(())
    }

    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Ok(());
        }

        self.inner()
            .channel
            .request(self.id(), DataProducerResumeRequest {})
            .await?;

        let was_paused = self.inner().paused.swap(false, Ordering::SeqCst);

        if was_paused {
            self.inner().handlers.resume.call_simple();
        }

        Ok(())
    }

    /// Closes this data producer and, on the worker side, its data consumers. Idempotent.
    pub async fn close(&self) {
        let inner = self.inner();

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request(
                inner.transport_id,
                TransportCloseDataProducerRequest {
                    data_producer_id: inner.id,
                },
            )
            .await
        {
            error!("data producer closing failed: {}", error);
        }

        inner.handlers.close.call_simple();
    }

    /// Transport this data producer belongs to was closed.
    pub(super) fn transport_closed(&self) {
        let inner = self.inner();

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("transport_closed()");

        inner.handlers.transport_close.call_simple();
        inner.handlers.close.call_simple();
    }

    /// Edge triggered, repeated pauses fire once.
    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner().handlers.pause.add(Arc::new(callback))
    }

    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner().handlers.resume.add(Arc::new(callback))
    }

    /// Owning transport closed, fired right before the close handlers.
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner().handlers.transport_close.add(Box::new(callback))
    }

    /// Fires once whatever caused the close, immediately if already closed.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner().handlers.close.add(Box::new(callback));
        if self.inner().closed.load(Ordering::Relaxed) {
            self.inner().handlers.close.call_simple();
        }
        handler_id
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakDataProducer {
        WeakDataProducer {
            inner: Arc::downgrade(self.inner()),
        }
    }

    fn inner(&self) -> &Arc<Inner> {
        match self {
            DataProducer::Regular(data_producer) => &data_producer.inner,
            DataProducer::Direct(data_producer) => &data_producer.inner,
        }
    }
}

impl DirectDataProducer {
    /// Injects a message, the PPID is derived from the [`WebRtcMessage`] variant.
    pub async fn send(&self, message: WebRtcMessage) -> Result<(), NotificationError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (ppid, payload) = message.into_ppid_and_payload();

        self.inner
            .payload_channel
            .notify(
                self.inner.id,
                DataProducerSendNotification { ppid },
                payload,
            )
            .await
    }
}

/// Non-owning handle to a [`DataProducer`].
#[derive(Clone)]
pub struct WeakDataProducer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakDataProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDataProducer").finish()
    }
}

impl WeakDataProducer {
    #[must_use]
    pub fn upgrade(&self) -> Option<DataProducer> {
        let inner = self.inner.upgrade()?;

        let data_producer = if inner.r#type == DataProducerType::Direct {
            DataProducer::Direct(DirectDataProducer { inner })
        } else {
            DataProducer::Regular(RegularDataProducer { inner })
        };

        Some(data_producer)
    }
}
