use crate::data_structures::AppData;
use crate::messages::{
    RouterCloseRtpObserverRequest, RtpObserverAddProducerRequest, RtpObserverPauseRequest,
    RtpObserverRemoveProducerRequest, RtpObserverResumeRequest,
};
use crate::producer::{Producer, ProducerId};
use crate::router::{RouterId, WeakRouter};
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, RequestError, SubscriptionHandler};
use async_trait::async_trait;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use hash_hasher::HashedMap;
use log::{debug, error};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

uuid_based_wrapper_type!(
    /// [`RtpObserver`] identifier.
    RtpObserverId
);

/// Options for adding producer to [`RtpObserver`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RtpObserverAddProducerOptions {
    /// The id of the Producer to be added.
    pub producer_id: ProducerId,
}

impl RtpObserverAddProducerOptions {
    /// Create options for the producer with given id.
    #[must_use]
    pub fn new(producer_id: ProducerId) -> Self {
        Self { producer_id }
    }
}

/// Error that caused [`RtpObserver::add_producer`] or [`RtpObserver::remove_producer`] to fail.
#[derive(Debug, Error)]
pub enum RtpObserverProducerError {
    /// RTP observer is already closed.
    #[error("RTP observer is closed")]
    Closed,
    /// Producer with specified id not found
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(#[from] RequestError),
}

/// An RTP observer inspects the media received by a set of selected producers.
///
/// mediasoup implements the following RTP observers:
/// * [`AudioLevelObserver`](crate::audio_level_observer::AudioLevelObserver)
/// * [`ActiveSpeakerObserver`](crate::active_speaker_observer::ActiveSpeakerObserver)
#[async_trait]
pub trait RtpObserver {
    /// RtpObserver id.
    #[must_use]
    fn id(&self) -> RtpObserverId;

    /// Id of the router this RTP observer belongs to.
    #[must_use]
    fn router_id(&self) -> RouterId;

    /// Whether the RtpObserver is paused.
    #[must_use]
    fn paused(&self) -> bool;

    #[must_use]
    fn app_data(&self) -> &AppData;

    #[must_use]
    fn closed(&self) -> bool;

    /// Producers currently observed.
    #[must_use]
    fn producers(&self) -> Vec<Producer>;

    /// Pauses the RTP observer. No RTP is inspected until resume() is called.
    async fn pause(&self) -> Result<(), RequestError>;

    /// Resumes the RTP observer. RTP is inspected again.
    async fn resume(&self) -> Result<(), RequestError>;

    /// Provides the RTP observer with a new producer to monitor.
    async fn add_producer(
        &self,
        rtp_observer_add_producer_options: RtpObserverAddProducerOptions,
    ) -> Result<(), RtpObserverProducerError>;

    /// Removes the given producer from the RTP observer.
    async fn remove_producer(&self, producer_id: ProducerId)
        -> Result<(), RtpObserverProducerError>;

    /// Closes the RTP observer.
    async fn close(&self);

    /// Callback is called when the RTP observer is paused.
    fn on_pause(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId;

    /// Callback is called when the RTP observer is resumed.
    fn on_resume(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId;

    /// Callback is called when a new producer is added into the RTP observer.
    fn on_add_producer(
        &self,
        callback: Box<dyn Fn(&Producer) + Send + Sync + 'static>,
    ) -> HandlerId;

    /// Callback is called when a producer is removed from the RTP observer.
    fn on_remove_producer(
        &self,
        callback: Box<dyn Fn(&Producer) + Send + Sync + 'static>,
    ) -> HandlerId;

    /// Callback is called when the router this RTP observer belongs to is closed for whatever
    /// reason. The RTP observer itself is also closed.
    fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId;

    /// Fires once whatever caused the close, immediately if already closed.
    fn on_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId;
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    add_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>>,
    remove_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>>,
    router_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct ObservedProducer {
    producer: Producer,
    _close_handler: HandlerId,
}

/// State and lifecycle shared by every RTP observer kind, owned by the router.
pub(crate) struct RtpObserverCommon {
    id: RtpObserverId,
    router_id: RouterId,
    router: WeakRouter,
    channel: Channel,
    paused: AtomicBool,
    app_data: AppData,
    handlers: Handlers,
    producers: Mutex<HashedMap<ProducerId, ObservedProducer>>,
    closed: AtomicBool,
    subscription_handler: Mutex<Option<SubscriptionHandler>>,
}

impl fmt::Debug for RtpObserverCommon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpObserverCommon")
            .field("id", &self.id)
            .field("router_id", &self.router_id)
            .field("paused", &self.paused)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RtpObserverCommon {
    pub(super) fn new(
        id: RtpObserverId,
        router_id: RouterId,
        router: WeakRouter,
        channel: Channel,
        app_data: AppData,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            router_id,
            router,
            channel,
            paused: AtomicBool::new(false),
            app_data,
            handlers: Handlers::default(),
            producers: Mutex::default(),
            closed: AtomicBool::new(false),
            subscription_handler: Mutex::default(),
        })
    }

    pub(super) fn id(&self) -> RtpObserverId {
        self.id
    }

    pub(super) fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub(super) fn router(&self) -> &WeakRouter {
        &self.router
    }

    pub(super) fn channel(&self) -> &Channel {
        &self.channel
    }

    pub(super) fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(super) fn app_data(&self) -> &AppData {
        &self.app_data
    }

    pub(super) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(super) fn set_subscription_handler(&self, subscription_handler: SubscriptionHandler) {
        self.subscription_handler
            .lock()
            .replace(subscription_handler);
    }

    pub(super) fn producers(&self) -> Vec<Producer> {
        self.producers
            .lock()
            .values()
            .map(|observed| observed.producer.clone())
            .collect()
    }

    pub(super) async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Ok(());
        }

        self.channel
            .request(self.id, RtpObserverPauseRequest {})
            .await?;

        let was_paused = self.paused.swap(true, Ordering::SeqCst);

        if !was_paused {
            self.handlers.pause.call_simple();
        }

        Ok(())
    }

    pub(super) async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Ok(());
        }

        self.channel
            .request(self.id, RtpObserverResumeRequest {})
            .await?;

        let was_paused = self.paused.swap(false, Ordering::SeqCst);

        if was_paused {
            self.handlers.resume.call_simple();
        }

        Ok(())
    }

    pub(super) async fn add_producer(
        self: &Arc<Self>,
        RtpObserverAddProducerOptions { producer_id }: RtpObserverAddProducerOptions,
    ) -> Result<(), RtpObserverProducerError> {
        debug!("add_producer()");

        if self.closed() {
            return Err(RtpObserverProducerError::Closed);
        }

        let producer = self
            .router
            .upgrade()
            .and_then(|router| router.get_producer(&producer_id))
            .ok_or(RtpObserverProducerError::ProducerNotFound(producer_id))?;

        self.channel
            .request(self.id, RtpObserverAddProducerRequest { producer_id })
            .await?;

        let close_handler = producer.on_close({
            let common_weak = Arc::downgrade(self);

            move || {
                if let Some(common) = common_weak.upgrade() {
                    common.producers.lock().remove(&producer_id);
                }
            }
        });

        self.producers.lock().insert(
            producer_id,
            ObservedProducer {
                producer: producer.clone(),
                _close_handler: close_handler,
            },
        );

        self.handlers.add_producer.call(|callback| {
            callback(&producer);
        });

        Ok(())
    }

    pub(super) async fn remove_producer(
        &self,
        producer_id: ProducerId,
    ) -> Result<(), RtpObserverProducerError> {
        debug!("remove_producer()");

        if self.closed() {
            return Err(RtpObserverProducerError::Closed);
        }

        let producer = self
            .router
            .upgrade()
            .and_then(|router| router.get_producer(&producer_id))
            .ok_or(RtpObserverProducerError::ProducerNotFound(producer_id))?;

        self.channel
            .request(self.id, RtpObserverRemoveProducerRequest { producer_id })
            .await?;

        let removed = self.producers.lock().remove(&producer_id);
        drop(removed);

        self.handlers.remove_producer.call(|callback| {
            callback(&producer);
        });

        Ok(())
    }

    fn finish_close(&self) {
        self.subscription_handler.lock().take();
        let producers = std::mem::take(&mut *self.producers.lock());
        drop(producers);
    }

    pub(super) async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = self
            .channel
            .request(
                self.router_id,
                RouterCloseRtpObserverRequest {
                    rtp_observer_id: self.id,
                },
            )
            .await
        {
            error!("rtp observer closing failed: {}", error);
        }

        self.finish_close();
        self.handlers.close.call_simple();
    }

    /// Router this observer belongs to was closed, worker side observer is gone already.
    pub(crate) fn router_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("router_closed()");

        self.finish_close();
        self.handlers.router_close.call_simple();
        self.handlers.close.call_simple();
    }

    pub(super) fn on_pause(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId {
        self.handlers.pause.add(Arc::from(callback))
    }

    pub(super) fn on_resume(&self, callback: Box<dyn Fn() + Send + Sync + 'static>) -> HandlerId {
        self.handlers.resume.add(Arc::from(callback))
    }

    pub(super) fn on_add_producer(
        &self,
        callback: Box<dyn Fn(&Producer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.add_producer.add(Arc::from(callback))
    }

    pub(super) fn on_remove_producer(
        &self,
        callback: Box<dyn Fn(&Producer) + Send + Sync + 'static>,
    ) -> HandlerId {
        self.handlers.remove_producer.add(Arc::from(callback))
    }

    pub(super) fn on_router_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId {
        self.handlers.router_close.add(callback)
    }

    pub(super) fn on_close(&self, callback: Box<dyn FnOnce() + Send + 'static>) -> HandlerId {
        let handler_id = self.handlers.close.add(callback);
        if self.closed() {
            self.handlers.close.call_simple();
        }
        handler_id
    }
}

/// Implements [`RtpObserver`] for a type holding `common: Arc<RtpObserverCommon>`.
macro_rules! rtp_observer_impl {
    ($observer: ident) => {
        #[async_trait::async_trait]
        impl $crate::rtp_observer::RtpObserver for $observer {
            fn id(&self) -> $crate::rtp_observer::RtpObserverId {
                self.common.id()
            }

            fn router_id(&self) -> $crate::router::RouterId {
                self.common.router_id()
            }

            fn paused(&self) -> bool {
                self.common.paused()
            }

            fn app_data(&self) -> &$crate::data_structures::AppData {
                self.common.app_data()
            }

            fn closed(&self) -> bool {
                self.common.closed()
            }

            fn producers(&self) -> Vec<$crate::producer::Producer> {
                self.common.producers()
            }

            async fn pause(&self) -> Result<(), $crate::worker::RequestError> {
                self.common.pause().await
            }

            async fn resume(&self) -> Result<(), $crate::worker::RequestError> {
                self.common.resume().await
            }

            async fn add_producer(
                &self,
                rtp_observer_add_producer_options: $crate::rtp_observer::RtpObserverAddProducerOptions,
            ) -> Result<(), $crate::rtp_observer::RtpObserverProducerError> {
                self.common
                    .add_producer(rtp_observer_add_producer_options)
                    .await
            }

            async fn remove_producer(
                &self,
                producer_id: $crate::producer::ProducerId,
            ) -> Result<(), $crate::rtp_observer::RtpObserverProducerError> {
                self.common.remove_producer(producer_id).await
            }

            async fn close(&self) {
                self.common.close().await;
            }

            fn on_pause(
                &self,
                callback: Box<dyn Fn() + Send + Sync + 'static>,
            ) -> event_listener_primitives::HandlerId {
                self.common.on_pause(callback)
            }

            fn on_resume(
                &self,
                callback: Box<dyn Fn() + Send + Sync + 'static>,
            ) -> event_listener_primitives::HandlerId {
                self.common.on_resume(callback)
            }

            fn on_add_producer(
                &self,
                callback: Box<dyn Fn(&$crate::producer::Producer) + Send + Sync + 'static>,
            ) -> event_listener_primitives::HandlerId {
                self.common.on_add_producer(callback)
            }

            fn on_remove_producer(
                &self,
                callback: Box<dyn Fn(&$crate::producer::Producer) + Send + Sync + 'static>,
            ) -> event_listener_primitives::HandlerId {
                self.common.on_remove_producer(callback)
            }

            fn on_router_close(
                &self,
                callback: Box<dyn FnOnce() + Send + 'static>,
            ) -> event_listener_primitives::HandlerId {
                self.common.on_router_close(callback)
            }

            fn on_close(
                &self,
                callback: Box<dyn FnOnce() + Send + 'static>,
            ) -> event_listener_primitives::HandlerId {
                self.common.on_close(callback)
            }
        }
    };
}

pub(super) use rtp_observer_impl;
