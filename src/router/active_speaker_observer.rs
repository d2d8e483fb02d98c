
use super::rtp_observer::{rtp_observer_impl, RtpObserverCommon};
use crate::data_structures::AppData;
use crate::producer::{Producer, ProducerId};
use event_listener_primitives::{Bag, HandlerId};
use log::{debug, error};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ActiveSpeakerObserverOptions {
    /// Milliseconds between two evaluations, 300 by default.
    pub interval: u16,
    pub app_data: AppData,
}

impl Default for ActiveSpeakerObserverOptions {
    fn default() -> Self {
        Self {
            interval: 300,
            app_data: AppData::default(),
        }
    }
}

/// Payload of [`ActiveSpeakerObserver::on_dominant_speaker`].
#[derive(Debug, Clone)]
pub struct ActiveSpeakerObserverDominantSpeaker {
    pub producer: Producer,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    dominant_speaker: Bag<Arc<dyn Fn(&ActiveSpeakerObserverDominantSpeaker) + Send + Sync>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DominantSpeakerNotification {
    producer_id: ProducerId,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    DominantSpeaker(DominantSpeakerNotification),
}

/// Picks the dominant speaker among the audio producers added to it.
///
/// Detection runs in the worker on RFC 6464 audio level header extensions, no audio is decoded.
/// Adding a video producer is rejected by the worker.
#[derive(Clone)]
pub struct ActiveSpeakerObserver {
    common: Arc<RtpObserverCommon>,
    handlers: Arc<Handlers>,
}

impl fmt::Debug for ActiveSpeakerObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSpeakerObserver")
            .field("common", &self.common)
            .finish()
    }
}

rtp_observer_impl!(ActiveSpeakerObserver);

impl ActiveSpeakerObserver {
    pub(super) fn new(common: Arc<RtpObserverCommon>) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();

        let subscription_handler = {
            let handlers = Arc::clone(&handlers);
            let router = common.router().clone();

            common
                .channel()
                .subscribe_to_notifications(common.id().into(), move |notification| {
                    match serde_json::from_value::<Notification>(notification) {
                        Ok(Notification::DominantSpeaker(dominant_speaker)) => {
                            let producer = router.upgrade().and_then(|router| {
                                router.get_producer(&dominant_speaker.producer_id)
                            });
                            match producer {
                                Some(producer) => {
                                    let dominant_speaker =
                                        ActiveSpeakerObserverDominantSpeaker { producer };

                                    handlers.dominant_speaker.call(|callback| {
                                        callback(&dominant_speaker);
                                    });
                                }
                                None => {
                                    error!(
                                        "Producer for dominant speaker event not found: {}",
                                        dominant_speaker.producer_id
                                    );
                                }
                            }
                        }
                        Err(error) => {
                            error!("Failed to parse notification: {}", error);
                        }
                    }
                })
        };
        common.set_subscription_handler(subscription_handler);

        Self { common, handlers }
    }

    pub(crate) fn common(&self) -> &Arc<RtpObserverCommon> {
        &self.common
    }

    /// Fires when the dominant speaker changes, at most once per interval. Producers the router
    /// no longer knows about are skipped.
    pub fn on_dominant_speaker<
        F: Fn(&ActiveSpeakerObserverDominantSpeaker) + Send + Sync + 'static,
    >(
        &self,
        callback: F,
    ) -> HandlerId {
        self.handlers.dominant_speaker.add(Arc::new(callback))
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakActiveSpeakerObserver {
        WeakActiveSpeakerObserver {
            common: Arc::downgrade(&self.common),
            handlers: Arc::downgrade(&self.handlers),
        }
    }
}

/// Non-owning handle to an [`ActiveSpeakerObserver`].
#[derive(Clone)]
pub struct WeakActiveSpeakerObserver {
    common: Weak<RtpObserverCommon>,
    handlers: Weak<Handlers>,
}

impl fmt::Debug for WeakActiveSpeakerObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakActiveSpeakerObserver").finish()
    }
}

impl WeakActiveSpeakerObserver {
    #[must_use]
    pub fn upgrade(&self) -> Option<ActiveSpeakerObserver> {
        Some(ActiveSpeakerObserver {
            common: self.common.upgrade()?,
            handlers: self.handlers.upgrade()?,
        })
    }
}
