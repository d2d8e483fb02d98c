
use super::rtp_observer::{rtp_observer_impl, RtpObserverCommon};
use crate::data_structures::AppData;
use crate::producer::{Producer, ProducerId};
use event_listener_primitives::{Bag, HandlerId};
use log::{debug, error, warn};
use serde::Deserialize;
use std::fmt;
use std::num::NonZeroU16;
use std::sync::{Arc, Weak};

/// Volumes are in dBov, from -127 (silence) to 0 (loudest).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AudioLevelObserverOptions {
    /// Entries per `volumes` report, 1 by default.
    pub max_entries: NonZeroU16,
    /// Producers quieter than this are left out of reports, -80 by default.
    pub threshold: i8,
    /// Milliseconds between reports, 1000 by default.
    pub interval: u16,
    pub app_data: AppData,
}

impl Default for AudioLevelObserverOptions {
    fn default() -> Self {
        Self {
            max_entries: NonZeroU16::MIN,
            threshold: -80,
            interval: 1000,
            app_data: AppData::default(),
        }
    }
}

/// One entry of a `volumes` report.
#[derive(Debug, Clone)]
pub struct AudioLevelObserverVolume {
    pub producer: Producer,
    /// Average over the last interval, in dBov.
    pub volume: i8,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    volumes: Bag<Arc<dyn Fn(&[AudioLevelObserverVolume]) + Send + Sync>>,
    silence: Bag<Arc<dyn Fn() + Send + Sync>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeNotification {
    producer_id: ProducerId,
    volume: i8,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Volumes(Vec<VolumeNotification>),
    Silence,
}

/// Periodically reports the loudest of the audio producers added to it.
///
/// Levels come from the RFC 6464 header extension, the worker never decodes audio.
#[derive(Clone)]
pub struct AudioLevelObserver {
    common: Arc<RtpObserverCommon>,
    handlers: Arc<Handlers>,
}

impl fmt::Debug for AudioLevelObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioLevelObserver")
            .field("common", &self.common)
            .finish()
    }
}

rtp_observer_impl!(AudioLevelObserver);

impl AudioLevelObserver {
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
                        Ok(Notification::Volumes(volumes)) => {
                            let router = match router.upgrade() {
                                Some(router) => router,
                                None => {
                                    return;
                                }
                            };
                            let volumes = volumes
                                .into_iter()
                                .filter_map(|VolumeNotification { producer_id, volume }| {
                                    match router.get_producer(&producer_id) {
                                        Some(producer) => {
                                            Some(AudioLevelObserverVolume { producer, volume })
                                        }
                                        None => {
                                            warn!(
                                                "Producer for volumes event not found: {}",
                                                producer_id
                                            );
                                            None
                                        }
                                    }
                                })
                                .collect::<Vec<_>>();

                            if !volumes.is_empty() {
                                handlers.volumes.call(|callback| {
                                    callback(&volumes);
                                });
                            }
                        }
                        Ok(Notification::Silence) => {
                            handlers.silence.call_simple();
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

    /// Loudest first. Entries for producers the router no longer knows are dropped.
    pub fn on_volumes<F: Fn(&[AudioLevelObserverVolume]) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.handlers.volumes.add(Arc::new(callback))
    }

    /// Every observed producer stayed under the threshold for a whole interval.
    pub fn on_silence<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.handlers.silence.add(Arc::new(callback))
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakAudioLevelObserver {
        WeakAudioLevelObserver {
            common: Arc::downgrade(&self.common),
            handlers: Arc::downgrade(&self.handlers),
        }
    }
}

/// Non-owning handle to an [`AudioLevelObserver`].
#[derive(Clone)]
pub struct WeakAudioLevelObserver {
    common: Weak<RtpObserverCommon>,
    handlers: Weak<Handlers>,
}

impl fmt::Debug for WeakAudioLevelObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAudioLevelObserver").finish()
    }
}

impl WeakAudioLevelObserver {
    #[must_use]
    pub fn upgrade(&self) -> Option<AudioLevelObserver> {
        Some(AudioLevelObserver {
            common: self.common.upgrade()?,
            handlers: self.handlers.upgrade()?,
        })
    }
}
