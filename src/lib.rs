//! Controller library for a mediasoup compatible media worker.
//!
//! The worker is a separate process that does the actual media handling, this crate spawns it
//! (or connects to an already running one through streams), speaks its JSON channel protocol and
//! exposes the object model on top of it:
//! [`WorkerManager`](worker_manager::WorkerManager) creates [`Worker`](worker::Worker)s, workers
//! host [`Router`](router::Router)s and [`WebRtcServer`](webrtc_server::WebRtcServer)s, routers
//! host transports and RTP observers, transports host producers and consumers.
//!
//! Closing any object closes everything it owns, every object has `on_close` to observe it.
//!
//! # Examples
//! ```no_run
//! use futures_lite::future;
//! use mediasoup_controller::prelude::*;
//! use std::num::{NonZeroU32, NonZeroU8};
//!
//! future::block_on(async move {
//!     let worker_manager = WorkerManager::new("/path/to/mediasoup-worker".into());
//!     let worker = worker_manager
//!         .create_worker(WorkerSettings::default())
//!         .await
//!         .unwrap();
//!
//!     let router = worker
//!         .create_router(RouterOptions::new(vec![RtpCodecCapability::audio(
//!             MimeTypeAudio::Opus,
//!             NonZeroU32::new(48000).unwrap(),
//!             NonZeroU8::new(2).unwrap(),
//!         )]))
//!         .await
//!         .unwrap();
//!
//!     println!("Router {} created", router.id());
//! });
//! ```

pub mod data_structures;
mod macros;
mod messages;
pub mod ortc;
pub mod prelude;
pub mod router;
pub mod rtp_parameters;
pub mod scalability_modes;
pub mod sctp_parameters;
pub mod srtp_parameters;
pub mod supported_rtp_capabilities;
pub mod webrtc_server;
pub mod worker;
pub mod worker_manager;

pub use router::active_speaker_observer;
pub use router::audio_level_observer;
pub use router::consumer;
pub use router::data_consumer;
pub use router::data_producer;
pub use router::direct_transport;
pub use router::pipe_transport;
pub use router::plain_transport;
pub use router::producer;
pub use router::rtp_observer;
pub use router::transport;
pub use router::webrtc_transport;
