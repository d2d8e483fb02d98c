use crate::fixtures::{
    audio_producer_options, audio_rtp_parameters, create_router, create_webrtc_transport,
};
use crate::mock_worker::{init, within_timeout, MockWorker};
use futures_lite::future;
use mediasoup_controller::active_speaker_observer::ActiveSpeakerObserverOptions;
use mediasoup_controller::audio_level_observer::AudioLevelObserverOptions;
use mediasoup_controller::producer::{ProducerId, ProducerOptions};
use mediasoup_controller::rtp_observer::{
    RtpObserver, RtpObserverAddProducerOptions, RtpObserverProducerError,
};
use mediasoup_controller::rtp_parameters::MediaKind;
use serde_json::json;
use std::num::NonZeroU16;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn audio_level_observer_reports_volumes_of_known_producers() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");

        let audio_level_observer = router
            .create_audio_level_observer({
                let mut options = AudioLevelObserverOptions::default();
                options.max_entries = NonZeroU16::new(4).unwrap();
                options.threshold = -70;
                options.interval = 500;
                options
            })
            .await
            .expect("Failed to create audio level observer");

        let create_requests = mock_worker.requests_with_method("router.createAudioLevelObserver");
        assert_eq!(create_requests.len(), 1);
        assert_eq!(create_requests[0].handler_id, router.id().to_string());
        assert_eq!(
            create_requests[0].body["rtpObserverId"],
            audio_level_observer.id().to_string(),
        );
        assert_eq!(create_requests[0].body["maxEntries"], 4);
        assert_eq!(create_requests[0].body["threshold"], -70);
        assert_eq!(create_requests[0].body["interval"], 500);
        assert_eq!(audio_level_observer.router_id(), router.id());
        assert!(!audio_level_observer.paused());

        let add_producer_count = Arc::new(AtomicUsize::new(0));
        let _add_producer_handler = audio_level_observer.on_add_producer({
            let add_producer_count = Arc::clone(&add_producer_count);

            Box::new(move |_producer| {
                add_producer_count.fetch_add(1, Ordering::SeqCst);
            })
        });

        audio_level_observer
            .add_producer(RtpObserverAddProducerOptions::new(producer.id()))
            .await
            .expect("Failed to add producer");

        assert_eq!(add_producer_count.load(Ordering::SeqCst), 1);
        assert_eq!(audio_level_observer.producers().len(), 1);
        let add_requests = mock_worker.requests_with_method("rtpObserver.addProducer");
        assert_eq!(add_requests.len(), 1);
        assert_eq!(
            add_requests[0].handler_id,
            audio_level_observer.id().to_string(),
        );
        assert_eq!(add_requests[0].body["producerId"], producer.id().to_string());

        let (volumes_tx, volumes_rx) = async_channel::unbounded();
        let _volumes_handler = audio_level_observer.on_volumes(move |volumes| {
            let _ = volumes_tx.try_send(
                volumes
                    .iter()
                    .map(|volume| (volume.producer.id(), volume.volume))
                    .collect::<Vec<_>>(),
            );
        });
        let (silence_tx, silence_rx) = async_channel::unbounded();
        let _silence_handler = audio_level_observer.on_silence(move || {
            let _ = silence_tx.try_send(());
        });

        let unknown_producer_id = ProducerId::from(Uuid::new_v4());

        // Only unknown producers, must not reach the callback
        mock_worker
            .notify(
                audio_level_observer.id(),
                "volumes",
                Some(json!([{"producerId": unknown_producer_id.to_string(), "volume": -30}])),
            )
            .await;
        mock_worker
            .notify(
                audio_level_observer.id(),
                "volumes",
                Some(json!([
                    {"producerId": unknown_producer_id.to_string(), "volume": -20},
                    {"producerId": producer.id().to_string(), "volume": -45},
                ])),
            )
            .await;
        mock_worker
            .notify(audio_level_observer.id(), "silence", None)
            .await;

        assert_eq!(
            within_timeout(volumes_rx.recv())
                .await
                .expect("Failed to receive volumes event"),
            vec![(producer.id(), -45)],
        );
        within_timeout(silence_rx.recv())
            .await
            .expect("Failed to receive silence event");
        assert!(volumes_rx.is_empty());
    });
}

#[test]
fn add_and_remove_producer_errors() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let audio_level_observer = router
            .create_audio_level_observer(AudioLevelObserverOptions::default())
            .await
            .expect("Failed to create audio level observer");

        let unknown_producer_id = ProducerId::from(Uuid::new_v4());
        assert!(matches!(
            audio_level_observer
                .add_producer(RtpObserverAddProducerOptions::new(unknown_producer_id))
                .await,
            Err(RtpObserverProducerError::ProducerNotFound(_)),
        ));

        mock_worker.reject("rtpObserver.addProducer", "not an audio producer");
        assert!(matches!(
            audio_level_observer
                .add_producer(RtpObserverAddProducerOptions::new(producer.id()))
                .await,
            Err(RtpObserverProducerError::Request(_)),
        ));
        assert!(audio_level_observer.producers().is_empty());

        audio_level_observer.close().await;

        assert!(matches!(
            audio_level_observer
                .add_producer(RtpObserverAddProducerOptions::new(producer.id()))
                .await,
            Err(RtpObserverProducerError::Closed),
        ));
        assert!(matches!(
            audio_level_observer.remove_producer(producer.id()).await,
            Err(RtpObserverProducerError::Closed),
        ));
    });
}

#[test]
fn remove_producer_and_producer_close() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer1 = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let producer2 = transport
            .produce({
                let mut rtp_parameters = audio_rtp_parameters(Some("audio-1"));
                rtp_parameters.mid = Some("AUDIO2".to_string());
                rtp_parameters.encodings[0].ssrc = Some(33_333_333);
                ProducerOptions::new(MediaKind::Audio, rtp_parameters)
            })
            .await
            .expect("Failed to produce audio");

        let active_speaker_observer = router
            .create_active_speaker_observer(ActiveSpeakerObserverOptions::default())
            .await
            .expect("Failed to create active speaker observer");

        for producer in [&producer1, &producer2] {
            active_speaker_observer
                .add_producer(RtpObserverAddProducerOptions::new(producer.id()))
                .await
                .expect("Failed to add producer");
        }
        assert_eq!(active_speaker_observer.producers().len(), 2);

        let (removed_tx, removed_rx) = async_channel::unbounded();
        let _remove_handler = active_speaker_observer.on_remove_producer(Box::new(
            move |producer| {
                let _ = removed_tx.try_send(producer.id());
            },
        ));

        active_speaker_observer
            .remove_producer(producer1.id())
            .await
            .expect("Failed to remove producer");

        assert_eq!(removed_rx.try_recv().ok(), Some(producer1.id()));
        assert_eq!(active_speaker_observer.producers().len(), 1);
        let remove_requests = mock_worker.requests_with_method("rtpObserver.removeProducer");
        assert_eq!(remove_requests.len(), 1);
        assert_eq!(
            remove_requests[0].handler_id,
            active_speaker_observer.id().to_string(),
        );
        assert_eq!(
            remove_requests[0].body["producerId"],
            producer1.id().to_string(),
        );

        // Closed producer is no longer observed
        producer2.close().await;

        assert!(active_speaker_observer.producers().is_empty());
    });
}

#[test]
fn active_speaker_observer_reports_dominant_speaker() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");

        let active_speaker_observer = router
            .create_active_speaker_observer({
                let mut options = ActiveSpeakerObserverOptions::default();
                options.interval = 100;
                options
            })
            .await
            .expect("Failed to create active speaker observer");

        let create_requests =
            mock_worker.requests_with_method("router.createActiveSpeakerObserver");
        assert_eq!(create_requests.len(), 1);
        assert_eq!(create_requests[0].body["interval"], 100);

        active_speaker_observer
            .add_producer(RtpObserverAddProducerOptions::new(producer.id()))
            .await
            .expect("Failed to add producer");

        let (dominant_speaker_tx, dominant_speaker_rx) = async_channel::unbounded();
        let _handler = active_speaker_observer.on_dominant_speaker(move |dominant_speaker| {
            let _ = dominant_speaker_tx.try_send(dominant_speaker.producer.id());
        });

        mock_worker
            .notify(
                active_speaker_observer.id(),
                "dominantspeaker",
                Some(json!({"producerId": producer.id().to_string()})),
            )
            .await;

        assert_eq!(
            within_timeout(dominant_speaker_rx.recv())
                .await
                .expect("Failed to receive dominant_speaker event"),
            producer.id(),
        );
    });
}

#[test]
fn pause_resume_and_close() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;

        let audio_level_observer = router
            .create_audio_level_observer(AudioLevelObserverOptions::default())
            .await
            .expect("Failed to create audio level observer");

        let pause_count = Arc::new(AtomicUsize::new(0));
        let _pause_handler = audio_level_observer.on_pause({
            let pause_count = Arc::clone(&pause_count);

            Box::new(move || {
                pause_count.fetch_add(1, Ordering::SeqCst);
            })
        });
        let resume_count = Arc::new(AtomicUsize::new(0));
        let _resume_handler = audio_level_observer.on_resume({
            let resume_count = Arc::clone(&resume_count);

            Box::new(move || {
                resume_count.fetch_add(1, Ordering::SeqCst);
            })
        });

        audio_level_observer
            .pause()
            .await
            .expect("Failed to pause observer");
        audio_level_observer
            .pause()
            .await
            .expect("Failed to pause observer");

        assert!(audio_level_observer.paused());
        assert_eq!(pause_count.load(Ordering::SeqCst), 1);

        audio_level_observer
            .resume()
            .await
            .expect("Failed to resume observer");

        assert!(!audio_level_observer.paused());
        assert_eq!(resume_count.load(Ordering::SeqCst), 1);

        let pause_requests = mock_worker.requests_with_method("rtpObserver.pause");
        assert_eq!(pause_requests.len(), 2);
        assert_eq!(
            pause_requests[0].handler_id,
            audio_level_observer.id().to_string(),
        );

        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _close_handler = audio_level_observer.on_close(Box::new(move || {
            let _ = close_tx.send(());
        }));

        audio_level_observer.close().await;

        within_timeout(close_rx)
            .await
            .expect("Failed to receive close event");
        assert!(audio_level_observer.closed());

        let close_requests = mock_worker.requests_with_method("router.closeRtpObserver");
        assert_eq!(close_requests.len(), 1);
        assert_eq!(close_requests[0].handler_id, router.id().to_string());
        assert_eq!(
            close_requests[0].body["rtpObserverId"],
            audio_level_observer.id().to_string(),
        );

        // Closed observer ignores pause
        audio_level_observer
            .pause()
            .await
            .expect("Pause of closed observer must succeed");
        assert_eq!(
            mock_worker.requests_with_method("rtpObserver.pause").len(),
            2,
        );
    });
}
