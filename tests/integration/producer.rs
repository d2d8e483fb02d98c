use crate::fixtures::{
    audio_producer_options, audio_rtp_parameters, create_router, create_webrtc_transport,
    listen_ip, video_producer_options,
};
use crate::mock_worker::{init, wait_until, within_timeout, MockWorker};
use futures_lite::future;
use mediasoup_controller::consumer::{ConsumerLayers, ConsumerOptions, ConsumerType};
use mediasoup_controller::pipe_transport::PipeTransportOptions;
use mediasoup_controller::producer::{ProducerId, ProducerOptions, ProducerType};
use mediasoup_controller::rtp_parameters::MediaKind;
use mediasoup_controller::transport::{ConsumeError, ProduceError};
use mediasoup_controller::worker::RequestError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn produce_succeeds() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let new_producer_count = Arc::new(AtomicUsize::new(0));
        let _handler = transport.on_new_producer({
            let new_producer_count = Arc::clone(&new_producer_count);

            move |_producer| {
                new_producer_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let audio_producer = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let video_producer = transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        assert_eq!(new_producer_count.load(Ordering::SeqCst), 2);
        assert_eq!(audio_producer.kind(), MediaKind::Audio);
        assert_eq!(audio_producer.r#type(), ProducerType::Simple);
        assert_eq!(video_producer.kind(), MediaKind::Video);
        assert_eq!(video_producer.r#type(), ProducerType::Simulcast);
        assert!(!audio_producer.paused());
        assert_eq!(transport.producers().len(), 2);
        assert!(router.get_producer(&audio_producer.id()).is_some());

        let requests = mock_worker.requests_with_method("transport.produce");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].handler_id, transport.id().to_string());
        assert_eq!(requests[0].body["producerId"], audio_producer.id().to_string());
        assert_eq!(requests[0].body["kind"], "audio");
        // Mapped payload type and SSRC for the router side
        assert_eq!(
            requests[0].body["rtpMapping"]["codecs"][0]["payloadType"],
            111,
        );
        assert_eq!(
            requests[0].body["rtpMapping"]["encodings"][0]["ssrc"],
            11_111_111,
        );
    });
}

#[test]
fn producers_on_same_transport_share_cname() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let first_producer = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let second_producer = transport
            .produce(ProducerOptions::new(
                MediaKind::Audio,
                audio_rtp_parameters(Some("other-cname")),
            ))
            .await
            .expect("Failed to produce audio");

        assert_eq!(
            first_producer.rtp_parameters().rtcp.cname.as_deref(),
            Some("audio-1"),
        );
        assert_eq!(
            second_producer.rtp_parameters().rtcp.cname.as_deref(),
            Some("audio-1"),
        );

        let requests = mock_worker.requests_with_method("transport.produce");
        assert_eq!(requests[1].body["rtpParameters"]["rtcp"]["cname"], "audio-1");

        let other_transport = create_webrtc_transport(&router, false).await;
        let anonymous_producer = other_transport
            .produce(ProducerOptions::new(
                MediaKind::Audio,
                audio_rtp_parameters(None),
            ))
            .await
            .expect("Failed to produce audio");

        let cname = anonymous_producer
            .rtp_parameters()
            .rtcp
            .cname
            .clone()
            .expect("CNAME must be generated");
        assert_eq!(cname.len(), 8);
        assert_ne!(cname, "audio-1");
    });
}

#[test]
fn producers_on_pipe_transport_keep_their_own_cname() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = router
            .create_pipe_transport(PipeTransportOptions::new(listen_ip()))
            .await
            .expect("Failed to create pipe transport");

        let first_producer = transport
            .produce(ProducerOptions::new_pipe_transport(
                ProducerId::from(Uuid::new_v4()),
                MediaKind::Audio,
                audio_rtp_parameters(Some("audio-1")),
            ))
            .await
            .expect("Failed to produce audio");
        let second_producer = transport
            .produce(ProducerOptions::new_pipe_transport(
                ProducerId::from(Uuid::new_v4()),
                MediaKind::Audio,
                audio_rtp_parameters(Some("other-cname")),
            ))
            .await
            .expect("Failed to produce audio");

        assert_eq!(
            first_producer.rtp_parameters().rtcp.cname.as_deref(),
            Some("audio-1"),
        );
        assert_eq!(
            second_producer.rtp_parameters().rtcp.cname.as_deref(),
            Some("other-cname"),
        );

        let requests = mock_worker.requests_with_method("transport.produce");
        assert_eq!(requests[0].body["rtpParameters"]["rtcp"]["cname"], "audio-1");
        assert_eq!(requests[1].body["rtpParameters"]["rtcp"]["cname"], "other-cname");
    });
}

#[test]
fn produce_on_closed_transport_fails() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        transport.close().await;

        assert!(matches!(
            transport.produce(audio_producer_options()).await,
            Err(ProduceError::TransportClosed),
        ));
    });
}

#[test]
fn consume_assigns_sequential_mids() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let audio_producer = send_transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let video_producer = send_transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        let audio_consumer = recv_transport
            .consume(ConsumerOptions::new(
                audio_producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume audio");
        let video_consumer = recv_transport
            .consume({
                let mut options = ConsumerOptions::new(
                    video_producer.id(),
                    router.rtp_capabilities().clone(),
                );
                options.paused = true;
                options
            })
            .await
            .expect("Failed to consume video");

        assert_eq!(audio_consumer.rtp_parameters().mid.as_deref(), Some("0"));
        assert_eq!(video_consumer.rtp_parameters().mid.as_deref(), Some("1"));
        assert_eq!(audio_consumer.producer_id(), audio_producer.id());
        assert_eq!(audio_consumer.kind(), MediaKind::Audio);
        assert_eq!(audio_consumer.r#type(), ConsumerType::Simple);
        assert_eq!(video_consumer.r#type(), ConsumerType::Simulcast);
        assert!(!audio_consumer.paused());
        assert!(video_consumer.paused());
        assert_eq!(audio_consumer.score().score, 10);
        assert_eq!(recv_transport.consumers().len(), 2);

        let requests = mock_worker.requests_with_method("transport.consume");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].handler_id, recv_transport.id().to_string());
        assert_eq!(requests[0].body["producerId"], audio_producer.id().to_string());
        assert_eq!(requests[0].body["consumerId"], audio_consumer.id().to_string());
        assert_eq!(requests[1].body["type"], "simulcast");
        assert_eq!(requests[1].body["paused"], true);
    });
}

#[test]
fn consume_unknown_producer_fails() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer_id = ProducerId::from(Uuid::new_v4());
        let result = transport
            .consume(ConsumerOptions::new(
                producer_id,
                router.rtp_capabilities().clone(),
            ))
            .await;

        match result {
            Err(ConsumeError::ProducerNotFound(id)) => {
                assert_eq!(id, producer_id);
            }
            result => {
                panic!("Unexpected result {:?}", result);
            }
        }
        assert!(mock_worker
            .requests_with_method("transport.consume")
            .is_empty());
    });
}

#[test]
fn producer_pause_and_resume_reach_consumer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume audio");

        let producer_pause_count = Arc::new(AtomicUsize::new(0));
        let _producer_pause_handler = consumer.on_producer_pause({
            let producer_pause_count = Arc::clone(&producer_pause_count);

            move || {
                producer_pause_count.fetch_add(1, Ordering::SeqCst);
            }
        });
        let producer_resume_count = Arc::new(AtomicUsize::new(0));
        let _producer_resume_handler = consumer.on_producer_resume({
            let producer_resume_count = Arc::clone(&producer_resume_count);

            move || {
                producer_resume_count.fetch_add(1, Ordering::SeqCst);
            }
        });
        let pause_count = Arc::new(AtomicUsize::new(0));
        let _pause_handler = consumer.on_pause({
            let pause_count = Arc::clone(&pause_count);

            move || {
                pause_count.fetch_add(1, Ordering::SeqCst);
            }
        });
        let resume_count = Arc::new(AtomicUsize::new(0));
        let _resume_handler = consumer.on_resume({
            let resume_count = Arc::clone(&resume_count);

            move || {
                resume_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        producer.pause().await.expect("Failed to pause producer");

        assert!(producer.paused());
        wait_until(|| producer_pause_count.load(Ordering::SeqCst) == 1).await;
        assert!(consumer.producer_paused());
        assert!(!consumer.paused());
        assert_eq!(pause_count.load(Ordering::SeqCst), 1);

        // Already paused by the producer, no extra pause event
        consumer.pause().await.expect("Failed to pause consumer");
        assert!(consumer.paused());
        assert_eq!(pause_count.load(Ordering::SeqCst), 1);

        producer.resume().await.expect("Failed to resume producer");

        wait_until(|| producer_resume_count.load(Ordering::SeqCst) == 1).await;
        assert!(!consumer.producer_paused());
        // Still paused by itself
        assert_eq!(resume_count.load(Ordering::SeqCst), 0);

        consumer.resume().await.expect("Failed to resume consumer");
        assert!(!consumer.paused());
        assert_eq!(resume_count.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn consumer_of_paused_producer_starts_producer_paused() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce({
                let mut options = audio_producer_options();
                options.paused = true;
                options
            })
            .await
            .expect("Failed to produce audio");
        assert!(producer.paused());

        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume audio");

        assert!(consumer.producer_paused());
        assert!(!consumer.paused());
    });
}

#[test]
fn producer_close_closes_consumer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume audio");

        let (mut producer_close_tx, producer_close_rx) = async_oneshot::oneshot::<()>();
        let _producer_close_handler = consumer.on_producer_close(move || {
            let _ = producer_close_tx.send(());
        });
        let (mut close_tx, close_rx) = async_oneshot::oneshot::<()>();
        let _close_handler = consumer.on_close(move || {
            let _ = close_tx.send(());
        });

        producer.close().await;

        within_timeout(producer_close_rx)
            .await
            .expect("Failed to receive producer_close event");
        within_timeout(close_rx)
            .await
            .expect("Failed to receive close event");

        assert!(producer.closed());
        assert!(consumer.closed());
        assert!(router.get_producer(&producer.id()).is_none());
        wait_until(|| recv_transport.consumers().is_empty()).await;
        assert!(send_transport.producers().is_empty());

        let requests = mock_worker.requests_with_method("transport.closeProducer");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].handler_id, send_transport.id().to_string());
        assert_eq!(requests[0].body["producerId"], producer.id().to_string());
        // Consumer was closed by the worker together with the producer
        assert!(mock_worker
            .requests_with_method("transport.closeConsumer")
            .is_empty());
    });
}

#[test]
fn consumer_close_sends_request() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume audio");

        consumer.close().await;
        // Second call is a no-op
        consumer.close().await;

        assert!(consumer.closed());
        assert!(!producer.closed());
        assert!(recv_transport.consumers().is_empty());

        let requests = mock_worker.requests_with_method("transport.closeConsumer");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].handler_id, recv_transport.id().to_string());
        assert_eq!(requests[0].body["consumerId"], consumer.id().to_string());
    });
}

#[test]
fn transport_close_closes_producers_and_consumers() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer = transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let consumer = transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume audio");

        let (mut producer_transport_close_tx, producer_transport_close_rx) =
            async_oneshot::oneshot::<()>();
        let _producer_handler = producer.on_transport_close(move || {
            let _ = producer_transport_close_tx.send(());
        });
        let (mut consumer_transport_close_tx, consumer_transport_close_rx) =
            async_oneshot::oneshot::<()>();
        let _consumer_handler = consumer.on_transport_close(move || {
            let _ = consumer_transport_close_tx.send(());
        });

        transport.close().await;

        within_timeout(producer_transport_close_rx)
            .await
            .expect("Failed to receive transport_close event");
        within_timeout(consumer_transport_close_rx)
            .await
            .expect("Failed to receive transport_close event");

        assert!(producer.closed());
        assert!(consumer.closed());
        assert!(router.get_producer(&producer.id()).is_none());
    });
}

#[test]
fn consumer_notifications_update_state() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");
        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume video");

        let (score_tx, score_rx) = async_channel::unbounded();
        let _score_handler = consumer.on_score(move |score| {
            let _ = score_tx.try_send(score.clone());
        });
        let (layers_tx, layers_rx) = async_channel::unbounded();
        let _layers_handler = consumer.on_layers_change(move |layers| {
            let _ = layers_tx.try_send(*layers);
        });

        mock_worker
            .notify(
                consumer.id(),
                "score",
                Some(json!({"score": 7, "producerScore": 9, "producerScores": [9, 8]})),
            )
            .await;
        let score = within_timeout(score_rx.recv())
            .await
            .expect("Failed to receive score event");
        assert_eq!(score.score, 7);
        assert_eq!(score.producer_score, 9);
        assert_eq!(score.producer_scores, vec![9, 8]);
        assert_eq!(consumer.score(), score);

        mock_worker
            .notify(
                consumer.id(),
                "layerschange",
                Some(json!({"spatialLayer": 1, "temporalLayer": 0})),
            )
            .await;
        let layers = within_timeout(layers_rx.recv())
            .await
            .expect("Failed to receive layers_change event");
        assert_eq!(
            layers,
            Some(ConsumerLayers {
                spatial_layer: 1,
                temporal_layer: Some(0),
            }),
        );
        assert_eq!(consumer.current_layers(), layers);

        // Layers gone when the producer stops sending
        mock_worker.notify(consumer.id(), "layerschange", None).await;
        let layers = within_timeout(layers_rx.recv())
            .await
            .expect("Failed to receive layers_change event");
        assert_eq!(layers, None);
        assert_eq!(consumer.current_layers(), None);
    });
}

#[test]
fn consumer_priority_and_preferred_layers() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");
        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume video");

        assert_eq!(consumer.priority(), 1);

        consumer
            .set_priority(2)
            .await
            .expect("Failed to set priority");
        assert_eq!(consumer.priority(), 2);

        consumer
            .unset_priority()
            .await
            .expect("Failed to unset priority");
        assert_eq!(consumer.priority(), 1);

        consumer
            .set_preferred_layers(ConsumerLayers {
                spatial_layer: 1,
                temporal_layer: Some(2),
            })
            .await
            .expect("Failed to set preferred layers");
        assert_eq!(
            consumer.preferred_layers(),
            Some(ConsumerLayers {
                spatial_layer: 1,
                temporal_layer: Some(2),
            }),
        );

        consumer
            .request_key_frame()
            .await
            .expect("Failed to request key frame");

        let priority_requests = mock_worker.requests_with_method("consumer.setPriority");
        assert_eq!(priority_requests.len(), 2);
        assert_eq!(priority_requests[0].handler_id, consumer.id().to_string());
        assert_eq!(priority_requests[0].body["priority"], 2);
        assert_eq!(priority_requests[1].body["priority"], 1);
        assert_eq!(
            mock_worker.requests_with_method("consumer.requestKeyFrame")[0].handler_id,
            consumer.id().to_string(),
        );
    });
}

#[test]
fn concurrent_produce_with_same_id_keeps_one_producer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer_id = ProducerId::from(Uuid::new_v4());
        let options = || {
            ProducerOptions::new_pipe_transport(
                producer_id,
                MediaKind::Audio,
                audio_rtp_parameters(Some("audio-1")),
            )
        };

        let (first, second) =
            future::zip(transport.produce(options()), transport.produce(options())).await;

        let producer = first.expect("Failed to produce audio");
        assert!(matches!(
            second,
            Err(ProduceError::AlreadyExists(id)) if id == producer_id,
        ));
        assert_eq!(transport.producers().len(), 1);
        assert_eq!(mock_worker.requests_with_method("transport.produce").len(), 1);

        // The id is free again once its producer is gone
        producer.close().await;
        transport
            .produce(options())
            .await
            .expect("Failed to produce audio again");
    });
}

#[test]
fn failed_produce_releases_its_id() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let transport = create_webrtc_transport(&router, false).await;

        let producer_id = ProducerId::from(Uuid::new_v4());
        let options = || {
            ProducerOptions::new_pipe_transport(
                producer_id,
                MediaKind::Audio,
                audio_rtp_parameters(Some("audio-1")),
            )
        };

        mock_worker.reject("transport.produce", "no room");
        assert!(matches!(
            transport.produce(options()).await,
            Err(ProduceError::Request(_)),
        ));

        mock_worker.accept("transport.produce");
        let producer = transport
            .produce(options())
            .await
            .expect("Failed to produce audio");
        assert_eq!(producer.id(), producer_id);
    });
}

#[test]
fn closed_producer_and_consumer_send_no_requests() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let send_transport = create_webrtc_transport(&router, false).await;
        let recv_transport = create_webrtc_transport(&router, false).await;

        let producer = send_transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");
        let consumer = recv_transport
            .consume(ConsumerOptions::new(
                producer.id(),
                router.rtp_capabilities().clone(),
            ))
            .await
            .expect("Failed to consume video");

        consumer.close().await;
        producer.close().await;
        let request_count = mock_worker.requests().len();

        consumer
            .set_priority(5)
            .await
            .expect("Closed consumer must ignore set_priority");
        consumer
            .unset_priority()
            .await
            .expect("Closed consumer must ignore unset_priority");
        consumer
            .set_preferred_layers(ConsumerLayers {
                spatial_layer: 0,
                temporal_layer: None,
            })
            .await
            .expect("Closed consumer must ignore set_preferred_layers");
        consumer
            .request_key_frame()
            .await
            .expect("Closed consumer must ignore request_key_frame");
        consumer
            .enable_trace_event(vec![])
            .await
            .expect("Closed consumer must ignore enable_trace_event");
        consumer.pause().await.expect("Closed consumer must ignore pause");
        producer
            .enable_trace_event(vec![])
            .await
            .expect("Closed producer must ignore enable_trace_event");
        producer.resume().await.expect("Closed producer must ignore resume");

        assert_eq!(consumer.dump().await.err(), Some(RequestError::EntityClosed));
        assert_eq!(consumer.get_stats().await.err(), Some(RequestError::EntityClosed));
        assert_eq!(producer.dump().await.err(), Some(RequestError::EntityClosed));
        assert_eq!(producer.get_stats().await.err(), Some(RequestError::EntityClosed));

        assert_eq!(consumer.priority(), 1);
        assert_eq!(mock_worker.requests().len(), request_count);
    });
}
