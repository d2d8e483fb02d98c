use crate::fixtures::{
    audio_producer_options, create_router, create_webrtc_transport, video_producer_options,
};
use crate::mock_worker::{init, wait_until, within_timeout, MockWorker};
use futures_lite::future;
use mediasoup_controller::consumer::ConsumerType;
use mediasoup_controller::data_consumer::DataConsumerOptions;
use mediasoup_controller::data_producer::{DataProducerId, DataProducerOptions};
use mediasoup_controller::producer::{ProducerId, ProducerType};
use mediasoup_controller::router::{
    PipeDataProducerToRouterError, PipeProducerToRouterError, PipeToRouterOptions, Router,
};
use mediasoup_controller::sctp_parameters::SctpStreamParameters;
use mediasoup_controller::transport::TransportKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn pipe_producer_to_router_succeeds() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let audio_producer = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let video_producer = transport1
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        let requests_before = mock_worker.requests().len();

        let audio_pair = router1
            .pipe_producer_to_router(
                audio_producer.id(),
                PipeToRouterOptions::new(router2.clone()),
            )
            .await
            .expect("Failed to pipe audio producer");

        assert_eq!(
            &mock_worker.methods()[requests_before..],
            &[
                "router.createPipeTransport",
                "router.createPipeTransport",
                "transport.connect",
                "transport.connect",
                "transport.consume",
                "transport.produce",
            ],
        );

        let pipe_consumer = &audio_pair.pipe_consumer;
        let pipe_producer = &audio_pair.pipe_producer;
        assert_eq!(pipe_consumer.producer_id(), audio_producer.id());
        assert_eq!(pipe_consumer.r#type(), ConsumerType::Pipe);
        assert_eq!(pipe_consumer.rtp_parameters().mid, None);
        assert_eq!(pipe_producer.id(), audio_producer.id());
        assert_eq!(pipe_producer.kind(), audio_producer.kind());
        assert!(!pipe_producer.paused());
        assert!(router2.get_producer(&audio_producer.id()).is_some());

        // One pipe transport in each router
        let pipe_transports1 = router1
            .transports()
            .into_iter()
            .filter(|transport| transport.kind() == TransportKind::Pipe)
            .collect::<Vec<_>>();
        let pipe_transports2 = router2
            .transports()
            .into_iter()
            .filter(|transport| transport.kind() == TransportKind::Pipe)
            .collect::<Vec<_>>();
        assert_eq!(pipe_transports1.len(), 1);
        assert_eq!(pipe_transports2.len(), 1);
        assert_eq!(
            mock_worker.requests_with_method("router.createPipeTransport")[1].handler_id,
            router2.id().to_string(),
        );

        let requests_before = mock_worker.requests().len();

        let video_pair = router1
            .pipe_producer_to_router(
                video_producer.id(),
                PipeToRouterOptions::new(router2.clone()),
            )
            .await
            .expect("Failed to pipe video producer");

        // Existing pipe transports are reused
        assert_eq!(
            &mock_worker.methods()[requests_before..],
            &["transport.consume", "transport.produce"],
        );
        assert_eq!(video_pair.pipe_producer.r#type(), ProducerType::Simulcast);
        assert_eq!(video_pair.pipe_consumer.r#type(), ConsumerType::Pipe);

        let produce_requests = mock_worker.requests_with_method("transport.produce");
        let last_produce_request = &produce_requests[produce_requests.len() - 1];
        assert_eq!(
            last_produce_request.handler_id,
            pipe_transports2[0].id().to_string(),
        );
        assert_eq!(
            last_produce_request.body["producerId"],
            video_producer.id().to_string(),
        );
    });
}

#[test]
fn pipe_producer_to_router_fails_for_same_router_and_unknown_producer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let producer = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");

        assert!(matches!(
            router1
                .pipe_producer_to_router(producer.id(), PipeToRouterOptions::new(router1.clone()))
                .await,
            Err(PipeProducerToRouterError::SameRouter),
        ));

        let unknown_producer_id = ProducerId::from(Uuid::new_v4());
        match router1
            .pipe_producer_to_router(unknown_producer_id, PipeToRouterOptions::new(router2))
            .await
        {
            Err(PipeProducerToRouterError::ProducerNotFound(producer_id)) => {
                assert_eq!(producer_id, unknown_producer_id);
            }
            result => {
                panic!("Unexpected result {:?}", result);
            }
        }

        assert!(mock_worker
            .requests_with_method("router.createPipeTransport")
            .is_empty());
    });
}

#[test]
fn piped_producer_follows_source_pause_state() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let producer = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");

        let pair = router1
            .pipe_producer_to_router(producer.id(), PipeToRouterOptions::new(router2))
            .await
            .expect("Failed to pipe producer");
        let pipe_producer = pair.pipe_producer;

        let (pause_tx, pause_rx) = async_channel::unbounded();
        let _pause_handler = pipe_producer.on_pause(move || {
            let _ = pause_tx.try_send(());
        });
        let (resume_tx, resume_rx) = async_channel::unbounded();
        let _resume_handler = pipe_producer.on_resume(move || {
            let _ = resume_tx.try_send(());
        });

        producer.pause().await.expect("Failed to pause producer");

        within_timeout(pause_rx.recv())
            .await
            .expect("Failed to receive pause event");
        assert!(pipe_producer.paused());

        producer.resume().await.expect("Failed to resume producer");

        within_timeout(resume_rx.recv())
            .await
            .expect("Failed to receive resume event");
        assert!(!pipe_producer.paused());
    });
}

#[test]
fn piping_paused_producer_creates_paused_pipe_producer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let producer = transport1
            .produce({
                let mut producer_options = audio_producer_options();
                producer_options.paused = true;
                producer_options
            })
            .await
            .expect("Failed to produce audio");

        let pair = router1
            .pipe_producer_to_router(producer.id(), PipeToRouterOptions::new(router2))
            .await
            .expect("Failed to pipe producer");

        assert!(pair.pipe_consumer.producer_paused());
        assert!(pair.pipe_producer.paused());
    });
}

#[test]
fn source_producer_close_reaches_pipe_producer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let producer = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");

        let pair = router1
            .pipe_producer_to_router(producer.id(), PipeToRouterOptions::new(router2.clone()))
            .await
            .expect("Failed to pipe producer");

        let (mut pipe_producer_close_tx, pipe_producer_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = pair.pipe_producer.on_close(move || {
            let _ = pipe_producer_close_tx.send(());
        });

        producer.close().await;

        within_timeout(pipe_producer_close_rx)
            .await
            .expect("Failed to receive close event");
        assert!(pair.pipe_consumer.closed());
        assert!(pair.pipe_producer.closed());
        wait_until(|| router2.get_producer(&producer.id()).is_none()).await;
    });
}

#[test]
fn closing_source_router_closes_pipe_transports_on_both_sides() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let producer = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");

        let pair = router1
            .pipe_producer_to_router(producer.id(), PipeToRouterOptions::new(router2.clone()))
            .await
            .expect("Failed to pipe producer");

        let (mut transport_close_tx, transport_close_rx) = async_oneshot::oneshot::<()>();
        let _handler = pair.pipe_producer.on_transport_close(move || {
            let _ = transport_close_tx.send(());
        });

        router1.close().await;

        within_timeout(transport_close_rx)
            .await
            .expect("Failed to receive transport_close event");
        assert!(pair.pipe_producer.closed());
        wait_until(|| router2.transports().is_empty()).await;
        assert!(!router2.closed());
    });
}

#[test]
fn pipe_transports_are_created_once_for_concurrent_calls() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;

        let audio_producer = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let video_producer = transport1
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        let (audio_result, video_result) = future::zip(
            router1.pipe_producer_to_router(
                audio_producer.id(),
                PipeToRouterOptions::new(router2.clone()),
            ),
            router1.pipe_producer_to_router(
                video_producer.id(),
                PipeToRouterOptions::new(router2.clone()),
            ),
        )
        .await;

        audio_result.expect("Failed to pipe audio producer");
        video_result.expect("Failed to pipe video producer");

        assert_eq!(
            mock_worker
                .requests_with_method("router.createPipeTransport")
                .len(),
            2,
        );
        assert!(router2.get_producer(&audio_producer.id()).is_some());
        assert!(router2.get_producer(&video_producer.id()).is_some());
    });
}

#[test]
fn piping_back_reuses_reversed_pair() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;
        let transport2 = create_webrtc_transport(&router2, false).await;

        let producer1 = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let producer2 = transport2
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        router1
            .pipe_producer_to_router(producer1.id(), PipeToRouterOptions::new(router2.clone()))
            .await
            .expect("Failed to pipe producer");

        let pair = router2
            .pipe_producer_to_router(producer2.id(), PipeToRouterOptions::new(router1.clone()))
            .await
            .expect("Failed to pipe producer back");

        assert_eq!(
            mock_worker
                .requests_with_method("router.createPipeTransport")
                .len(),
            2,
        );
        assert!(router1.get_producer(&producer2.id()).is_some());
        assert_eq!(pair.pipe_producer.id(), producer2.id());
    });
}

#[test]
fn opposite_pipes_share_one_pair_that_closes_together() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, false).await;
        let transport2 = create_webrtc_transport(&router2, false).await;

        let producer1 = transport1
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let producer2 = transport2
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");

        let (result1, result2) = future::zip(
            router1.pipe_producer_to_router(producer1.id(), PipeToRouterOptions::new(router2.clone())),
            router2.pipe_producer_to_router(producer2.id(), PipeToRouterOptions::new(router1.clone())),
        )
        .await;
        result1.expect("Failed to pipe producer");
        result2.expect("Failed to pipe producer back");

        assert_eq!(
            mock_worker
                .requests_with_method("router.createPipeTransport")
                .len(),
            2,
        );

        let pipe_transports = |router: &Router| {
            router
                .transports()
                .into_iter()
                .filter(|transport| transport.kind() == TransportKind::Pipe)
                .collect::<Vec<_>>()
        };
        let pipe_transports1 = pipe_transports(&router1);
        let pipe_transports2 = pipe_transports(&router2);
        assert_eq!(pipe_transports1.len(), 1);
        assert_eq!(pipe_transports2.len(), 1);

        pipe_transports2[0].close().await;

        wait_until(|| pipe_transports1[0].closed()).await;
        wait_until(|| router2.get_producer(&producer1.id()).is_none()).await;

        let pair = router1
            .pipe_producer_to_router(producer1.id(), PipeToRouterOptions::new(router2.clone()))
            .await
            .expect("Failed to pipe producer again");

        assert_eq!(
            mock_worker
                .requests_with_method("router.createPipeTransport")
                .len(),
            4,
        );
        assert!(!pair.pipe_producer.closed());
        assert_eq!(pipe_transports(&router1).len(), 1);
        assert_eq!(pipe_transports(&router2).len(), 1);
        assert!(router2.get_producer(&producer1.id()).is_some());
    });
}

#[test]
fn pipe_data_producer_to_router_succeeds() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;
        let transport1 = create_webrtc_transport(&router1, true).await;
        let transport2 = create_webrtc_transport(&router2, true).await;

        let data_producer = transport1
            .produce_data({
                let mut options = DataProducerOptions::new_sctp(SctpStreamParameters::new_ordered(7));
                options.label = "chat".to_string();
                options
            })
            .await
            .expect("Failed to produce data");

        let pair = router1
            .pipe_data_producer_to_router(
                data_producer.id(),
                PipeToRouterOptions::new(router2.clone()),
            )
            .await
            .expect("Failed to pipe data producer");

        assert_eq!(pair.pipe_data_consumer.data_producer_id(), data_producer.id());
        assert_eq!(
            pair.pipe_data_consumer.sctp_stream_parameters(),
            Some(SctpStreamParameters::new_ordered(0)),
        );
        assert_eq!(pair.pipe_data_producer.id(), data_producer.id());
        assert_eq!(pair.pipe_data_producer.label(), "chat");
        assert_eq!(
            pair.pipe_data_producer.sctp_stream_parameters(),
            Some(SctpStreamParameters::new_ordered(0)),
        );

        let create_requests = mock_worker.requests_with_method("router.createPipeTransport");
        assert_eq!(create_requests.len(), 2);
        assert_eq!(create_requests[0].body["enableSctp"], true);

        // Piped data producer can be consumed in the destination router
        let data_consumer = transport2
            .consume_data(DataConsumerOptions::new_sctp(data_producer.id()))
            .await
            .expect("Failed to consume piped data producer");
        assert_eq!(data_consumer.label(), "chat");

        let pause_count = Arc::new(AtomicUsize::new(0));
        let _handler = pair.pipe_data_producer.on_pause({
            let pause_count = Arc::clone(&pause_count);

            move || {
                pause_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        data_producer
            .pause()
            .await
            .expect("Failed to pause data producer");

        wait_until(|| pause_count.load(Ordering::SeqCst) == 1).await;
        assert!(pair.pipe_data_producer.paused());
    });
}

#[test]
fn pipe_data_producer_to_router_fails_for_unknown_data_producer() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;
        let router1 = create_router(&worker).await;
        let router2 = create_router(&worker).await;

        let unknown_data_producer_id = DataProducerId::from(Uuid::new_v4());

        assert!(matches!(
            router1
                .pipe_data_producer_to_router(
                    unknown_data_producer_id,
                    PipeToRouterOptions::new(router2),
                )
                .await,
            Err(PipeDataProducerToRouterError::DataProducerNotFound(_)),
        ));
        assert!(matches!(
            router1
                .pipe_data_producer_to_router(
                    unknown_data_producer_id,
                    PipeToRouterOptions::new(router1.clone()),
                )
                .await,
            Err(PipeDataProducerToRouterError::SameRouter),
        ));
    });
}
