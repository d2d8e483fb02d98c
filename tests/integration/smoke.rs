use crate::fixtures::{
    audio_producer_options, create_router, create_webrtc_transport, video_producer_options,
};
use crate::mock_worker::{init, wait_until, MockWorker};
use futures_lite::future;
use mediasoup_controller::consumer::ConsumerOptions;
use mediasoup_controller::data_consumer::DataConsumerOptions;
use mediasoup_controller::data_producer::DataProducerOptions;
use mediasoup_controller::data_structures::{DtlsParameters, DtlsRole};
use mediasoup_controller::router::PipeToRouterOptions;
use mediasoup_controller::sctp_parameters::SctpStreamParameters;
use mediasoup_controller::webrtc_transport::WebRtcTransportRemoteParameters;

/// Two endpoints exchange media and data through one router, then media is piped to a second
/// router and everything is torn down with the worker.
#[test]
fn conference_flow() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;

        let send_transport = create_webrtc_transport(&router, true).await;
        let recv_transport = create_webrtc_transport(&router, true).await;

        for transport in [&send_transport, &recv_transport] {
            transport
                .connect(WebRtcTransportRemoteParameters {
                    dtls_parameters: DtlsParameters {
                        role: DtlsRole::Auto,
                        fingerprints: transport.dtls_parameters().fingerprints,
                    },
                })
                .await
                .expect("Failed to connect");
        }

        let audio_producer = send_transport
            .produce(audio_producer_options())
            .await
            .expect("Failed to produce audio");
        let video_producer = send_transport
            .produce(video_producer_options())
            .await
            .expect("Failed to produce video");
        let data_producer = send_transport
            .produce_data(DataProducerOptions::new_sctp(
                SctpStreamParameters::new_ordered(1),
            ))
            .await
            .expect("Failed to produce data");

        let mut consumers = Vec::new();
        for producer in [&audio_producer, &video_producer] {
            assert!(router.can_consume(&producer.id(), router.rtp_capabilities()));
            consumers.push(
                recv_transport
                    .consume(ConsumerOptions::new(
                        producer.id(),
                        router.rtp_capabilities().clone(),
                    ))
                    .await
                    .expect("Failed to consume"),
            );
        }
        let data_consumer = recv_transport
            .consume_data(DataConsumerOptions::new_sctp(data_producer.id()))
            .await
            .expect("Failed to consume data");

        assert_eq!(consumers[0].rtp_parameters().mid, Some("0".to_string()));
        assert_eq!(consumers[1].rtp_parameters().mid, Some("1".to_string()));
        assert_eq!(
            data_consumer
                .sctp_stream_parameters()
                .map(|sctp_stream_parameters| sctp_stream_parameters.stream_id),
            Some(0),
        );

        let dump = router.dump().await.expect("Failed to dump router");
        assert_eq!(dump.id, router.id());
        assert_eq!(dump.transport_ids.len(), 2);
        assert!(dump.transport_ids.contains(&send_transport.id()));

        let other_router = create_router(&worker).await;
        let pair = router
            .pipe_producer_to_router(
                video_producer.id(),
                PipeToRouterOptions::new(other_router.clone()),
            )
            .await
            .expect("Failed to pipe producer");
        assert!(other_router.get_producer(&video_producer.id()).is_some());

        worker.close().await;

        assert!(router.closed());
        assert!(other_router.closed());
        assert!(send_transport.closed());
        assert!(recv_transport.closed());
        assert!(audio_producer.closed());
        assert!(consumers.iter().all(|consumer| consumer.closed()));
        assert!(data_consumer.closed());
        assert!(pair.pipe_producer.closed());
        wait_until(|| {
            mock_worker
                .methods()
                .last()
                .map_or(false, |method| method == "worker.close")
        })
        .await;
    });
}
