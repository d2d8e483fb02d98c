use crate::fixtures::{create_router, listen_ip};
use crate::mock_worker::{init, within_timeout, MockWorker};
use futures_lite::future;
use mediasoup_controller::data_structures::{ListenIp, Protocol};
use mediasoup_controller::webrtc_server::{
    WebRtcServer, WebRtcServerListenInfo, WebRtcServerListenInfos, WebRtcServerOptions,
};
use mediasoup_controller::webrtc_transport::WebRtcTransportOptions;
use mediasoup_controller::worker::Worker;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn create_webrtc_server(worker: &Worker) -> WebRtcServer {
    worker
        .create_webrtc_server(WebRtcServerOptions::new(
            WebRtcServerListenInfos::new(WebRtcServerListenInfo {
                protocol: Protocol::Udp,
                listen_ip: listen_ip(),
                port: 44444,
            })
            .insert(WebRtcServerListenInfo {
                protocol: Protocol::Tcp,
                listen_ip: ListenIp {
                    ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    announced_ip: Some(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 2))),
                },
                port: 44445,
            }),
        ))
        .await
        .expect("Failed to create WebRTC server")
}

#[test]
fn create_webrtc_server_succeeds() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;

        let new_webrtc_server_count = Arc::new(AtomicUsize::new(0));
        let _handler = worker.on_new_webrtc_server({
            let new_webrtc_server_count = Arc::clone(&new_webrtc_server_count);

            move |_webrtc_server| {
                new_webrtc_server_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let webrtc_server = create_webrtc_server(&worker).await;

        assert_eq!(new_webrtc_server_count.load(Ordering::SeqCst), 1);
        assert!(!webrtc_server.closed());
        assert!(webrtc_server.webrtc_transport_ids().is_empty());
        assert_eq!(worker.webrtc_servers().len(), 1);

        let requests = mock_worker.requests_with_method("worker.createWebRtcServer");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].handler_id, "");
        assert_eq!(
            requests[0].body["webRtcServerId"],
            webrtc_server.id().to_string(),
        );
        let listen_infos = &requests[0].body["listenInfos"];
        assert_eq!(listen_infos[0]["protocol"], "udp");
        assert_eq!(listen_infos[0]["ip"], "127.0.0.1");
        assert_eq!(listen_infos[0]["port"], 44444);
        assert_eq!(listen_infos[1]["protocol"], "tcp");
        assert_eq!(listen_infos[1]["announcedIp"], "9.9.9.2");
    });
}

#[test]
fn webrtc_transport_with_server_uses_server_sockets() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let webrtc_server = create_webrtc_server(&worker).await;

        let new_webrtc_transport_count = Arc::new(AtomicUsize::new(0));
        let _handler = webrtc_server.on_new_webrtc_transport({
            let new_webrtc_transport_count = Arc::clone(&new_webrtc_transport_count);

            move |_webrtc_transport| {
                new_webrtc_transport_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let transport = router
            .create_webrtc_transport({
                let mut options = WebRtcTransportOptions::new_with_server(webrtc_server.clone());
                options.enable_tcp = true;
                options
            })
            .await
            .expect("Failed to create WebRTC transport");

        assert_eq!(new_webrtc_transport_count.load(Ordering::SeqCst), 1);
        assert_eq!(transport.webrtc_server_id(), Some(webrtc_server.id()));
        assert_eq!(webrtc_server.webrtc_transport_ids(), vec![transport.id()]);

        let ice_candidates = transport.ice_candidates();
        assert_eq!(ice_candidates.len(), 2);
        assert_eq!(ice_candidates[0].protocol, Protocol::Udp);
        assert_eq!(ice_candidates[0].port, 44444);
        assert_eq!(ice_candidates[1].protocol, Protocol::Tcp);
        assert_eq!(ice_candidates[1].ip, IpAddr::V4(Ipv4Addr::new(9, 9, 9, 2)));
        assert_eq!(ice_candidates[1].port, 44445);

        assert!(mock_worker
            .requests_with_method("router.createWebRtcTransport")
            .is_empty());
        let requests = mock_worker.requests_with_method("router.createWebRtcTransportWithServer");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].handler_id, router.id().to_string());
        assert_eq!(
            requests[0].body["webRtcServerId"],
            webrtc_server.id().to_string(),
        );

        transport.close().await;

        assert!(webrtc_server.webrtc_transport_ids().is_empty());
    });
}

#[test]
fn closing_webrtc_server_closes_its_transports() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;
        let router = create_router(&worker).await;
        let webrtc_server = create_webrtc_server(&worker).await;

        let transport = router
            .create_webrtc_transport(WebRtcTransportOptions::new_with_server(
                webrtc_server.clone(),
            ))
            .await
            .expect("Failed to create WebRTC transport");

        let (mut server_close_tx, server_close_rx) = async_oneshot::oneshot::<()>();
        let _transport_handler = transport.on_webrtc_server_close(move || {
            let _ = server_close_tx.send(());
        });

        webrtc_server.close().await;

        within_timeout(server_close_rx)
            .await
            .expect("Failed to receive webrtc_server_close event");
        assert!(webrtc_server.closed());
        assert!(transport.closed());
        assert!(router.transports().is_empty());
        assert!(worker.webrtc_servers().is_empty());

        let requests = mock_worker.requests_with_method("worker.closeWebRtcServer");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].handler_id, "");
        assert_eq!(
            requests[0].body["webRtcServerId"],
            webrtc_server.id().to_string(),
        );
        // Worker closes the transports on its side
        assert!(mock_worker
            .requests_with_method("router.closeTransport")
            .is_empty());

        // Closing again is a no-op
        webrtc_server.close().await;
        assert_eq!(
            mock_worker
                .requests_with_method("worker.closeWebRtcServer")
                .len(),
            1,
        );
    });
}
