use crate::fixtures::{create_router, listen_ip};
use crate::mock_worker::{init, wait_until, within_timeout, MockWorker, PID};
use futures_lite::future;
use mediasoup_controller::data_structures::Protocol;
use mediasoup_controller::webrtc_server::{
    WebRtcServerListenInfo, WebRtcServerListenInfos, WebRtcServerOptions,
};
use mediasoup_controller::worker::{WorkerLogLevel, WorkerLogTag, WorkerUpdateSettings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn create_worker_waits_for_running_notification() {
    future::block_on(async move {
        let worker_manager = init();

        let new_worker_count = Arc::new(AtomicUsize::new(0));
        let _handler = worker_manager.on_new_worker({
            let new_worker_count = Arc::clone(&new_worker_count);

            move |worker| {
                assert_eq!(worker.pid(), PID);
                new_worker_count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;

        assert_eq!(worker.pid(), PID);
        assert!(!worker.closed());
        assert!(worker.routers().is_empty());
        assert_eq!(new_worker_count.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn dump_lists_routers_and_webrtc_servers() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;

        let router = create_router(&worker).await;
        let webrtc_server = worker
            .create_webrtc_server(WebRtcServerOptions::new(WebRtcServerListenInfos::new(
                WebRtcServerListenInfo {
                    protocol: Protocol::Udp,
                    listen_ip: listen_ip(),
                    port: 44444,
                },
            )))
            .await
            .expect("Failed to create WebRTC server");

        let dump = worker.dump().await.expect("Failed to dump worker");

        assert_eq!(dump.pid, PID);
        assert_eq!(dump.router_ids, vec![router.id()]);
        assert_eq!(dump.web_rtc_server_ids, vec![webrtc_server.id()]);

        assert_eq!(
            mock_worker.methods(),
            vec![
                "worker.createRouter",
                "worker.createWebRtcServer",
                "worker.dump",
            ],
        );
        for request in mock_worker.requests() {
            assert_eq!(request.handler_id, "");
        }
    });
}

#[test]
fn get_resource_usage_succeeds() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;

        let usage = worker
            .get_resource_usage()
            .await
            .expect("Failed to get worker's resource usage");

        assert_eq!(usage.ru_utime, 120);
        assert_eq!(usage.ru_maxrss, 40960);
        assert_eq!(usage.ru_nivcsw, 3);
    });
}

#[test]
fn update_settings_sends_only_given_fields() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;

        worker
            .update_settings({
                let mut settings = WorkerUpdateSettings::default();
                settings.log_level = Some(WorkerLogLevel::Debug);
                settings.log_tags = Some(vec![WorkerLogTag::Info, WorkerLogTag::Ice]);
                settings
            })
            .await
            .expect("Failed to update settings");

        worker
            .update_settings({
                let mut settings = WorkerUpdateSettings::default();
                settings.log_level = Some(WorkerLogLevel::None);
                settings
            })
            .await
            .expect("Failed to update settings");

        let requests = mock_worker.requests_with_method("worker.updateSettings");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body["logLevel"], "debug");
        assert_eq!(requests[0].body["logTags"][0], "info");
        assert_eq!(requests[0].body["logTags"][1], "ice");
        assert_eq!(requests[1].body["logLevel"], "none");
        assert!(requests[1].body.get("logTags").is_none());
    });
}

#[test]
fn log_lines_do_not_disturb_requests() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;

        mock_worker.log("D(debug) RTC::Router::Router() | constructor").await;
        mock_worker.log("W(warn) RTC::Transport::Connect() | already connected").await;
        mock_worker.log("E(error) RTC::Consumer::Pause() | failed").await;
        mock_worker.log("Xdump output").await;

        let router = create_router(&worker).await;

        assert_eq!(worker.routers().len(), 1);
        assert_eq!(worker.routers()[0].id(), router.id());
    });
}

#[test]
fn close_closes_routers_and_webrtc_servers() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;

        let router = create_router(&worker).await;
        let webrtc_server = worker
            .create_webrtc_server(WebRtcServerOptions::new(WebRtcServerListenInfos::new(
                WebRtcServerListenInfo {
                    protocol: Protocol::Tcp,
                    listen_ip: listen_ip(),
                    port: 44445,
                },
            )))
            .await
            .expect("Failed to create WebRTC server");

        let (mut router_worker_close_tx, router_worker_close_rx) = async_oneshot::oneshot::<()>();
        let _router_handler = router.on_worker_close(move || {
            let _ = router_worker_close_tx.send(());
        });
        let (mut server_close_tx, server_close_rx) = async_oneshot::oneshot::<()>();
        let _server_handler = webrtc_server.on_close(move || {
            let _ = server_close_tx.send(());
        });
        let (mut worker_close_tx, worker_close_rx) = async_oneshot::oneshot::<()>();
        let _worker_handler = worker.on_close(move || {
            let _ = worker_close_tx.send(());
        });

        worker.close().await;

        within_timeout(router_worker_close_rx)
            .await
            .expect("Failed to receive worker_close event");
        within_timeout(server_close_rx)
            .await
            .expect("Failed to receive close event");
        within_timeout(worker_close_rx)
            .await
            .expect("Failed to receive close event");

        assert!(worker.closed());
        assert!(router.closed());
        assert!(webrtc_server.closed());
        assert!(worker.routers().is_empty());
        assert!(worker.webrtc_servers().is_empty());
        assert_eq!(mock_worker.methods().last().map(String::as_str), Some("worker.close"));
    });
}

#[test]
fn channel_loss_is_reported_as_death() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, mock_worker) = MockWorker::start(&worker_manager).await;

        let router = create_router(&worker).await;

        let (mut dead_tx, dead_rx) = async_oneshot::oneshot::<()>();
        let _dead_handler = worker.on_dead(move || {
            let _ = dead_tx.send(());
        });
        let (mut router_close_tx, router_close_rx) = async_oneshot::oneshot::<()>();
        let _router_handler = router.on_close(move || {
            let _ = router_close_tx.send(());
        });

        mock_worker.kill();

        within_timeout(dead_rx)
            .await
            .expect("Failed to receive dead event");
        within_timeout(router_close_rx)
            .await
            .expect("Failed to receive close event");

        assert!(worker.closed());
        assert!(router.closed());

        let error = worker
            .create_router(Default::default())
            .await
            .expect_err("Router created on a dead worker");
        assert!(matches!(
            error,
            mediasoup_controller::worker::CreateRouterError::Request(_),
        ));
    });
}

#[test]
fn dropping_worker_closes_routers() {
    future::block_on(async move {
        let worker_manager = init();
        let (worker, _mock_worker) = MockWorker::start(&worker_manager).await;

        let router = create_router(&worker).await;
        let router_closed = Arc::new(AtomicUsize::new(0));
        router
            .on_close({
                let router_closed = Arc::clone(&router_closed);

                move || {
                    router_closed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .detach();

        drop(worker);

        wait_until(|| router_closed.load(Ordering::SeqCst) == 1).await;
        assert!(router.closed());
    });
}
