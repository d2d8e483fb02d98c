//! In-process stand-in for the media worker process.
//!
//! Speaks the worker side of both channels over socket pairs. Requests are answered with data
//! shaped like the real worker's responses, and the notifications the real worker would emit as a
//! consequence of a request (producer pause reaching its consumers for instance) are emitted too.

use async_io::{Async, Timer};
use futures_lite::io::BufReader;
use futures_lite::{future, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use mediasoup_controller::worker::{Worker, WorkerSettings};
use mediasoup_controller::worker_manager::WorkerManager;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::future::Future;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const PID: u32 = 4242;

const FIRST_PORT: u16 = 40000;

const SRTP_KEY: &str = "ZnQ3eWJraDg0d3ZoYzM5cXN1Y2pnaHU5NWxrZTVv";

#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub handler_id: String,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct ReceivedPayloadMessage {
    /// Method of a request or event of a notification.
    pub name: String,
    pub handler_id: String,
    pub body: Value,
    pub payload: Vec<u8>,
    pub is_request: bool,
}

struct MockTransport {
    router_id: String,
    kind: &'static str,
    local_ip: Value,
    local_port: u16,
}

struct MockProducer {
    id: String,
    transport_id: String,
    paused: bool,
    consumer_ids: Vec<String>,
}

struct HeldResponses {
    count: usize,
    batches: Vec<Vec<Value>>,
}

#[derive(Default)]
struct State {
    requests: Vec<ReceivedRequest>,
    payload_messages: Vec<ReceivedPayloadMessage>,
    rejections: HashMap<String, String>,
    router_ids: Vec<String>,
    webrtc_servers: Vec<(String, Vec<Value>)>,
    transports: HashMap<String, MockTransport>,
    producers: Vec<MockProducer>,
    data_producers: Vec<MockProducer>,
    allocated_ports: u16,
    ice_generation: u32,
    held: Option<HeldResponses>,
}

impl State {
    /// Returns messages to write back, notifications caused by the request go before its
    /// response.
    fn handle_request(
        &mut self,
        id: u32,
        method: &str,
        handler_id: &str,
        body: Value,
    ) -> Vec<Value> {
        self.requests.push(ReceivedRequest {
            method: method.to_string(),
            handler_id: handler_id.to_string(),
            body: body.clone(),
        });

        let mut messages = Vec::new();
        let rejection = self.rejections.get(method).cloned();
        let response = match rejection {
            Some(reason) => json!({"id": id, "error": "Error", "reason": reason}),
            None => match self.respond(method, handler_id, &body, &mut messages) {
                Value::Null => json!({"id": id, "accepted": true}),
                data => json!({"id": id, "accepted": true, "data": data}),
            },
        };
        messages.push(response);

        match self.held.as_mut() {
            None => messages,
            Some(held) => {
                held.batches.push(messages);
                if held.batches.len() < held.count {
                    return Vec::new();
                }
                let batches = std::mem::take(&mut held.batches);
                self.held = None;
                batches.into_iter().rev().flatten().collect()
            }
        }
    }

    fn respond(
        &mut self,
        method: &str,
        handler_id: &str,
        body: &Value,
        notifications: &mut Vec<Value>,
    ) -> Value {
        match method {
            "worker.createRouter" => {
                self.router_ids.push(string(body, "routerId"));
                Value::Null
            }
            "worker.closeRouter" => {
                let router_id = string(body, "routerId");
                self.router_ids.retain(|id| *id != router_id);
                Value::Null
            }
            "worker.createWebRtcServer" => {
                let listen_infos = body["listenInfos"].as_array().cloned().unwrap_or_default();
                self.webrtc_servers
                    .push((string(body, "webRtcServerId"), listen_infos));
                Value::Null
            }
            "worker.closeWebRtcServer" => {
                let webrtc_server_id = string(body, "webRtcServerId");
                self.webrtc_servers.retain(|(id, _)| *id != webrtc_server_id);
                Value::Null
            }
            "worker.dump" => json!({
                "pid": PID,
                "routerIds": self.router_ids,
                "webRtcServerIds": self
                    .webrtc_servers
                    .iter()
                    .map(|(id, _)| id.clone())
                    .collect::<Vec<_>>(),
            }),
            "worker.getResourceUsage" => resource_usage(),
            "router.dump" => json!({
                "id": handler_id,
                "transportIds": self
                    .transports
                    .iter()
                    .filter(|(_, transport)| transport.router_id == handler_id)
                    .map(|(id, _)| id.clone())
                    .collect::<Vec<_>>(),
            }),
            "router.createWebRtcTransport" | "router.createWebRtcTransportWithServer" => {
                self.create_webrtc_transport(handler_id, body)
            }
            "router.createPlainTransport" => self.create_plain_transport(handler_id, body),
            "router.createPipeTransport" => self.create_pipe_transport(handler_id, body),
            "router.createDirectTransport" => {
                self.add_transport(handler_id, body, "direct", Value::Null);
                Value::Null
            }
            "router.closeTransport" => {
                self.transports.remove(&string(body, "transportId"));
                Value::Null
            }
            "transport.connect" => self.connect(handler_id, body),
            "transport.restartIce" => {
                self.ice_generation += 1;
                json!({ "iceParameters": ice_parameters(self.ice_generation) })
            }
            "transport.produce" => {
                self.producers.push(MockProducer {
                    id: string(body, "producerId"),
                    transport_id: handler_id.to_string(),
                    paused: body["paused"].as_bool().unwrap_or_default(),
                    consumer_ids: vec![],
                });
                let simulcast = body["rtpParameters"]["encodings"]
                    .as_array()
                    .map_or(false, |encodings| encodings.len() > 1);

                json!({ "type": if simulcast { "simulcast" } else { "simple" } })
            }
            "transport.consume" => {
                let producer_paused = match find_in_router(
                    &mut self.producers,
                    &self.transports,
                    &string(body, "producerId"),
                    handler_id,
                ) {
                    Some(producer) => {
                        producer.consumer_ids.push(string(body, "consumerId"));
                        producer.paused
                    }
                    None => false,
                };

                json!({
                    "paused": body["paused"],
                    "producerPaused": producer_paused,
                    "score": {"score": 10, "producerScore": 10, "producerScores": [10]},
                    "preferredLayers": body["preferredLayers"],
                })
            }
            "transport.produceData" => {
                self.data_producers.push(MockProducer {
                    id: string(body, "dataProducerId"),
                    transport_id: handler_id.to_string(),
                    paused: body["paused"].as_bool().unwrap_or_default(),
                    consumer_ids: vec![],
                });

                json!({
                    "type": body["type"],
                    "sctpStreamParameters": body["sctpStreamParameters"],
                    "label": body["label"],
                    "protocol": body["protocol"],
                })
            }
            "transport.consumeData" => {
                let data_producer_paused = match find_in_router(
                    &mut self.data_producers,
                    &self.transports,
                    &string(body, "dataProducerId"),
                    handler_id,
                ) {
                    Some(data_producer) => {
                        data_producer
                            .consumer_ids
                            .push(string(body, "dataConsumerId"));
                        data_producer.paused
                    }
                    None => false,
                };

                json!({
                    "type": body["type"],
                    "sctpStreamParameters": body["sctpStreamParameters"],
                    "label": body["label"],
                    "protocol": body["protocol"],
                    "paused": body["paused"],
                    "dataProducerPaused": data_producer_paused,
                })
            }
            "transport.closeProducer" => {
                close_producer(
                    &mut self.producers,
                    handler_id,
                    &string(body, "producerId"),
                    "producerclose",
                    notifications,
                );
                Value::Null
            }
            "transport.closeConsumer" => {
                forget_consumer(&mut self.producers, &string(body, "consumerId"));
                Value::Null
            }
            "transport.closeDataProducer" => {
                close_producer(
                    &mut self.data_producers,
                    handler_id,
                    &string(body, "dataProducerId"),
                    "dataproducerclose",
                    notifications,
                );
                Value::Null
            }
            "transport.closeDataConsumer" => {
                forget_consumer(&mut self.data_producers, &string(body, "dataConsumerId"));
                Value::Null
            }
            "producer.pause" | "producer.resume" => {
                let paused = method == "producer.pause";
                let event = if paused {
                    "producerpause"
                } else {
                    "producerresume"
                };
                set_paused(&mut self.producers, handler_id, paused, event, notifications);
                Value::Null
            }
            "dataProducer.pause" | "dataProducer.resume" => {
                let paused = method == "dataProducer.pause";
                let event = if paused {
                    "dataproducerpause"
                } else {
                    "dataproducerresume"
                };
                set_paused(
                    &mut self.data_producers,
                    handler_id,
                    paused,
                    event,
                    notifications,
                );
                Value::Null
            }
            "consumer.setPriority" => json!({ "priority": body["priority"] }),
            "consumer.setPreferredLayers" => body.clone(),
            "dataConsumer.getBufferedAmount" => json!({ "bufferedAmount": 0 }),
            _ => Value::Null,
        }
    }

    fn handle_payload_message(&mut self, message: &str, payload: Vec<u8>) -> Option<Value> {
        if let Some(request) = message.strip_prefix("r:") {
            let mut parts = request.splitn(4, ':');
            let id = parts.next()?.parse::<u32>().ok()?;
            let method = parts.next()?;
            let handler_id = parts.next()?;
            let body = serde_json::from_str(parts.next()?).unwrap_or(Value::Null);

            self.payload_messages.push(ReceivedPayloadMessage {
                name: method.to_string(),
                handler_id: handler_id.to_string(),
                body,
                payload,
                is_request: true,
            });

            Some(match self.rejections.get(method) {
                Some(reason) => json!({"id": id, "error": "Error", "reason": reason}),
                None => json!({"id": id, "accepted": true}),
            })
        } else {
            let mut parts = message.strip_prefix("n:")?.splitn(3, ':');
            let event = parts.next()?;
            let handler_id = parts.next()?;
            let body = serde_json::from_str(parts.next()?).unwrap_or(Value::Null);

            self.payload_messages.push(ReceivedPayloadMessage {
                name: event.to_string(),
                handler_id: handler_id.to_string(),
                body,
                payload,
                is_request: false,
            });

            None
        }
    }

    fn allocate_port(&mut self) -> u16 {
        self.allocated_ports += 1;
        FIRST_PORT + self.allocated_ports
    }

    fn add_transport(
        &mut self,
        router_id: &str,
        body: &Value,
        kind: &'static str,
        local_ip: Value,
    ) -> u16 {
        let local_port = self.allocate_port();
        self.transports.insert(
            string(body, "transportId"),
            MockTransport {
                router_id: router_id.to_string(),
                kind,
                local_ip,
                local_port,
            },
        );

        local_port
    }

    fn create_webrtc_transport(&mut self, router_id: &str, body: &Value) -> Value {
        let ice_candidates = match body["webRtcServerId"].as_str() {
            Some(webrtc_server_id) => self
                .webrtc_servers
                .iter()
                .find(|(id, _)| id == webrtc_server_id)
                .map(|(_, listen_infos)| {
                    listen_infos
                        .iter()
                        .map(|listen_info| {
                            ice_candidate(
                                announced_or_ip(listen_info),
                                listen_info["protocol"].as_str().unwrap_or("udp"),
                                listen_info["port"].as_u64().unwrap_or_default() as u16,
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
            None => {
                let mut ice_candidates = Vec::new();
                for listen_ip in body["listenIps"].as_array().into_iter().flatten() {
                    if body["enableUdp"].as_bool() == Some(true) {
                        let port = self.allocate_port();
                        ice_candidates.push(ice_candidate(announced_or_ip(listen_ip), "udp", port));
                    }
                    if body["enableTcp"].as_bool() == Some(true) {
                        let port = self.allocate_port();
                        ice_candidates.push(ice_candidate(announced_or_ip(listen_ip), "tcp", port));
                    }
                }
                ice_candidates
            }
        };

        self.add_transport(router_id, body, "webrtc", Value::Null);

        json!({
            "iceRole": "controlled",
            "iceParameters": ice_parameters(0),
            "iceCandidates": ice_candidates,
            "iceState": "new",
            "iceSelectedTuple": null,
            "dtlsParameters": {
                "role": "auto",
                "fingerprints": [{"algorithm": "sha-256", "value": fingerprint()}],
            },
            "dtlsState": "new",
            "sctpParameters": sctp_parameters(body),
            "sctpState": sctp_state(body),
        })
    }

    fn create_plain_transport(&mut self, router_id: &str, body: &Value) -> Value {
        let local_ip = announced_or_ip(&body["listenIp"]);
        let local_port = self.add_transport(router_id, body, "plain", local_ip.clone());
        let rtcp_mux = body["rtcpMux"].as_bool().unwrap_or(true);
        let rtcp_tuple = if rtcp_mux {
            Value::Null
        } else {
            json!({"localIp": local_ip, "localPort": local_port + 1, "protocol": "udp"})
        };
        let srtp_parameters = if body["enableSrtp"].as_bool() == Some(true) {
            json!({"cryptoSuite": body["srtpCryptoSuite"], "keyBase64": SRTP_KEY})
        } else {
            Value::Null
        };

        json!({
            "rtcpMux": rtcp_mux,
            "comedia": body["comedia"],
            "tuple": {"localIp": local_ip, "localPort": local_port, "protocol": "udp"},
            "rtcpTuple": rtcp_tuple,
            "sctpParameters": sctp_parameters(body),
            "sctpState": sctp_state(body),
            "srtpParameters": srtp_parameters,
        })
    }

    fn create_pipe_transport(&mut self, router_id: &str, body: &Value) -> Value {
        let local_ip = announced_or_ip(&body["listenIp"]);
        let local_port = self.add_transport(router_id, body, "pipe", local_ip.clone());
        let srtp_parameters = if body["enableSrtp"].as_bool() == Some(true) {
            json!({"cryptoSuite": "AEAD_AES_256_GCM", "keyBase64": SRTP_KEY})
        } else {
            Value::Null
        };

        json!({
            "tuple": {"localIp": local_ip, "localPort": local_port, "protocol": "udp"},
            "sctpParameters": sctp_parameters(body),
            "sctpState": sctp_state(body),
            "rtx": body["enableRtx"],
            "srtpParameters": srtp_parameters,
        })
    }

    fn connect(&mut self, transport_id: &str, body: &Value) -> Value {
        let transport = match self.transports.get(transport_id) {
            Some(transport) => transport,
            None => {
                return Value::Null;
            }
        };

        match transport.kind {
            "webrtc" => {
                let dtls_local_role = match body["dtlsParameters"]["role"].as_str() {
                    Some("client") => "server",
                    _ => "client",
                };
                json!({ "dtlsLocalRole": dtls_local_role })
            }
            "plain" => {
                let tuple = if body["ip"].is_null() {
                    Value::Null
                } else {
                    json!({
                        "localIp": transport.local_ip,
                        "localPort": transport.local_port,
                        "remoteIp": body["ip"],
                        "remotePort": body["port"],
                        "protocol": "udp",
                    })
                };
                json!({"tuple": tuple, "rtcpTuple": null, "srtpParameters": null})
            }
            "pipe" => json!({
                "tuple": {
                    "localIp": transport.local_ip,
                    "localPort": transport.local_port,
                    "remoteIp": body["ip"],
                    "remotePort": body["port"],
                    "protocol": "udp",
                },
            }),
            _ => Value::Null,
        }
    }
}

/// Producer with given id living in the same router as the consuming transport.
fn find_in_router<'a>(
    producers: &'a mut [MockProducer],
    transports: &HashMap<String, MockTransport>,
    producer_id: &str,
    consuming_transport_id: &str,
) -> Option<&'a mut MockProducer> {
    let router_id = transports
        .get(consuming_transport_id)
        .map(|transport| transport.router_id.clone());

    producers.iter_mut().find(|producer| {
        producer.id == producer_id
            && transports
                .get(&producer.transport_id)
                .map(|transport| transport.router_id.clone())
                == router_id
    })
}

fn set_paused(
    producers: &mut [MockProducer],
    producer_id: &str,
    paused: bool,
    event: &str,
    notifications: &mut Vec<Value>,
) {
    for producer in producers
        .iter_mut()
        .filter(|producer| producer.id == producer_id && producer.paused != paused)
    {
        producer.paused = paused;
        for consumer_id in &producer.consumer_ids {
            notifications.push(json!({"targetId": consumer_id, "event": event}));
        }
    }
}

fn close_producer(
    producers: &mut Vec<MockProducer>,
    transport_id: &str,
    producer_id: &str,
    event: &str,
    notifications: &mut Vec<Value>,
) {
    if let Some(index) = producers
        .iter()
        .position(|producer| producer.id == producer_id && producer.transport_id == transport_id)
    {
        for consumer_id in producers.remove(index).consumer_ids {
            notifications.push(json!({"targetId": consumer_id, "event": event}));
        }
    }
}

fn forget_consumer(producers: &mut [MockProducer], consumer_id: &str) {
    for producer in producers.iter_mut() {
        producer.consumer_ids.retain(|id| id != consumer_id);
    }
}

fn string(body: &Value, key: &str) -> String {
    body[key].as_str().unwrap_or_default().to_string()
}

fn announced_or_ip(listen_ip: &Value) -> Value {
    if listen_ip["announcedIp"].is_null() {
        listen_ip["ip"].clone()
    } else {
        listen_ip["announcedIp"].clone()
    }
}

fn ice_candidate(ip: Value, protocol: &str, port: u16) -> Value {
    let mut ice_candidate = json!({
        "foundation": format!("{}candidate", protocol),
        "priority": 1_076_302_079_u32,
        "ip": ip,
        "protocol": protocol,
        "port": port,
        "type": "host",
    });
    if protocol == "tcp" {
        ice_candidate["tcpType"] = json!("passive");
    }

    ice_candidate
}

fn ice_parameters(generation: u32) -> Value {
    json!({
        "usernameFragment": format!("ufrag{}", generation),
        "password": format!("password{}", generation),
        "iceLite": true,
    })
}

fn fingerprint() -> String {
    (0..32_u8)
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

fn sctp_parameters(body: &Value) -> Value {
    if body["enableSctp"].as_bool() == Some(true) {
        json!({
            "port": 5000,
            "OS": body["numSctpStreams"]["OS"],
            "MIS": body["numSctpStreams"]["MIS"],
            "maxMessageSize": body["maxSctpMessageSize"],
        })
    } else {
        Value::Null
    }
}

fn sctp_state(body: &Value) -> Value {
    if body["enableSctp"].as_bool() == Some(true) {
        json!("new")
    } else {
        Value::Null
    }
}

fn resource_usage() -> Value {
    json!({
        "ru_utime": 120,
        "ru_stime": 30,
        "ru_maxrss": 40960,
        "ru_ixrss": 0,
        "ru_idrss": 0,
        "ru_isrss": 0,
        "ru_minflt": 2000,
        "ru_majflt": 0,
        "ru_nswap": 0,
        "ru_inblock": 0,
        "ru_oublock": 0,
        "ru_msgsnd": 0,
        "ru_msgrcv": 0,
        "ru_nsignals": 0,
        "ru_nvcsw": 15,
        "ru_nivcsw": 3,
    })
}

fn netstring(message: &[u8]) -> Vec<u8> {
    let mut bytes = format!("{}:", message.len()).into_bytes();
    bytes.extend_from_slice(message);
    bytes.push(b',');
    bytes
}

async fn read_netstring<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<Vec<u8>> {
    let mut length = Vec::new();
    if reader.read_until(b':', &mut length).await.ok()? == 0 {
        return None;
    }
    length.pop();
    let length = std::str::from_utf8(&length).ok()?.parse::<usize>().ok()?;

    let mut bytes = vec![0; length + 1];
    reader.read_exact(&mut bytes).await.ok()?;
    bytes.pop();

    Some(bytes)
}

async fn serve(
    control: Async<UnixStream>,
    payload: Async<UnixStream>,
    state: Arc<Mutex<State>>,
    control_sender: async_channel::Sender<Vec<u8>>,
    control_receiver: async_channel::Receiver<Vec<u8>>,
    payload_sender: async_channel::Sender<Vec<u8>>,
    payload_receiver: async_channel::Receiver<Vec<u8>>,
) {
    let (control_reader, mut control_writer) = futures_lite::io::split(control);
    let (payload_reader, mut payload_writer) = futures_lite::io::split(payload);

    let read_control = {
        let state = Arc::clone(&state);

        async move {
            let mut reader = BufReader::new(control_reader);

            while let Some(bytes) = read_netstring(&mut reader).await {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let mut parts = text.splitn(4, ':');
                let (id, method, handler_id, body) = match (
                    parts.next().and_then(|id| id.parse::<u32>().ok()),
                    parts.next(),
                    parts.next(),
                    parts.next(),
                ) {
                    (Some(id), Some(method), Some(handler_id), Some(body)) => (
                        id,
                        method,
                        handler_id,
                        serde_json::from_str(body).unwrap_or(Value::Null),
                    ),
                    _ => continue,
                };

                let messages = state.lock().handle_request(id, method, handler_id, body);
                for message in messages {
                    let frame = netstring(message.to_string().as_bytes());
                    if control_sender.send(frame).await.is_err() {
                        return;
                    }
                }
            }
        }
    };

    let write_control = async move {
        while let Ok(bytes) = control_receiver.recv().await {
            if control_writer.write_all(&bytes).await.is_err() {
                break;
            }
            if control_writer.flush().await.is_err() {
                break;
            }
        }
    };

    let read_payload = async move {
        let mut reader = BufReader::new(payload_reader);

        loop {
            let message = match read_netstring(&mut reader).await {
                Some(message) => message,
                None => break,
            };
            let payload = match read_netstring(&mut reader).await {
                Some(payload) => payload,
                None => break,
            };

            let response = state
                .lock()
                .handle_payload_message(&String::from_utf8_lossy(&message), payload);
            if let Some(response) = response {
                let frame = netstring(response.to_string().as_bytes());
                if payload_sender.send(frame).await.is_err() {
                    break;
                }
            }
        }
    };

    let write_payload = async move {
        while let Ok(bytes) = payload_receiver.recv().await {
            if payload_writer.write_all(&bytes).await.is_err() {
                break;
            }
            if payload_writer.flush().await.is_err() {
                break;
            }
        }
    };

    future::or(
        future::or(read_control, write_control),
        future::or(read_payload, write_payload),
    )
    .await;
}

/// Worker side of a [`Worker`] created over socket pairs, runs on its own thread until killed or
/// until the controller closes the channel.
pub struct MockWorker {
    state: Arc<Mutex<State>>,
    control_sender: async_channel::Sender<Vec<u8>>,
    payload_sender: async_channel::Sender<Vec<u8>>,
    kill_sender: async_channel::Sender<()>,
}

impl Drop for MockWorker {
    fn drop(&mut self) {
        self.kill();
    }
}

impl MockWorker {
    pub async fn start(worker_manager: &WorkerManager) -> (Worker, Self) {
        let (local, remote) = Async::<UnixStream>::pair().expect("Failed to create socket pair");
        let (local_payload, remote_payload) =
            Async::<UnixStream>::pair().expect("Failed to create socket pair");

        let state = Arc::new(Mutex::new(State::default()));
        let (control_sender, control_receiver) = async_channel::unbounded::<Vec<u8>>();
        let (payload_sender, payload_receiver) = async_channel::unbounded::<Vec<u8>>();
        let (kill_sender, kill_receiver) = async_channel::bounded::<()>(1);

        control_sender
            .try_send(netstring(
                json!({"targetId": PID.to_string(), "event": "running"})
                    .to_string()
                    .as_bytes(),
            ))
            .expect("Failed to queue running notification");

        {
            let state = Arc::clone(&state);
            let control_sender = control_sender.clone();
            let payload_sender = payload_sender.clone();

            thread::spawn(move || {
                future::block_on(future::or(
                    serve(
                        remote,
                        remote_payload,
                        state,
                        control_sender,
                        control_receiver,
                        payload_sender,
                        payload_receiver,
                    ),
                    async move {
                        // Closed sender means the mock is killed
                        let _ = kill_receiver.recv().await;
                    },
                ));
            });
        }

        let (local_reader, local_writer) = futures_lite::io::split(local);
        let (local_payload_reader, local_payload_writer) = futures_lite::io::split(local_payload);

        let worker = worker_manager
            .create_worker_with_streams(
                local_reader,
                local_writer,
                local_payload_reader,
                local_payload_writer,
                PID,
                WorkerSettings::default(),
            )
            .await
            .expect("Failed to create worker");

        let mock_worker = Self {
            state,
            control_sender,
            payload_sender,
            kill_sender,
        };

        (worker, mock_worker)
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|request| request.method.clone())
            .collect()
    }

    pub fn requests_with_method(&self, method: &str) -> Vec<ReceivedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.method == method)
            .cloned()
            .collect()
    }

    pub fn payload_messages(&self) -> Vec<ReceivedPayloadMessage> {
        self.state.lock().payload_messages.clone()
    }

    /// Every following request with this method is answered with an error.
    pub fn reject(&self, method: &str, reason: &str) {
        self.state
            .lock()
            .rejections
            .insert(method.to_string(), reason.to_string());
    }

    /// Undoes [`MockWorker::reject`].
    pub fn accept(&self, method: &str) {
        self.state.lock().rejections.remove(method);
    }

    /// Hold back responses until `count` requests are received, then answer them in reverse
    /// order.
    pub fn hold_responses(&self, count: usize) {
        self.state.lock().held = Some(HeldResponses {
            count,
            batches: Vec::new(),
        });
    }

    pub async fn notify(&self, target_id: impl Display, event: &str, data: Option<Value>) {
        let message = notification(target_id, event, data);
        let _ = self
            .control_sender
            .send(netstring(message.to_string().as_bytes()))
            .await;
    }

    pub async fn notify_with_payload(
        &self,
        target_id: impl Display,
        event: &str,
        data: Option<Value>,
        payload: &[u8],
    ) {
        let message = notification(target_id, event, data);
        let mut bytes = netstring(message.to_string().as_bytes());
        bytes.extend_from_slice(&netstring(payload));
        let _ = self.payload_sender.send(bytes).await;
    }

    /// Emulates a log line the worker writes to the channel.
    pub async fn log(&self, line: &str) {
        let _ = self.control_sender.send(netstring(line.as_bytes())).await;
    }

    /// Emulates the worker process going away, both channels are closed.
    pub fn kill(&self) {
        self.kill_sender.close();
    }
}

fn notification(target_id: impl Display, event: &str, data: Option<Value>) -> Value {
    let mut message = json!({"targetId": target_id.to_string(), "event": event});
    if let Some(data) = data {
        message["data"] = data;
    }

    message
}

pub fn init() -> WorkerManager {
    {
        let mut builder = env_logger::builder();
        if env::var(env_logger::DEFAULT_FILTER_ENV).is_err() {
            builder.filter_level(log::LevelFilter::Off);
        }
        let _ = builder.is_test(true).try_init();
    }

    WorkerManager::new("mediasoup-worker".into())
}

/// Fails the test instead of hanging when an expected event never comes.
pub async fn within_timeout<T>(future: impl Future<Output = T>) -> T {
    future::or(future, async {
        Timer::after(Duration::from_secs(5)).await;
        panic!("Timed out waiting for an event")
    })
    .await
}

/// Polls until `condition` holds, for effects that only the mock observes.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    within_timeout(async {
        while !condition() {
            Timer::after(Duration::from_millis(5)).await;
        }
    })
    .await;
}
