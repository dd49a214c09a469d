//! In-memory collaboration server for integration tests.
//!
//! Holds documents, history and templates in memory and relays
//! send-changes to every other connection as receive-changes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use quire_collab::protocol::{MessageType, SavePayload, SyncMessage};
use quire_collab::ClientConfig;
use quire_core::{Delta, HistorySnapshot, Template};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

#[derive(Default)]
pub struct RelayState {
    pub documents: HashMap<Uuid, Delta>,
    pub history: HashMap<Uuid, Vec<HistorySnapshot>>,
    pub templates: Vec<Template>,
    pub saves: Vec<(Uuid, SavePayload)>,
    pub get_document_requests: usize,
    clock: u64,
}

impl RelayState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[derive(Clone)]
pub struct Relay {
    pub port: u16,
    pub state: Arc<Mutex<RelayState>>,
    fanout: broadcast::Sender<(u64, Vec<u8>)>,
    kick: broadcast::Sender<()>,
}

impl Relay {
    /// Bind a free port and start accepting connections.
    pub async fn start() -> Relay {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let relay = Relay {
            port,
            state: Arc::new(Mutex::new(RelayState::default())),
            fanout: broadcast::channel(256).0,
            kick: broadcast::channel(4).0,
        };

        let server = relay.clone();
        tokio::spawn(async move {
            let mut next_conn = 0u64;
            while let Ok((stream, _)) = listener.accept().await {
                next_conn += 1;
                tokio::spawn(server.clone().serve(stream, next_conn));
            }
        });
        relay
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Client settings with short timers.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            save_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(50),
            ..ClientConfig::default()
        }
        .with_server_url(self.url())
    }

    pub fn seed_document(&self, doc_id: Uuid, document: Delta) {
        self.state.lock().unwrap().documents.insert(doc_id, document);
    }

    pub fn seed_history(&self, doc_id: Uuid, snapshots: Vec<HistorySnapshot>) {
        self.state.lock().unwrap().history.insert(doc_id, snapshots);
    }

    pub fn document(&self, doc_id: Uuid) -> Option<Delta> {
        self.state.lock().unwrap().documents.get(&doc_id).cloned()
    }

    pub fn saves(&self) -> Vec<(Uuid, SavePayload)> {
        self.state.lock().unwrap().saves.clone()
    }

    /// Drop every open connection. Clients may reconnect.
    pub fn drop_connections(&self) {
        let _ = self.kick.send(());
    }

    async fn serve(self, stream: TcpStream, conn_id: u64) {
        let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut room = self.fanout.subscribe();
        let mut kick = self.kick.subscribe();

        loop {
            tokio::select! {
                frame = ws_receiver.next() => match frame {
                    Some(Ok(Message::Binary(data))) => {
                        let Ok(msg) = SyncMessage::decode(&data) else { continue };
                        for reply in self.handle(conn_id, msg) {
                            let encoded = reply.encode().unwrap();
                            if ws_sender.send(Message::Binary(encoded.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                },
                relayed = room.recv() => {
                    if let Ok((from, encoded)) = relayed {
                        if from != conn_id
                            && ws_sender.send(Message::Binary(encoded.into())).await.is_err()
                        {
                            return;
                        }
                    }
                }
                _ = kick.recv() => return,
            }
        }
    }

    fn handle(&self, conn_id: u64, msg: SyncMessage) -> Vec<SyncMessage> {
        let mut state = self.state.lock().unwrap();
        let doc_id = msg.doc_id;
        match msg.msg_type {
            MessageType::GetDocument => {
                state.get_document_requests += 1;
                let document = state.documents.get(&doc_id).cloned().unwrap_or_default();
                vec![SyncMessage::load_document(doc_id, &document).unwrap()]
            }
            MessageType::SendChanges => {
                let document = msg.delta().unwrap();
                let relayed = SyncMessage::receive_changes(doc_id, &document).unwrap();
                state.documents.insert(doc_id, document);
                let _ = self.fanout.send((conn_id, relayed.encode().unwrap()));
                vec![]
            }
            MessageType::SaveDocument => {
                let body = msg.save_payload().unwrap();
                let timestamp = state.tick();
                state.documents.insert(doc_id, body.data.clone());
                state.history.entry(doc_id).or_default().push(HistorySnapshot {
                    id: Uuid::new_v4(),
                    timestamp,
                    delta: body.data.clone(),
                });
                state.saves.push((doc_id, body));
                vec![SyncMessage::ack(doc_id, msg.request_id, &()).unwrap()]
            }
            MessageType::GetHistory => {
                let snapshots = state.history.get(&doc_id).cloned().unwrap_or_default();
                vec![SyncMessage::load_history(doc_id, &snapshots).unwrap()]
            }
            MessageType::SaveAsTemplate => {
                let draft = msg.template_draft().unwrap();
                let timestamp = state.tick();
                state.templates.push(Template {
                    id: draft.id,
                    name: draft.name,
                    timestamp,
                    delta: draft.data,
                });
                vec![SyncMessage::ack(doc_id, msg.request_id, &true).unwrap()]
            }
            MessageType::GetTemplates => {
                vec![SyncMessage::ack(doc_id, msg.request_id, &state.templates).unwrap()]
            }
            MessageType::GetTemplate => {
                let id = msg.template_id().unwrap();
                match state.templates.iter().find(|t| t.id == id) {
                    Some(template) => vec![SyncMessage::ack(doc_id, msg.request_id, template).unwrap()],
                    None => vec![SyncMessage::ack(doc_id, msg.request_id, &false).unwrap()],
                }
            }
            MessageType::Ping => vec![SyncMessage::pong()],
            _ => vec![],
        }
    }
}
