//! Binary protocol between document sessions and the collaboration server.
//!
//! Wire format (bincode-encoded envelope, JSON payload):
//! ```text
//! ┌──────────┬──────────┬────────────┬──────────────────────┐
//! │ msg_type │ doc_id   │ request_id │ payload              │
//! │ 1 byte   │ 16 bytes │ varint     │ JSON, variable       │
//! └──────────┴──────────┴────────────┴──────────────────────┘
//! ```
//!
//! Payloads stay JSON so deltas keep their canonical `{"ops": [...]}`
//! shape end to end. Requests that expect an answer carry a non-zero
//! `request_id`; the server answers with an `Ack` echoing it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quire_core::{Delta, HistorySnapshot, Template};

/// Message types for the document protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Request the current document state
    GetDocument = 1,
    /// Current document state, answer to `GetDocument`
    LoadDocument = 2,
    /// Local edit broadcast to the other participants
    SendChanges = 3,
    /// Edit relayed from another participant
    ReceiveChanges = 4,
    /// Persist the document (acknowledged)
    SaveDocument = 5,
    /// Request the snapshot list of a document
    GetHistory = 6,
    /// Snapshot list, answer to `GetHistory`
    LoadHistory = 7,
    /// Store a new template (acknowledged with a bool)
    SaveAsTemplate = 8,
    /// Request the template catalog (acknowledged with the list)
    GetTemplates = 9,
    /// Request one template body (acknowledged with the template)
    GetTemplate = 10,
    /// Answer to a request carrying a `request_id`
    Ack = 11,
    /// Heartbeat ping
    Ping = 12,
    /// Heartbeat pong
    Pong = 13,
}

/// Body of a `SaveDocument` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePayload {
    pub data: Delta,
    /// HTML rendering of `data`
    pub rendered: String,
}

/// Body of a `SaveAsTemplate` request. The server stamps the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub id: Uuid,
    pub name: String,
    pub data: Delta,
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    /// Document the message belongs to (nil for catalog-wide requests)
    pub doc_id: Uuid,
    /// Correlates a request with its `Ack` (0 = no answer expected)
    pub request_id: u64,
    /// JSON payload (varies by msg_type)
    pub payload: Vec<u8>,
}

impl SyncMessage {
    fn new(msg_type: MessageType, doc_id: Uuid, request_id: u64, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            doc_id,
            request_id,
            payload,
        }
    }

    fn with_json<T: Serialize + ?Sized>(
        msg_type: MessageType,
        doc_id: Uuid,
        request_id: u64,
        body: &T,
    ) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        Ok(Self::new(msg_type, doc_id, request_id, payload))
    }

    /// Ask for the current state of a document.
    pub fn get_document(doc_id: Uuid) -> Self {
        Self::new(MessageType::GetDocument, doc_id, 0, Vec::new())
    }

    /// Deliver the current state of a document.
    pub fn load_document(doc_id: Uuid, document: &Delta) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::LoadDocument, doc_id, 0, document)
    }

    /// Broadcast a local edit.
    pub fn send_changes(doc_id: Uuid, document: &Delta) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::SendChanges, doc_id, 0, document)
    }

    /// Relay an edit to the other participants.
    pub fn receive_changes(doc_id: Uuid, document: &Delta) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::ReceiveChanges, doc_id, 0, document)
    }

    /// Persist a document.
    pub fn save_document(
        doc_id: Uuid,
        request_id: u64,
        body: &SavePayload,
    ) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::SaveDocument, doc_id, request_id, body)
    }

    /// Ask for the snapshot list of a document.
    pub fn get_history(doc_id: Uuid) -> Self {
        Self::new(MessageType::GetHistory, doc_id, 0, Vec::new())
    }

    /// Deliver the snapshot list of a document.
    pub fn load_history(doc_id: Uuid, snapshots: &[HistorySnapshot]) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::LoadHistory, doc_id, 0, snapshots)
    }

    /// Store a template.
    pub fn save_as_template(request_id: u64, draft: &TemplateDraft) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::SaveAsTemplate, Uuid::nil(), request_id, draft)
    }

    /// Ask for the template catalog.
    pub fn get_templates(request_id: u64) -> Self {
        Self::new(MessageType::GetTemplates, Uuid::nil(), request_id, Vec::new())
    }

    /// Ask for one template.
    pub fn get_template(request_id: u64, template_id: Uuid) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::GetTemplate, Uuid::nil(), request_id, &template_id)
    }

    /// Answer a request. `()` encodes as an empty acknowledgment.
    pub fn ack<T: Serialize + ?Sized>(
        doc_id: Uuid,
        request_id: u64,
        body: &T,
    ) -> Result<Self, ProtocolError> {
        Self::with_json(MessageType::Ack, doc_id, request_id, body)
    }

    /// Create a ping message.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Uuid::nil(), 0, Vec::new())
    }

    /// Create a pong message.
    pub fn pong() -> Self {
        Self::new(MessageType::Pong, Uuid::nil(), 0, Vec::new())
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    fn json<T: DeserializeOwned>(&self, expected: &[MessageType]) -> Result<T, ProtocolError> {
        if !expected.contains(&self.msg_type) {
            return Err(ProtocolError::InvalidMessageType);
        }
        serde_json::from_slice(&self.payload)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    /// Parse the document carried by a load/send/receive message.
    pub fn delta(&self) -> Result<Delta, ProtocolError> {
        self.json(&[
            MessageType::LoadDocument,
            MessageType::SendChanges,
            MessageType::ReceiveChanges,
        ])
    }

    /// Parse a `SaveDocument` body.
    pub fn save_payload(&self) -> Result<SavePayload, ProtocolError> {
        self.json(&[MessageType::SaveDocument])
    }

    /// Parse a `LoadHistory` body, in the order the server sent it.
    pub fn history(&self) -> Result<Vec<HistorySnapshot>, ProtocolError> {
        self.json(&[MessageType::LoadHistory])
    }

    /// Parse a `SaveAsTemplate` body.
    pub fn template_draft(&self) -> Result<TemplateDraft, ProtocolError> {
        self.json(&[MessageType::SaveAsTemplate])
    }

    /// Parse the id carried by a `GetTemplate` request.
    pub fn template_id(&self) -> Result<Uuid, ProtocolError> {
        self.json(&[MessageType::GetTemplate])
    }

    /// Parse an `Ack` body.
    pub fn ack_body<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        self.json(&[MessageType::Ack])
    }

    /// Parse a template list acknowledgment.
    pub fn templates(&self) -> Result<Vec<Template>, ProtocolError> {
        self.ack_body()
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
    /// Outgoing buffer is full
    Backpressure,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Backpressure => write!(f, "Outgoing buffer full"),
        }
    }
}

impl std::error::Error for ProtocolError {}
