//! Client-side state machine owning one document.
//!
//! ```text
//!  Connecting ──Opened──► AwaitingDocument ──load-document──► Live ──close()──► Closed
//!                          (get-document sent)                 │ ▲
//!                                                Disconnected  │ │ Opened: flush, re-issue
//!                                                              ▼ │ get-document
//!                                                         (Reconnecting)
//! ```
//!
//! The session is synchronous: it never awaits. Transport events are fed
//! through [`SyncSession::handle_event`], local edits through
//! [`SyncSession::apply_local_change`], and the debounced save fires from
//! [`SyncSession::poll_save`] once [`SyncSession::save_deadline`] passes.
//! [`crate::driver`] wires these to a tokio task.
//!
//! Remote changes replace the local document (last writer wins); no
//! transform of concurrent edits is attempted.
//!
//! Acks do not survive a lost link. Outstanding requests are failed on
//! `Disconnected` and an unacknowledged save is sent again after reconnect.

use std::collections::HashMap;

use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use uuid::Uuid;

use quire_core::{merge_at, sort_newest_first, to_html, Delta, Template};

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::outbox::Outbox;
use crate::protocol::{MessageType, ProtocolError, SavePayload, SyncMessage, TemplateDraft};
use crate::transport::{Transport, TransportEvent};

/// Lifecycle of a document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingDocument,
    Live,
    Closed,
}

/// Link status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    /// Transport released or its task ended
    Closed,
}

/// Persistence indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
}

/// Provenance of a local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Typed by the user: broadcast and scheduled for saving
    User,
    /// Applied by code (remote apply, template insert): local only
    Programmatic,
}

/// Resolves with the refreshed template catalog, newest first.
pub type TemplateCatalog = oneshot::Receiver<Result<Vec<Template>, SessionError>>;

/// Request awaiting an `Ack`.
enum Pending {
    Save,
    SaveTemplate(oneshot::Sender<bool>),
    Templates(oneshot::Sender<Result<Vec<Template>, SessionError>>),
    Template(oneshot::Sender<bool>),
}

pub struct SyncSession<T: Transport> {
    doc_id: Uuid,
    config: ClientConfig,
    transport: T,
    state: SessionState,
    document: Delta,
    last_change: Delta,
    cursor: usize,
    outbox: Outbox,
    /// A get-document is outstanding; exactly one load-document is accepted
    load_requested: bool,
    save_deadline: Option<Instant>,
    next_request_id: u64,
    pending: HashMap<u64, Pending>,

    state_tx: watch::Sender<SessionState>,
    connection_tx: watch::Sender<ConnectionState>,
    save_status_tx: watch::Sender<SaveStatus>,
    templates_tx: watch::Sender<Vec<Template>>,
    document_tx: watch::Sender<Delta>,
}

impl<T: Transport> SyncSession<T> {
    /// Create a session for `doc_id` over a transport that is still connecting.
    pub fn new(doc_id: Uuid, transport: T, config: ClientConfig) -> Self {
        let outbox = Outbox::new(config.outbox_capacity);
        Self {
            doc_id,
            config,
            transport,
            state: SessionState::Connecting,
            document: Delta::new(),
            last_change: Delta::new(),
            cursor: 0,
            outbox,
            load_requested: false,
            save_deadline: None,
            next_request_id: 1,
            pending: HashMap::new(),
            state_tx: watch::channel(SessionState::Connecting).0,
            connection_tx: watch::channel(ConnectionState::Connecting).0,
            save_status_tx: watch::channel(SaveStatus::Idle).0,
            templates_tx: watch::channel(Vec::new()).0,
            document_tx: watch::channel(Delta::new()).0,
        }
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The live document state.
    pub fn document(&self) -> &Delta {
        &self.document
    }

    /// The most recent change applied to the document, for incremental repaint.
    pub fn last_change(&self) -> &Delta {
        &self.last_change
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection_tx.borrow()
    }

    pub fn save_status(&self) -> SaveStatus {
        *self.save_status_tx.borrow()
    }

    pub fn templates(&self) -> Vec<Template> {
        self.templates_tx.borrow().clone()
    }

    /// Messages waiting for the link to open.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }

    /// Requests sent and not yet acknowledged.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection_tx.subscribe()
    }

    pub fn subscribe_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.save_status_tx.subscribe()
    }

    pub fn subscribe_templates(&self) -> watch::Receiver<Vec<Template>> {
        self.templates_tx.subscribe()
    }

    pub fn subscribe_document(&self) -> watch::Receiver<Delta> {
        self.document_tx.subscribe()
    }

    /// When the pending debounced save is due, if any.
    pub fn save_deadline(&self) -> Option<Instant> {
        self.save_deadline
    }

    /// Move the insertion point. Clamped to the document length.
    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.document.len());
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.state == SessionState::Closed {
            return;
        }
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Disconnected => {
                log::warn!("Document {}: link lost, waiting for reconnect", self.doc_id);
                self.connection_tx.send_replace(ConnectionState::Reconnecting);
                // A save that may not have landed is redone on the next link.
                let save_lost = self.abandon_pending();
                if save_lost && self.state == SessionState::Live && self.save_deadline.is_none() {
                    self.save_deadline = Some(Instant::now());
                }
            }
            TransportEvent::Message(msg) => self.on_message(msg),
        }
    }

    /// The transport task stopped; nothing will reconnect.
    pub fn handle_transport_ended(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        log::warn!("Document {}: transport ended", self.doc_id);
        self.outbox.clear();
        self.abandon_pending();
        self.connection_tx.send_replace(ConnectionState::Closed);
    }

    /// Fail every outstanding request; acks for them will never arrive.
    ///
    /// Returns whether a save was among them.
    fn abandon_pending(&mut self) -> bool {
        if !self.pending.is_empty() {
            log::debug!("Document {}: {} requests abandoned", self.doc_id, self.pending.len());
        }
        let mut save_lost = false;
        for (_, pending) in self.pending.drain() {
            match pending {
                Pending::Save => save_lost = true,
                Pending::SaveTemplate(reply) | Pending::Template(reply) => {
                    let _ = reply.send(false);
                }
                Pending::Templates(reply) => {
                    let _ = reply.send(Err(SessionError::TransportUnavailable));
                }
            }
        }
        save_lost
    }

    fn on_opened(&mut self) {
        let reconnect = self.connection() == ConnectionState::Reconnecting;
        self.connection_tx.send_replace(ConnectionState::Connected);

        for msg in self.outbox.drain() {
            if let Err(e) = self.transport.send(msg) {
                log::warn!("Document {}: replay failed: {e}", self.doc_id);
            }
        }

        if self.state == SessionState::Live && self.save_deadline.is_some() {
            self.save_deadline = None;
            if let Err(e) = self.issue_save() {
                log::warn!("Document {}: save before reload failed: {e}", self.doc_id);
            }
        }

        if reconnect {
            log::info!("Document {}: reconnected, reloading", self.doc_id);
        } else {
            log::info!("Document {}: connected, requesting document", self.doc_id);
        }
        if self.state == SessionState::Connecting {
            self.set_state(SessionState::AwaitingDocument);
        }
        self.load_requested = true;
        if let Err(e) = self.transport.send(SyncMessage::get_document(self.doc_id)) {
            log::warn!("Document {}: get-document failed: {e}", self.doc_id);
        }
    }

    fn on_message(&mut self, msg: SyncMessage) {
        match msg.msg_type {
            MessageType::LoadDocument => self.on_load_document(&msg),
            MessageType::ReceiveChanges => self.on_receive_changes(&msg),
            MessageType::Ack => self.on_ack(&msg),
            MessageType::Ping => {
                if let Err(e) = self.dispatch(SyncMessage::pong()) {
                    log::debug!("Pong not sent: {e}");
                }
            }
            MessageType::Pong => {}
            other => log::debug!("Document {}: ignoring {other:?}", self.doc_id),
        }
    }

    fn on_load_document(&mut self, msg: &SyncMessage) {
        if msg.doc_id != self.doc_id {
            return;
        }
        if !self.load_requested {
            log::debug!("Document {}: ignoring unrequested load-document", self.doc_id);
            return;
        }
        let document = match msg.delta() {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Document {}: bad load-document: {e}", self.doc_id);
                return;
            }
        };
        self.load_requested = false;

        let change = if self.state == SessionState::Live {
            self.document.diff(&document).unwrap_or_else(|e| {
                log::warn!("Document {}: cannot diff reload: {e}", self.doc_id);
                document.clone()
            })
        } else {
            document.clone()
        };
        let first_load = self.state != SessionState::Live;
        self.replace_document(document, change);

        if first_load {
            self.cursor = self.document.len();
            log::info!(
                "Document {}: loaded ({} chars), live",
                self.doc_id,
                self.document.len()
            );
            self.set_state(SessionState::Live);
        } else {
            self.cursor = self.cursor.min(self.document.len());
        }
    }

    fn on_receive_changes(&mut self, msg: &SyncMessage) {
        if msg.doc_id != self.doc_id {
            return;
        }
        if self.state != SessionState::Live {
            log::debug!("Document {}: receive-changes before load, ignored", self.doc_id);
            return;
        }
        let document = match msg.delta() {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Document {}: bad receive-changes: {e}", self.doc_id);
                return;
            }
        };
        match self.document.diff(&document) {
            Ok(change) => {
                self.replace_document(document, change);
                self.cursor = self.cursor.min(self.document.len());
            }
            Err(e) => log::warn!("Document {}: remote state rejected: {e}", self.doc_id),
        }
    }

    fn on_ack(&mut self, msg: &SyncMessage) {
        let Some(pending) = self.pending.remove(&msg.request_id) else {
            log::debug!("Document {}: ack for unknown request {}", self.doc_id, msg.request_id);
            return;
        };
        match pending {
            Pending::Save => {
                log::debug!("Document {}: save acknowledged", self.doc_id);
                // A newer edit keeps the indicator at saving.
                if self.save_deadline.is_none() {
                    self.save_status_tx.send_replace(SaveStatus::Saved);
                }
            }
            Pending::SaveTemplate(reply) => {
                let stored = msg.ack_body::<bool>().unwrap_or(false);
                let _ = reply.send(stored);
            }
            Pending::Templates(reply) => {
                let catalog = match msg.templates() {
                    Ok(mut templates) => {
                        sort_newest_first(&mut templates);
                        self.templates_tx.send_replace(templates.clone());
                        Ok(templates)
                    }
                    Err(e) => {
                        log::warn!("Bad template list: {e}");
                        Err(SessionError::Protocol(e))
                    }
                };
                let _ = reply.send(catalog);
            }
            Pending::Template(reply) => {
                let merged = match msg.ack_body::<Template>() {
                    Ok(template) => match self.apply_template(&template) {
                        Ok(()) => true,
                        Err(e) => {
                            log::warn!("Template {} not inserted: {e}", template.id);
                            false
                        }
                    },
                    Err(e) => {
                        log::warn!("Bad template body: {e}");
                        false
                    }
                };
                let _ = reply.send(merged);
            }
        }
    }

    /// Apply an edit made in this client.
    ///
    /// User edits are broadcast at once and reset the save debounce.
    /// The document is updated even when the broadcast cannot be sent;
    /// that failure is returned afterwards.
    pub fn apply_local_change(
        &mut self,
        change: &Delta,
        source: ChangeSource,
    ) -> Result<(), SessionError> {
        self.ensure_live()?;
        let document = self.document.compose(change)?;
        self.replace_document(document, change.clone());
        self.cursor = self.cursor.min(self.document.len());

        if source == ChangeSource::Programmatic {
            return Ok(());
        }
        let broadcast = SyncMessage::send_changes(self.doc_id, &self.document)
            .map_err(SessionError::from)
            .and_then(|msg| self.dispatch(msg));

        self.save_status_tx.send_replace(SaveStatus::Saving);
        self.save_deadline = Some(Instant::now() + self.config.save_interval);
        broadcast
    }

    /// Issue the debounced save if its deadline has passed.
    ///
    /// Returns whether a save was issued.
    pub fn poll_save(&mut self) -> Result<bool, SessionError> {
        match self.save_deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.save_deadline = None;
                self.issue_save()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn issue_save(&mut self) -> Result<(), SessionError> {
        let body = SavePayload {
            data: self.document.clone(),
            rendered: to_html(&self.document),
        };
        let request_id = self.request_id();
        let msg = SyncMessage::save_document(self.doc_id, request_id, &body)?;
        self.pending.insert(request_id, Pending::Save);
        log::debug!("Document {}: saving ({} chars)", self.doc_id, self.document.len());
        self.dispatch(msg).inspect_err(|_| {
            self.pending.remove(&request_id);
        })
    }

    /// Store the current document as a new template.
    ///
    /// The receiver resolves with the server's verdict.
    pub fn save_as_template(
        &mut self,
        name: impl Into<String>,
    ) -> Result<oneshot::Receiver<bool>, SessionError> {
        self.ensure_live()?;
        let draft = TemplateDraft {
            id: Uuid::new_v4(),
            name: name.into(),
            data: self.document.clone(),
        };
        let request_id = self.request_id();
        let msg = SyncMessage::save_as_template(request_id, &draft)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, Pending::SaveTemplate(tx));
        self.dispatch(msg).inspect_err(|_| {
            self.pending.remove(&request_id);
        })?;
        Ok(rx)
    }

    /// Refresh the template catalog.
    ///
    /// The templates signal is updated as well when the answer arrives.
    pub fn list_templates(&mut self) -> Result<TemplateCatalog, SessionError> {
        self.ensure_open()?;
        let request_id = self.request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, Pending::Templates(tx));
        self.dispatch(SyncMessage::get_templates(request_id))
            .inspect_err(|_| {
                self.pending.remove(&request_id);
            })?;
        Ok(rx)
    }

    /// Fetch a template and merge it at the cursor once it arrives.
    ///
    /// The receiver reports whether the merge happened.
    pub fn insert_template(
        &mut self,
        template_id: Uuid,
    ) -> Result<oneshot::Receiver<bool>, SessionError> {
        self.ensure_live()?;
        let request_id = self.request_id();
        let msg = SyncMessage::get_template(request_id, template_id)?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, Pending::Template(tx));
        self.dispatch(msg).inspect_err(|_| {
            self.pending.remove(&request_id);
        })?;
        Ok(rx)
    }

    /// Merge a template body at the cursor as a programmatic edit.
    pub fn apply_template(&mut self, template: &Template) -> Result<(), SessionError> {
        self.ensure_live()?;
        let cursor = self.cursor.min(self.document.len());
        let merged = merge_at(&self.document, &template.delta, cursor);
        let change = Delta::new().retain(cursor).concat(&template.delta);
        self.replace_document(merged, change);
        self.cursor = cursor + template.delta.len();
        log::debug!("Document {}: template {} merged at {cursor}", self.doc_id, template.id);
        Ok(())
    }

    /// Release the transport and drop pending work. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        log::info!("Document {}: closing", self.doc_id);
        self.save_deadline = None;
        self.load_requested = false;
        self.outbox.clear();
        self.pending.clear();
        self.transport.close();
        self.connection_tx.send_replace(ConnectionState::Closed);
        self.set_state(SessionState::Closed);
    }

    /// Send now when connected, queue while a connection is pending.
    fn dispatch(&mut self, msg: SyncMessage) -> Result<(), SessionError> {
        match self.connection() {
            ConnectionState::Connected => match self.transport.send(msg) {
                Ok(()) => Ok(()),
                Err(ProtocolError::Backpressure) => Err(SessionError::TransportUnavailable),
                Err(e) => Err(SessionError::Protocol(e)),
            },
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                if self.outbox.enqueue(msg) {
                    Ok(())
                } else {
                    Err(SessionError::TransportUnavailable)
                }
            }
            ConnectionState::Closed => Err(SessionError::TransportUnavailable),
        }
    }

    fn replace_document(&mut self, document: Delta, change: Delta) {
        self.document = document;
        self.last_change = change;
        self.document_tx.send_replace(self.document.clone());
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Live => Ok(()),
            SessionState::Closed => Err(SessionError::Closed),
            _ => Err(SessionError::NotLive),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quire_core::attrs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records everything the session sends.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Arc<Mutex<Vec<SyncMessage>>>,
        pub closed: Arc<Mutex<bool>>,
    }

    impl RecordingTransport {
        pub fn of_type(&self, msg_type: MessageType) -> Vec<SyncMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.msg_type == msg_type)
                .cloned()
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, msg: SyncMessage) -> Result<(), ProtocolError> {
            if *self.closed.lock().unwrap() {
                return Err(ProtocolError::ConnectionClosed);
            }
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn session() -> (SyncSession<RecordingTransport>, RecordingTransport) {
        let transport = RecordingTransport::default();
        let session = SyncSession::new(Uuid::new_v4(), transport.clone(), ClientConfig::default());
        (session, transport)
    }

    fn live(text: &str) -> (SyncSession<RecordingTransport>, RecordingTransport) {
        let (mut session, transport) = session();
        session.handle_event(TransportEvent::Opened);
        let load = SyncMessage::load_document(session.doc_id(), &Delta::new().insert(text)).unwrap();
        session.handle_event(TransportEvent::Message(load));
        assert_eq!(session.state(), SessionState::Live);
        (session, transport)
    }

    fn ack<B: serde::Serialize + ?Sized>(msg: &SyncMessage, body: &B) -> TransportEvent {
        TransportEvent::Message(SyncMessage::ack(msg.doc_id, msg.request_id, body).unwrap())
    }

    #[test]
    fn test_requests_document_once_opened() {
        let (mut session, transport) = session();
        assert_eq!(session.state(), SessionState::Connecting);

        session.handle_event(TransportEvent::Opened);
        assert_eq!(session.state(), SessionState::AwaitingDocument);
        assert_eq!(session.connection(), ConnectionState::Connected);

        let requests = transport.of_type(MessageType::GetDocument);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].doc_id, session.doc_id());
    }

    #[test]
    fn test_load_document_goes_live_with_cursor_at_end() {
        let (session, _) = live("Hello\n");
        assert_eq!(session.document(), &Delta::new().insert("Hello\n"));
        assert_eq!(session.cursor(), 6);
        assert_eq!(session.last_change(), &Delta::new().insert("Hello\n"));
    }

    #[test]
    fn test_duplicate_load_document_ignored() {
        let (mut session, _) = live("first\n");
        let again = SyncMessage::load_document(session.doc_id(), &Delta::new().insert("second\n"));
        session.handle_event(TransportEvent::Message(again.unwrap()));
        assert_eq!(session.document(), &Delta::new().insert("first\n"));
    }

    #[test]
    fn test_receive_changes_before_load_ignored() {
        let (mut session, _) = session();
        session.handle_event(TransportEvent::Opened);

        let early = SyncMessage::receive_changes(session.doc_id(), &Delta::new().insert("early\n"));
        session.handle_event(TransportEvent::Message(early.unwrap()));
        assert_eq!(session.state(), SessionState::AwaitingDocument);
        assert!(session.document().is_empty());

        let load = SyncMessage::load_document(session.doc_id(), &Delta::new().insert("real\n"));
        session.handle_event(TransportEvent::Message(load.unwrap()));
        assert_eq!(session.document(), &Delta::new().insert("real\n"));
    }

    #[test]
    fn test_receive_changes_replaces_document() {
        let (mut session, transport) = live("Hello\n");
        let remote = Delta::new().insert("Hallo\n");
        let msg = SyncMessage::receive_changes(session.doc_id(), &remote).unwrap();
        session.handle_event(TransportEvent::Message(msg));

        assert_eq!(session.document(), &remote);
        assert_eq!(
            session.last_change(),
            &Delta::new().retain(1).insert("a").delete(1)
        );
        // Remote changes are neither echoed nor saved.
        assert!(transport.of_type(MessageType::SendChanges).is_empty());
        assert_eq!(session.save_deadline(), None);
    }

    #[test]
    fn test_changes_for_other_documents_ignored() {
        let (mut session, _) = live("mine\n");
        let msg = SyncMessage::receive_changes(Uuid::new_v4(), &Delta::new().insert("theirs\n"));
        session.handle_event(TransportEvent::Message(msg.unwrap()));
        assert_eq!(session.document(), &Delta::new().insert("mine\n"));
    }

    #[test]
    fn test_user_edit_broadcasts_and_schedules_save() {
        let (mut session, transport) = live("Hello\n");
        let change = Delta::new().retain(5).insert(" world");
        session.apply_local_change(&change, ChangeSource::User).unwrap();

        let expected = Delta::new().insert("Hello world\n");
        assert_eq!(session.document(), &expected);
        assert_eq!(session.last_change(), &change);
        assert_eq!(session.save_status(), SaveStatus::Saving);
        assert!(session.save_deadline().is_some());

        let sent = transport.of_type(MessageType::SendChanges);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].delta().unwrap(), expected);
    }

    #[test]
    fn test_programmatic_edit_stays_local() {
        let (mut session, transport) = live("Hello\n");
        let change = Delta::new().retain_with(5, attrs! { "bold" => true });
        session.apply_local_change(&change, ChangeSource::Programmatic).unwrap();

        assert!(transport.of_type(MessageType::SendChanges).is_empty());
        assert_eq!(session.save_deadline(), None);
        assert_eq!(session.save_status(), SaveStatus::Idle);
    }

    #[test]
    fn test_malformed_edit_rejected() {
        let (mut session, transport) = live("Hi\n");
        let result = session.apply_local_change(&Delta::new().retain(10).delete(1), ChangeSource::User);
        assert!(matches!(result, Err(SessionError::Delta(_))));
        assert_eq!(session.document(), &Delta::new().insert("Hi\n"));
        assert!(transport.of_type(MessageType::SendChanges).is_empty());
    }

    #[test]
    fn test_edit_before_live_rejected() {
        let (mut session, _) = session();
        let result = session.apply_local_change(&Delta::new().insert("x"), ChangeSource::User);
        assert!(matches!(result, Err(SessionError::NotLive)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_burst_into_one_save() {
        let (mut session, transport) = live("\n");
        let mut last_edit = Instant::now();

        for i in 0..5 {
            if i > 0 {
                tokio::time::advance(Duration::from_millis(100)).await;
            }
            session
                .apply_local_change(&Delta::new().insert("x"), ChangeSource::User)
                .unwrap();
            last_edit = Instant::now();
            assert!(!session.poll_save().unwrap());
        }
        assert_eq!(session.save_deadline(), Some(last_edit + Duration::from_millis(1000)));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!session.poll_save().unwrap());
        assert!(transport.of_type(MessageType::SaveDocument).is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(session.poll_save().unwrap());
        assert_eq!(Instant::now() - last_edit, Duration::from_millis(1000));

        let saves = transport.of_type(MessageType::SaveDocument);
        assert_eq!(saves.len(), 1);
        let body = saves[0].save_payload().unwrap();
        assert_eq!(body.data, Delta::new().insert("xxxxx\n"));
        assert_eq!(body.rendered, "<p>xxxxx</p>");

        assert!(!session.poll_save().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_status_sequence() {
        let (mut session, transport) = live("\n");
        let status = session.subscribe_save_status();
        assert_eq!(*status.borrow(), SaveStatus::Idle);

        session.apply_local_change(&Delta::new().insert("a"), ChangeSource::User).unwrap();
        assert_eq!(*status.borrow(), SaveStatus::Saving);

        tokio::time::advance(Duration::from_millis(1000)).await;
        session.poll_save().unwrap();
        assert_eq!(*status.borrow(), SaveStatus::Saving);

        let save = transport.of_type(MessageType::SaveDocument).remove(0);
        session.handle_event(ack(&save, &()));
        assert_eq!(*status.borrow(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_save() {
        let (mut session, transport) = live("\n");
        session.apply_local_change(&Delta::new().insert("a"), ChangeSource::User).unwrap();
        session.close();
        session.close();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!session.poll_save().unwrap());
        assert!(transport.of_type(MessageType::SaveDocument).is_empty());
        assert!(*transport.closed.lock().unwrap());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.connection(), ConnectionState::Closed);

        let after = session.apply_local_change(&Delta::new().insert("b"), ChangeSource::User);
        assert!(matches!(after, Err(SessionError::Closed)));
    }

    #[test]
    fn test_events_after_close_ignored() {
        let (mut session, transport) = session();
        session.close();
        session.handle_event(TransportEvent::Opened);
        assert!(transport.of_type(MessageType::GetDocument).is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_reconnect_flushes_outbox_then_reloads() {
        let (mut session, transport) = live("abc\n");
        session.handle_event(TransportEvent::Disconnected);
        assert_eq!(session.connection(), ConnectionState::Reconnecting);
        assert_eq!(session.document(), &Delta::new().insert("abc\n"));

        session.apply_local_change(&Delta::new().insert("x"), ChangeSource::User).unwrap();
        assert_eq!(session.queued(), 1);
        assert_eq!(transport.of_type(MessageType::SendChanges).len(), 0);

        session.handle_event(TransportEvent::Opened);
        assert_eq!(session.queued(), 0);

        let sent = transport.sent.lock().unwrap().clone();
        let kinds: Vec<MessageType> = sent.iter().map(|m| m.msg_type).collect();
        assert_eq!(
            kinds,
            vec![
                MessageType::GetDocument,
                MessageType::SendChanges,
                MessageType::SaveDocument,
                MessageType::GetDocument,
            ]
        );

        let reload = Delta::new().insert("xabc!\n");
        let msg = SyncMessage::load_document(session.doc_id(), &reload).unwrap();
        session.handle_event(TransportEvent::Message(msg));
        assert_eq!(session.document(), &reload);
        assert_eq!(session.last_change(), &Delta::new().retain(4).insert("!"));
    }

    #[test]
    fn test_transport_ended_makes_sends_fail() {
        let (mut session, _) = live("abc\n");
        session.handle_event(TransportEvent::Disconnected);
        let mut merged = session.insert_template(Uuid::new_v4()).unwrap();
        session.handle_transport_ended();
        assert_eq!(session.connection(), ConnectionState::Closed);
        assert_eq!(merged.try_recv(), Ok(false));

        let result = session.apply_local_change(&Delta::new().insert("x"), ChangeSource::User);
        assert!(matches!(result, Err(SessionError::TransportUnavailable)));
        // The local view still reflects the edit.
        assert_eq!(session.document(), &Delta::new().insert("xabc\n"));
    }

    #[test]
    fn test_full_outbox_is_unavailable() {
        let transport = RecordingTransport::default();
        let config = ClientConfig {
            outbox_capacity: 1,
            ..ClientConfig::default()
        };
        let mut session = SyncSession::new(Uuid::new_v4(), transport, config);
        let _queued = session.list_templates().unwrap();
        assert!(matches!(
            session.list_templates(),
            Err(SessionError::TransportUnavailable)
        ));
    }

    #[test]
    fn test_save_as_template_resolves_with_ack() {
        let (mut session, transport) = live("Dear Sir,\n");
        let mut reply = session.save_as_template("Letter").unwrap();
        assert!(reply.try_recv().is_err());

        let request = transport.of_type(MessageType::SaveAsTemplate).remove(0);
        let draft = request.template_draft().unwrap();
        assert_eq!(draft.name, "Letter");
        assert_eq!(draft.data, Delta::new().insert("Dear Sir,\n"));

        session.handle_event(ack(&request, &true));
        assert_eq!(reply.try_recv(), Ok(true));
    }

    #[test]
    fn test_template_ids_are_fresh() {
        let (mut session, transport) = live("x\n");
        let _a = session.save_as_template("A").unwrap();
        let _b = session.save_as_template("B").unwrap();
        let drafts = transport.of_type(MessageType::SaveAsTemplate);
        assert_ne!(
            drafts[0].template_draft().unwrap().id,
            drafts[1].template_draft().unwrap().id
        );
    }

    fn template(name: &str, timestamp: u64, text: &str) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: name.to_string(),
            timestamp,
            delta: Delta::new().insert(text),
        }
    }

    #[test]
    fn test_list_templates_sorted_newest_first() {
        let (mut session, transport) = live("x\n");
        let signal = session.subscribe_templates();
        let mut reply = session.list_templates().unwrap();

        let request = transport.of_type(MessageType::GetTemplates).remove(0);
        let catalog = vec![template("old", 1, "o"), template("new", 9, "n"), template("mid", 5, "m")];
        session.handle_event(ack(&request, &catalog));

        let names: Vec<String> = signal.borrow().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
        assert_eq!(session.templates().len(), 3);
        assert_eq!(reply.try_recv().unwrap().unwrap()[0].name, "new");
        assert_eq!(session.pending_requests(), 0);
    }

    #[test]
    fn test_malformed_template_list_reported() {
        let (mut session, transport) = live("x\n");
        let signal = session.subscribe_templates();
        let mut reply = session.list_templates().unwrap();

        let request = transport.of_type(MessageType::GetTemplates).remove(0);
        session.handle_event(ack(&request, "not a catalog"));

        assert!(matches!(reply.try_recv(), Ok(Err(SessionError::Protocol(_)))));
        assert!(!signal.has_changed().unwrap());
        assert_eq!(session.pending_requests(), 0);
    }

    #[test]
    fn test_disconnect_resolves_outstanding_requests() {
        let (mut session, transport) = live("x\n");
        let mut stored = session.save_as_template("Draft").unwrap();
        let mut merged = session.insert_template(Uuid::new_v4()).unwrap();
        let mut catalog = session.list_templates().unwrap();
        assert_eq!(session.pending_requests(), 3);

        session.handle_event(TransportEvent::Disconnected);
        assert_eq!(stored.try_recv(), Ok(false));
        assert_eq!(merged.try_recv(), Ok(false));
        assert!(matches!(catalog.try_recv(), Ok(Err(SessionError::TransportUnavailable))));
        assert_eq!(session.pending_requests(), 0);

        session.handle_event(TransportEvent::Opened);
        assert_eq!(session.pending_requests(), 0);

        // A late ack for an abandoned request is ignored.
        let request = transport.of_type(MessageType::GetTemplate).remove(0);
        session.handle_event(ack(&request, &template("late", 1, "!")));
        assert_eq!(session.document(), &Delta::new().insert("x\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_save_redone_after_reconnect() {
        let (mut session, transport) = live("\n");
        session.apply_local_change(&Delta::new().insert("a"), ChangeSource::User).unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(session.poll_save().unwrap());
        assert_eq!(session.pending_requests(), 1);

        session.handle_event(TransportEvent::Disconnected);
        assert_eq!(session.pending_requests(), 0);
        assert_eq!(session.save_status(), SaveStatus::Saving);

        session.handle_event(TransportEvent::Opened);
        let saves = transport.of_type(MessageType::SaveDocument);
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[1].save_payload().unwrap().data, Delta::new().insert("a\n"));

        session.handle_event(ack(&saves[1], &()));
        assert_eq!(session.save_status(), SaveStatus::Saved);
    }

    #[test]
    fn test_insert_template_merges_at_cursor() {
        let (mut session, transport) = live("Hello world\n");
        session.set_cursor(6);
        let mut merged = session.insert_template(Uuid::new_v4()).unwrap();

        let request = transport.of_type(MessageType::GetTemplate).remove(0);
        let body = template("greeting", 1, "big ");
        session.handle_event(ack(&request, &body));

        assert_eq!(session.document(), &Delta::new().insert("Hello big world\n"));
        assert_eq!(session.last_change(), &Delta::new().retain(6).insert("big "));
        assert_eq!(session.cursor(), 10);
        assert_eq!(merged.try_recv(), Ok(true));
        assert!(transport.of_type(MessageType::SendChanges).is_empty());
        assert_eq!(session.save_deadline(), None);
    }

    #[test]
    fn test_cursor_is_clamped() {
        let (mut session, _) = live("abc\n");
        session.set_cursor(100);
        assert_eq!(session.cursor(), 4);
        session.apply_template(&template("t", 1, "!")).unwrap();
        assert_eq!(session.document(), &Delta::new().insert("abc\n!"));
    }

    #[test]
    fn test_ping_answered() {
        let (mut session, transport) = live("\n");
        session.handle_event(TransportEvent::Message(SyncMessage::ping()));
        assert_eq!(transport.of_type(MessageType::Pong).len(), 1);
    }
}
