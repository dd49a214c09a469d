//! Runs a [`SyncSession`] on a tokio task.
//!
//! ```text
//!  SessionHandle ──Command──┐
//!                           ▼
//!  TransportEvent ──► select! loop ──► SyncSession
//!                           ▲
//!  save deadline ───────────┘ (sleep_until)
//! ```
//!
//! All mutation happens inside the task; handles only send commands and
//! watch the session's signals.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use quire_core::{sort_newest_first, Delta, Template};

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::protocol::{MessageType, SyncMessage};
use crate::session::{
    ChangeSource, ConnectionState, SaveStatus, SessionState, SyncSession, TemplateCatalog,
};
use crate::transport::{Transport, TransportEvent, WsTransport};

/// How long requests wait for their answer.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Edit {
        change: Delta,
        source: ChangeSource,
        reply: Reply<()>,
    },
    SetCursor(usize),
    SaveAsTemplate {
        name: String,
        reply: Reply<oneshot::Receiver<bool>>,
    },
    ListTemplates {
        reply: Reply<TemplateCatalog>,
    },
    InsertTemplate {
        id: Uuid,
        reply: Reply<oneshot::Receiver<bool>>,
    },
    Close,
}

/// Cloneable front end to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    doc_id: Uuid,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    connection: watch::Receiver<ConnectionState>,
    save_status: watch::Receiver<SaveStatus>,
    templates: watch::Receiver<Vec<Template>>,
    document: watch::Receiver<Delta>,
}

impl SessionHandle {
    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn save_status(&self) -> SaveStatus {
        *self.save_status.borrow()
    }

    /// Snapshot of the live document.
    pub fn document(&self) -> Delta {
        self.document.borrow().clone()
    }

    pub fn templates(&self) -> Vec<Template> {
        self.templates.borrow().clone()
    }

    pub fn subscribe_document(&self) -> watch::Receiver<Delta> {
        self.document.clone()
    }

    pub fn subscribe_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.save_status.clone()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub fn subscribe_templates(&self) -> watch::Receiver<Vec<Template>> {
        self.templates.clone()
    }

    /// Wait until the document is loaded.
    pub async fn wait_live(&self) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, SessionState::Live | SessionState::Closed))
            .await
            .map_err(|_| SessionError::Closed)?;
        match *reached {
            SessionState::Live => Ok(()),
            _ => Err(SessionError::Closed),
        }
    }

    pub async fn apply_change(
        &self,
        change: Delta,
        source: ChangeSource,
    ) -> Result<(), SessionError> {
        self.call(|reply| Command::Edit {
            change,
            source,
            reply,
        })
        .await
    }

    pub async fn set_cursor(&self, index: usize) -> Result<(), SessionError> {
        self.commands
            .send(Command::SetCursor(index))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Store the current document as a template and wait for the verdict.
    pub async fn save_as_template(&self, name: impl Into<String>) -> Result<bool, SessionError> {
        let name = name.into();
        let verdict = self
            .call(|reply| Command::SaveAsTemplate { name, reply })
            .await?;
        answer(verdict).await
    }

    /// Fetch the catalog, newest first.
    pub async fn list_templates(&self) -> Result<Vec<Template>, SessionError> {
        let catalog = self.call(|reply| Command::ListTemplates { reply }).await?;
        answer(catalog).await?
    }

    /// Merge a template at the cursor. Resolves with whether it was merged.
    pub async fn insert_template(&self, id: Uuid) -> Result<bool, SessionError> {
        let merged = self
            .call(|reply| Command::InsertTemplate { id, reply })
            .await?;
        answer(merged).await
    }

    /// Close the session. Closing twice is harmless.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }

    async fn call<R>(
        &self,
        command: impl FnOnce(Reply<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// Wait for the server's answer to a session request.
async fn answer<R>(reply: oneshot::Receiver<R>) -> Result<R, SessionError> {
    match tokio::time::timeout(REQUEST_TIMEOUT, reply).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(SessionError::Closed),
        Err(_) => Err(SessionError::Timeout),
    }
}

/// Drive `session` on a new task, fed by `events`.
pub fn spawn_session<T: Transport + 'static>(
    session: SyncSession<T>,
    events: mpsc::Receiver<TransportEvent>,
) -> (SessionHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = SessionHandle {
        doc_id: session.doc_id(),
        commands: command_tx,
        state: session.subscribe_state(),
        connection: session.subscribe_connection(),
        save_status: session.subscribe_save_status(),
        templates: session.subscribe_templates(),
        document: session.subscribe_document(),
    };
    let task = tokio::spawn(run(session, events, command_rx));
    (handle, task)
}

/// Connect to the configured server and open `doc_id`.
pub fn open_document(config: &ClientConfig, doc_id: Uuid) -> SessionHandle {
    let (transport, events) =
        WsTransport::connect(config.server_url.clone(), config.reconnect_delay);
    let session = SyncSession::new(doc_id, transport, config.clone());
    spawn_session(session, events).0
}

async fn run<T: Transport>(
    mut session: SyncSession<T>,
    mut events: mpsc::Receiver<TransportEvent>,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut transport_alive = true;
    loop {
        let deadline = session.save_deadline();
        tokio::select! {
            event = events.recv(), if transport_alive => match event {
                Some(event) => session.handle_event(event),
                None => {
                    transport_alive = false;
                    session.handle_transport_ended();
                }
            },
            command = commands.recv() => match command {
                Some(Command::Close) | None => session.close(),
                Some(command) => execute(&mut session, command),
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Err(e) = session.poll_save() {
                    log::warn!("Document {}: save not sent: {e}", session.doc_id());
                }
            }
        }
        if session.state() == SessionState::Closed {
            break;
        }
    }
}

fn execute<T: Transport>(session: &mut SyncSession<T>, command: Command) {
    match command {
        Command::Edit {
            change,
            source,
            reply,
        } => {
            let _ = reply.send(session.apply_local_change(&change, source));
        }
        Command::SetCursor(index) => session.set_cursor(index),
        Command::SaveAsTemplate { name, reply } => {
            let _ = reply.send(session.save_as_template(name));
        }
        Command::ListTemplates { reply } => {
            let _ = reply.send(session.list_templates());
        }
        Command::InsertTemplate { id, reply } => {
            let _ = reply.send(session.insert_template(id));
        }
        Command::Close => session.close(),
    }
}

/// Connect, send `msg` and wait for the first reply `accept` matches.
///
/// The request is re-sent after every reconnect until answered or
/// [`REQUEST_TIMEOUT`] passes.
pub async fn request(
    config: &ClientConfig,
    msg: SyncMessage,
    accept: impl Fn(&SyncMessage) -> bool,
) -> Result<SyncMessage, SessionError> {
    let (mut transport, mut events) =
        WsTransport::connect(config.server_url.clone(), config.reconnect_delay);
    let result = tokio::time::timeout(
        REQUEST_TIMEOUT,
        exchange(&mut transport, &mut events, &msg, &accept),
    )
    .await
    .unwrap_or(Err(SessionError::Timeout));
    transport.close();
    result
}

async fn exchange(
    transport: &mut WsTransport,
    events: &mut mpsc::Receiver<TransportEvent>,
    msg: &SyncMessage,
    accept: &impl Fn(&SyncMessage) -> bool,
) -> Result<SyncMessage, SessionError> {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Opened => transport.send(msg.clone())?,
            TransportEvent::Message(reply) if accept(&reply) => return Ok(reply),
            _ => {}
        }
    }
    Err(SessionError::TransportUnavailable)
}

/// Fetch the template catalog without opening a document.
pub async fn fetch_templates(config: &ClientConfig) -> Result<Vec<Template>, SessionError> {
    const REQUEST_ID: u64 = 1;
    let reply = request(config, SyncMessage::get_templates(REQUEST_ID), |m| {
        m.msg_type == MessageType::Ack && m.request_id == REQUEST_ID
    })
    .await?;
    let mut templates = reply.templates()?;
    sort_newest_first(&mut templates);
    Ok(templates)
}
