//! Read-only view over a document's saved versions.
//!
//! Snapshots are kept newest first. Selecting index `i` colorizes the
//! change from snapshot `i + 1` (older) to snapshot `i` (newer); the
//! oldest snapshot is compared against an empty document.

use uuid::Uuid;

use quire_core::{colorize, sort_newest_first, to_html, Delta, DeltaError, DiffPalette, HistorySnapshot};

use crate::config::ClientConfig;
use crate::driver;
use crate::error::SessionError;
use crate::protocol::{MessageType, SyncMessage};

pub struct HistorySession {
    doc_id: Uuid,
    palette: DiffPalette,
    snapshots: Vec<HistorySnapshot>,
    selected: usize,
    rendered: Delta,
}

impl HistorySession {
    pub fn new(doc_id: Uuid, palette: DiffPalette) -> Self {
        Self {
            doc_id,
            palette,
            snapshots: Vec::new(),
            selected: 0,
            rendered: Delta::new(),
        }
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    /// The get-history request for this document.
    pub fn request(&self) -> SyncMessage {
        SyncMessage::get_history(self.doc_id)
    }

    /// Accept a load-history message for this document.
    ///
    /// Returns `false` for messages that are not meant for this view.
    pub fn handle_message(&mut self, msg: &SyncMessage) -> Result<bool, SessionError> {
        if msg.msg_type != MessageType::LoadHistory || msg.doc_id != self.doc_id {
            return Ok(false);
        }
        self.load_history(msg.history()?)?;
        Ok(true)
    }

    /// Replace the snapshot list. The selection is kept and the view recomputed.
    pub fn load_history(&mut self, mut snapshots: Vec<HistorySnapshot>) -> Result<(), DeltaError> {
        sort_newest_first(&mut snapshots);
        log::debug!("Document {}: {} history entries", self.doc_id, snapshots.len());
        self.snapshots = snapshots;
        self.recompute()
    }

    /// Newest first.
    pub fn snapshots(&self) -> &[HistorySnapshot] {
        &self.snapshots
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize) -> Result<(), DeltaError> {
        self.selected = index;
        self.recompute()
    }

    /// `(newer, older)` for entry `index`. Missing entries are empty documents.
    pub fn select_pair(&self, index: usize) -> (Delta, Delta) {
        let at = |i: usize| {
            self.snapshots
                .get(i)
                .map(|s| s.delta.clone())
                .unwrap_or_default()
        };
        (at(index), at(index.saturating_add(1)))
    }

    /// Colorized diff of the selected entry.
    pub fn rendered(&self) -> &Delta {
        &self.rendered
    }

    pub fn rendered_html(&self) -> String {
        to_html(&self.rendered)
    }

    fn recompute(&mut self) -> Result<(), DeltaError> {
        let (newer, older) = self.select_pair(self.selected);
        self.rendered = colorize(&older, &newer, &self.palette)?;
        Ok(())
    }
}

/// Fetch the history of `doc_id` from the configured server.
pub async fn load(config: &ClientConfig, doc_id: Uuid) -> Result<HistorySession, SessionError> {
    let mut session = HistorySession::new(doc_id, config.palette.clone());
    let reply = driver::request(config, session.request(), |m| {
        m.msg_type == MessageType::LoadHistory && m.doc_id == doc_id
    })
    .await?;
    session.handle_message(&reply)?;
    Ok(session)
}
