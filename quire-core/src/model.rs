//! Persisted values served by the collaboration server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delta::Delta;

/// A document state saved at a point in time. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    #[serde(alias = "_id")]
    pub id: Uuid,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(rename = "data")]
    pub delta: Delta,
}

/// A named, reusable fragment insertable into any document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(alias = "_id")]
    pub id: Uuid,
    pub name: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    #[serde(rename = "data")]
    pub delta: Delta,
}

pub trait Timestamped {
    fn timestamp(&self) -> u64;
}

impl Timestamped for HistorySnapshot {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl Timestamped for Template {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Most recent first. Stable for equal timestamps.
pub fn sort_newest_first<T: Timestamped>(items: &mut [T]) {
    items.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
}
