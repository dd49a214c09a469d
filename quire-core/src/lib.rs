//! # quire-core: Rich-text delta model for Quire
//!
//! Pure data structures and algorithms, no I/O. Everything the
//! collaboration layer sends over the wire or renders is a [`Delta`].
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────┐
//!                │          Delta           │
//!                │  Insert / Retain / Delete│
//!                └────────────┬─────────────┘
//!          compose · diff · slice · concat
//!                             │
//!        ┌────────────────────┼────────────────────┐
//!        ▼                    ▼                    ▼
//! ┌─────────────┐     ┌───────────────┐     ┌─────────────┐
//! │  colorize   │     │   template    │     │    html     │
//! │ (version    │     │ (merge_at     │     │ (rendered   │
//! │  diff view) │     │  cursor)      │     │  text)      │
//! └─────────────┘     └───────────────┘     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`delta`]: `Delta`, `Op`, and the algebra over them
//! - [`attributes`]: formatting maps and their compose/diff rules
//! - [`colorize`]: insert/delete-highlighted rendering of a version diff
//! - [`template`]: splicing a stored fragment at a cursor
//! - [`model`]: history snapshots and templates
//! - [`html`]: HTML rendering of documents

pub mod attributes;
pub mod colorize;
pub mod delta;
pub mod error;
pub mod html;
pub mod model;
pub mod template;

pub use attributes::Attributes;
pub use colorize::{colorize, DiffPalette};
pub use delta::{Delta, Insert, Op, OpKind};
pub use error::DeltaError;
pub use html::to_html;
pub use model::{sort_newest_first, HistorySnapshot, Template, Timestamped};
pub use template::merge_at;

#[doc(hidden)]
pub use serde_json::Value as __Value;
