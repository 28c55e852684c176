//! Write Path
//!
//! - [`Writer`]: the contract a data source implements to prepare changes
//! - [`PendingChange`]: single-use transaction around one prepared change
//! - [`Writers`]: the orchestrator every create, update and delete goes
//!   through, including the translation of `cards` writes

mod card_diff;
mod orchestrator;
mod pending_change;
mod writer;

pub use card_diff::CardDiff;
pub use orchestrator::{writer_for_type, WriteOutcome, Writers};
pub use pending_change::{ChangeState, PendingChange};
pub use writer::{
    Aborter, BinaryStream, FinalizeContext, FinalizeMeta, Finalizer, PendingChangeOptions,
    PreparedChange, Writer,
};
