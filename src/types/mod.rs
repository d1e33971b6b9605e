//! Public types for the Aisle API.

mod category;
mod entry;
mod language;

pub use category::Category;
pub use entry::{ProductEntry, ScopeId, Snapshot};
pub use language::Language;
