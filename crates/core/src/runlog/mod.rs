//! Append-only log of scrape runs.
//!
//! Components hold a cheap `RunLogHandle`; a background `RunLogWriter`
//! drains the channel into the store. Records carry the actor that caused
//! the run; a run with no resolvable actor is skipped, never written with
//! an empty one.

mod handle;
mod sqlite;
mod store;
mod types;
mod writer;

pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use types::*;
pub use writer::*;
