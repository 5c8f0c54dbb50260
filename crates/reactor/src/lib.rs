//! Reactor - migration and seed execution engine
//!
//! Versioned, journaled schema migrations and data seeds for PostgreSQL.

mod runtime;

pub use reactor_core;
pub use reactor_runtime;

pub use runtime::prelude;
pub use runtime::{Reactor, ReactorBuilder};
