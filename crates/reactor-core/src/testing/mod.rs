//! Testing utilities for reactor.
//!
//! In-memory doubles for the database-facing contracts, so that engine
//! behavior can be verified without PostgreSQL:
//! - [`MockConnection`] records committed statements and injects failures
//! - [`MemoryMigrationJournal`] and [`MemorySeedJournal`] count writes and can
//!   be told to fail them
//!
//! # Example
//!
//! ```ignore
//! let conn = Arc::new(MockConnection::new());
//! conn.fail_on("0003_");
//!
//! let journal = Arc::new(MemoryMigrationJournal::new());
//! // ... run the engine ...
//! assert_eq!(journal.len(), 2);
//! assert_eq!(conn.rollbacks(), 1);
//! ```

pub mod memory_journal;
pub mod mock_connection;

pub use memory_journal::{MemoryMigrationJournal, MemorySeedJournal};
pub use mock_connection::MockConnection;
