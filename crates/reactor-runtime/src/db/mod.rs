mod connection;
mod pool;
mod provisioner;

pub use connection::PgConnectionManager;
pub use pool::{table_exists, Database};
pub use provisioner::PgProvisioner;
