//! CLI commands implementation

pub mod bootstrap;
pub mod indexes;
pub mod init;
pub mod ping;
pub mod roles;

pub use bootstrap::*;
pub use indexes::*;
pub use init::*;
pub use ping::*;
pub use roles::*;

use crate::config::Config;
use crate::connection::{Connection, ConnectionEstablisher};
use crate::error::{Error, Result};
use crate::store::Connector;

/// Open the primary connection, failing when the database cannot be reached
pub async fn require_connection<C: Connector>(
    connector: &C,
    config: &Config,
) -> Result<Connection<C::Store>> {
    ConnectionEstablisher::new(connector)
        .with_liveness_timeout(config.liveness.timeout())
        .establish(&config.db)
        .await
        .ok_or_else(|| {
            Error::Unreachable(format!(
                "{}:{}",
                config.db.connection.host, config.db.connection.port
            ))
        })
}
