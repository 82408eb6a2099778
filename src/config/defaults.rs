//! Default values for configuration

use crate::schema::PRIMARY_KEY_INDEX;

/// Default database name
pub fn default_db_name() -> String {
    std::env::var("DOCBOOT_DB_NAME").unwrap_or_else(|_| "beer_garden".to_string())
}

/// Default database host
pub fn default_db_host() -> String {
    std::env::var("DOCBOOT_DB_HOST").unwrap_or_else(|_| "localhost".to_string())
}

/// Default database port (standard MongoDB port)
pub fn default_db_port() -> u16 {
    std::env::var("DOCBOOT_DB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(27017)
}

/// Server-selection and socket timeout for the liveness connection (milliseconds)
pub fn default_liveness_timeout_ms() -> u64 {
    1000
}

/// Index names the reconciler never treats as stale
pub fn default_ignored_indexes() -> Vec<String> {
    vec![PRIMARY_KEY_INDEX.to_string()]
}
