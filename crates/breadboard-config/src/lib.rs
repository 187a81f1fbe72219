//! Facet types for `.config/breadboard.styx`.
//!
//! ```styx
//! database {
//!     url "postgres://localhost/app"
//!     dialect postgres
//!     timeout_secs 30
//! }
//! metadata {
//!     store postgres
//! }
//! ```

use facet::Facet;

/// Configuration loaded from `breadboard.styx`.
#[derive(Debug, Clone, Default, Facet)]
pub struct Config {
    /// Database connection.
    #[facet(default)]
    pub database: DatabaseConfig,

    /// Where BREAD records are kept.
    #[facet(default)]
    pub metadata: MetadataConfig,
}

/// Database connection.
#[derive(Debug, Clone, Default, Facet)]
pub struct DatabaseConfig {
    /// Connection URL. `DATABASE_URL` wins over this.
    pub url: Option<String>,

    /// `postgres`, `mysql` or `sqlite`. Defaults to `postgres`.
    pub dialect: Option<String>,

    /// Upper bound for every database call, in seconds.
    pub timeout_secs: Option<u64>,
}

/// BREAD metadata storage.
#[derive(Debug, Clone, Default, Facet)]
pub struct MetadataConfig {
    /// `postgres` (tables next to the schema) or `memory` (lost on exit).
    pub store: Option<String>,
}
