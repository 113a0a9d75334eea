//! OctoIDP server: configuration loading, startup seeding and the HTTP
//! server around the `octoidp-auth` routes.

pub mod bootstrap;
pub mod config;
pub mod observability;
pub mod server;

pub use bootstrap::BootstrapStats;
pub use config::{AppConfig, ClientConfig, LoggingConfig, ServerConfig, UserConfig};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{IdpServer, ServerBuilder, build_app};
