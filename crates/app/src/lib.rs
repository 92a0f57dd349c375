//! Raffle manager application: HTTP server, pages, and shared wiring for
//! the `rifas` binary.

pub mod server;
pub mod views;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("RIFAS_GIT_HASH");

pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH})")
}
