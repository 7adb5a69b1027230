pub mod allowlist;
pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod files;
pub mod handler;
pub mod news;
pub mod normalize;
pub mod selector;
pub mod slack;
pub mod store;
pub mod tracing_setup;

pub use config::RelayConfig;
pub use error::RelayError;
pub use handler::{MentionHandler, MentionOutcome};
