pub mod daemon;
pub mod http;
pub mod signature;

pub use daemon::run_gateway;
pub use http::{router, AppState};
pub use signature::verify_slack_signature;
