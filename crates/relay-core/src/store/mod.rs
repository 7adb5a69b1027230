pub mod conversation_store;
pub mod history;

pub use conversation_store::{ContextSnapshot, ConversationStore, ThreadContext};
pub use history::BoundedHistory;
