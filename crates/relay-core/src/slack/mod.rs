pub mod client;
pub mod events;

pub use client::{ChatPlatform, SlackClient};
pub use events::{parse_mention, strip_bot_mention, MentionEvent, SlackEnvelope, SlackFile};
