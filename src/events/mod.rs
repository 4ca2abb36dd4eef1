//! Typed channels between the chat session and the host UI
//!
//! ```text
//!   chat panel / chart              ChatSession
//!   ──────────────────              ───────────
//!   ChatRequest::SelectAgent  ──handle_request──►  select_agent
//!   ChatRequest::Retry        ──handle_request──►  retry_current_agent
//!   ChatRequest::SendMessage  ──handle_request──►  send_message
//!
//!                    ◄──EventBus────  AgentSelected / MessageSent /
//!                                     StreamStarted / StreamFinished /
//!                                     StreamFailed / NavigateToTask / ...
//! ```
//!
//! See [`ChatRequest`] and [`ChatEvent`] for the complete lists.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use types::{ChatEvent, ChatRequest};
