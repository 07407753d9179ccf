//! Session manager for a single wellness conversation.
//!
//! [`SessionManager`] owns the conversation log and its state machine
//! (`Idle → AwaitingResponse → Streaming → Idle`, with `Error → Idle` on any
//! failure). Each `submit` returns a [`TurnStream`] that relays reply deltas
//! as they arrive and commits exactly one assistant message, or none.

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod session;
pub mod turn;

pub use config::SessionConfig;
pub use error::SessionError;
pub use events::SessionEvent;
pub use manager::SessionManager;
pub use session::{Session, SessionState};
pub use turn::{TurnEvent, TurnStream};
