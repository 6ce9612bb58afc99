//! Sans-IO implementation of the tag session protocol.
//!
//! This module provides a pure state machine for one tag session that is
//! independent of any reader hardware. This design allows:
//!
//! - Testing protocol logic without a radio
//! - Flexibility in the driver (tokio, a platform event loop, a simulator)
//! - Deterministic handling of late or duplicated reader callbacks
//!
//! # Architecture
//!
//! The session follows the poll-based pattern:
//!
//! - `handle_event()`: Feed a reader event or operation result to the state machine
//! - `poll_command()`: Get the next request to perform on the reader
//! - `poll_outcome()`: Get the single result for the caller
//!
//! # Example
//!
//! ```
//! use tagsession::sansio::{Command, Session, SessionEvent};
//! use tagsession::{Action, SessionConfig};
//!
//! let mut session = Session::new(Action::Read, &SessionConfig::default());
//! session.begin();
//!
//! // In your event loop (pseudo-code):
//! // 1. Perform commands
//! while let Some(command) = session.poll_command() {
//!     match command {
//!         Command::Begin { prompt } => { /* reader.begin(&prompt) */ }
//!         _ => {}
//!     }
//! }
//!
//! // 2. Feed reader events
//! session.handle_event(SessionEvent::Activated);
//!
//! // 3. Deliver the outcome
//! if let Some(outcome) = session.poll_outcome() {
//!     // Hand the outcome to the caller
//!     # let _ = outcome;
//! }
//! ```

pub mod classify;
pub mod codec;
pub mod gate;
pub mod session;
pub mod types;

pub use self::classify::{classify, TagIdentity};
pub use self::codec::{decode, encode, CodecError};
pub use self::gate::CompletionGate;
pub use self::session::{Session, SessionState};
pub use self::types::{
    Command, DetectedTag, MiFareFamily, MultiTagPolicy, Outcome, SessionEvent, TagKind, TagStatus,
};
