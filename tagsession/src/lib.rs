//! Single-tag read and write sessions for proximity tag readers.
//!
//! A session detects exactly one tag, checks whether it can be read or
//! written, and then reads the stored [`TagModel`], appends a record to it,
//! or replaces it. Every session reports at most one outcome.
//!
//! The protocol logic lives in [`sansio`] and does not depend on any reader
//! or runtime. With the `tokio` feature (enabled by default), [`TagUtility`]
//! drives sessions against an implementation of [`reader::TagReader`]:
//!
//! ```no_run
//! # use tagsession::reader::TagReader;
//! # async fn run<R: TagReader>(reader: R) -> tagsession::Result<()> {
//! use tagsession::{SessionConfig, TagUtility};
//!
//! let utility = TagUtility::with_config(reader, SessionConfig::default());
//! match utility.read().await? {
//!     Some(model) => println!("{} ({}): {:?}", model.name(), model.tag_type, model.records),
//!     None => println!("session canceled"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Tags hold a single payload record with the JSON encoding of the model,
//! see [`sansio::codec`].

pub mod config;
pub mod error;
pub mod model;
pub mod sansio;

#[cfg(feature = "tokio")]
pub mod reader;
#[cfg(feature = "tokio")]
pub mod utility;

pub use crate::config::{ConfigError, SessionConfig};
pub use crate::error::{Error, InvalidationCause, ReaderError, Result, TransportError};
pub use crate::model::{Action, TagModel, WriteAction};
pub use crate::sansio::{MultiTagPolicy, TagStatus};

#[cfg(feature = "tokio")]
pub use crate::utility::TagUtility;

#[cfg(all(test, feature = "tokio"))]
mod test;
