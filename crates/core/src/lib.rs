//! # assay core
//!
//! Domain types, traits, and error definitions for the assay agent runtime.
//! Every other crate depends inward on this one.
//!
//! ## Contents
//!
//! - [`message`]: the transcript value objects (`Message`, `Role`, `SessionId`)
//! - [`action`]: the forgiving tag parser that turns a model reply into
//!   action blocks, plus the execution lanes
//! - [`provider`]: the `Provider` trait every model backend implements
//! - [`catalog`]: the read-mostly resource catalog used to build prompts
//! - [`chunk`]: raw transcript chunks flowing from the controller to the
//!   stream orchestrator

pub mod action;
pub mod catalog;
pub mod chunk;
pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use action::{ActionBlock, Language, NextAction, ParsedReply, parse_reply};
pub use catalog::{ParameterSpec, ResourceCatalog, ResourceEntry, ToolSpec};
pub use chunk::Chunk;
pub use error::{Disposition, Error, ExecutorError, FailureClass, ProviderError, Result};
pub use message::{Message, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
