//! Model backends for assay.
//!
//! Every backend here speaks the OpenAI chat-completions protocol and
//! implements `assay_core::Provider`; [`router`] turns the `[providers]`
//! config table into named instances.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
