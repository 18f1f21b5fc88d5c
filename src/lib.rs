//! Provider-agnostic client for hosted AI models.
//!
//! Uni-Parla wraps hosted model APIs behind a single facade with uniform
//! operations for chat completion, streaming, structured-object generation,
//! text classification, and multimodal (image/file) prompting — across
//! OpenAI, Anthropic, and Gemini backends.
//!
//! # Key concepts
//!
//! - **[`ModelClient`](client::ModelClient)** — the facade: one bound model
//!   and the uniform operations against it. The client never retries: one
//!   failed provider call is one failed client call.
//! - **[`ModelSpec`](api::ModelSpec)** — a declarative specification mapping
//!   a provider id + model id (plus credentials and per-provider options) to
//!   a concrete model.
//! - **Providers** — pluggable backends that implement
//!   [`ChatProvider`](traits::ChatProvider). Built-ins are feature-gated and
//!   collected in a [`ProviderRegistry`](registry::ProviderRegistry); custom
//!   backends register alongside them.
//! - **Streams** — [`ChatStream`](stream::ChatStream) and
//!   [`ObjectStream`](stream::ObjectStream) deliver output pull-based, with
//!   reasoning and token-usage side channels.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use uni_parla::client::ModelClient;
//! use uni_parla::message::Message;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ModelClient::new("openai", "gpt-4o");
//!
//! let reply = client
//!     .chat(vec![
//!         Message::system("You are terse."),
//!         Message::user("Why is the sky blue?"),
//!     ])
//!     .await?;
//! println!("{}", reply.text);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod message;
mod options_validation;
mod partial_json;
pub mod provider;
pub mod registry;
pub mod stream;
pub mod traits;

#[cfg(test)]
mod mock;
