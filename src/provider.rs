//! Provider implementations for remote chat backends.
//!
//! Each sub-module is gated behind a Cargo feature flag (e.g. `provider-openai`).
//! Only providers whose features are enabled will be compiled.
//!
//! | Module | Feature | API |
//! |--------|---------|-----|
//! | `openai` | `provider-openai` | OpenAI (and OpenAI-compatible backends) |
//! | `anthropic` | `provider-anthropic` | Anthropic |
//! | `gemini` | `provider-gemini` | Google Gemini |

#[cfg(any(
    feature = "provider-openai",
    feature = "provider-anthropic",
    feature = "provider-gemini",
))]
pub(crate) mod remote_common;

#[cfg(any(
    feature = "provider-openai",
    feature = "provider-anthropic",
    feature = "provider-gemini",
))]
pub(crate) mod sse;

#[cfg(feature = "provider-openai")]
pub(crate) mod reasoning;

#[cfg(feature = "provider-openai")]
pub mod openai;

#[cfg(feature = "provider-anthropic")]
pub mod anthropic;

#[cfg(feature = "provider-gemini")]
pub mod gemini;

// Re-exports (same order as module declarations above).
#[cfg(feature = "provider-openai")]
pub use openai::OpenAiProvider;

#[cfg(feature = "provider-anthropic")]
pub use anthropic::AnthropicProvider;

#[cfg(feature = "provider-gemini")]
pub use gemini::GeminiProvider;
