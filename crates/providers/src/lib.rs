//! Completion service clients for GridParley.
//!
//! All providers implement the `gridparley_core::Provider` trait. The router
//! maps a resolved [`ModelFamily`](gridparley_core::ModelFamily) to the
//! provider that knows its request and response shapes.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::{Endpoint, OpenAiCompatProvider};
pub use router::build_for_model;

/// Map a reqwest transport failure onto the provider error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> gridparley_core::ProviderError {
    if err.is_timeout() {
        gridparley_core::ProviderError::Timeout(err.to_string())
    } else {
        gridparley_core::ProviderError::Network(err.to_string())
    }
}
