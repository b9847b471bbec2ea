//! Provider router — selects the provider for a resolved model family.
//!
//! The mapping from [`ModelFamily`] to request builder and response parser is
//! total: every family has exactly one provider shape.

use std::sync::Arc;
use gridparley_config::AppConfig;
use gridparley_core::model::{ModelFamily, ModelSpec};
use gridparley_core::provider::Provider;
use crate::anthropic::AnthropicProvider;
use crate::openai_compat::{Endpoint, OpenAiCompatProvider};

/// Build the provider for `spec` from configuration.
pub fn build_for_model(config: &AppConfig, spec: &ModelSpec) -> Arc<dyn Provider> {
    let key = provider_key(spec.family);
    let api_key = config.api_key_for(key).unwrap_or_default();
    let api_url = config.providers.get(key).and_then(|p| p.api_url.clone());

    match spec.family {
        ModelFamily::Chat => Arc::new(OpenAiCompatProvider::new(
            "openai-chat",
            api_url.unwrap_or_else(|| default_base_url(spec.family)),
            api_key,
            Endpoint::Chat,
        )),
        ModelFamily::Completion => Arc::new(OpenAiCompatProvider::new(
            "openai-completions",
            api_url.unwrap_or_else(|| default_base_url(spec.family)),
            api_key,
            Endpoint::Completions,
        )),
        ModelFamily::Anthropic => {
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(url) = api_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
    }
}

/// The `[providers.<key>]` section consulted for a family.
pub fn provider_key(family: ModelFamily) -> &'static str {
    match family {
        ModelFamily::Chat | ModelFamily::Completion => "openai",
        ModelFamily::Anthropic => "anthropic",
    }
}

/// Default base URL for a family.
fn default_base_url(family: ModelFamily) -> String {
    match family {
        ModelFamily::Chat | ModelFamily::Completion => "https://api.openai.com/v1".into(),
        ModelFamily::Anthropic => "https://api.anthropic.com".into(),
    }
}
