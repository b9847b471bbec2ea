//! Model catalogue.
//!
//! Model identifiers are resolved once, at configuration time, into a
//! [`ModelSpec`] carrying an explicit [`ModelFamily`] tag and the context
//! window used for history eviction. Unknown identifiers are a
//! configuration error rather than a guess at the response shape.

use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// The wire family a model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Legacy `/completions`: one prompt string in, `choices[0].text` out.
    Completion,
    /// `/chat/completions`: messages in, `choices[0].message.content` out.
    Chat,
    /// Anthropic Messages API: top-level system prompt, text content blocks out.
    Anthropic,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelFamily::Completion => "completion",
            ModelFamily::Chat => "chat",
            ModelFamily::Anthropic => "anthropic",
        };
        f.write_str(name)
    }
}

/// A resolved model: identifier sent on the wire, family, context limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub family: ModelFamily,
    pub context_limit: usize,
}

/// Declared models: (name, wire id, family, context window in tokens).
const CATALOGUE: &[(&str, &str, ModelFamily, usize)] = &[
    ("text-davinci-003", "text-davinci-003", ModelFamily::Completion, 4080),
    ("gpt-3.5-turbo", "gpt-3.5-turbo", ModelFamily::Chat, 4096),
    ("gpt-3.5-turbo-0301", "gpt-3.5-turbo-0301", ModelFamily::Chat, 4096),
    ("gpt-3.5-turbo-16k", "gpt-3.5-turbo-16k", ModelFamily::Chat, 16384),
    ("gpt-4", "gpt-4", ModelFamily::Chat, 8192),
    ("gpt-4-0314", "gpt-4-0314", ModelFamily::Chat, 8192),
    ("gpt-4-32k", "gpt-4-32k", ModelFamily::Chat, 32768),
    ("gpt-4-32k-0314", "gpt-4-32k-0314", ModelFamily::Chat, 32768),
    ("gpt-4o-mini", "gpt-4o-mini", ModelFamily::Chat, 128000),
    ("claude", "claude-2.1", ModelFamily::Anthropic, 200000),
    ("claude-2.1", "claude-2.1", ModelFamily::Anthropic, 200000),
];

impl ModelSpec {
    /// Resolve a configured model name.
    pub fn resolve(name: &str) -> Result<Self> {
        CATALOGUE
            .iter()
            .find(|(alias, ..)| *alias == name)
            .map(|(_, id, family, limit)| Self {
                id: (*id).to_string(),
                family: *family,
                context_limit: *limit,
            })
            .ok_or_else(|| Error::config(format!("Model {name} not supported")))
    }

    /// All declared model names, in catalogue order.
    pub fn known_models() -> impl Iterator<Item = (&'static str, ModelFamily, usize)> {
        CATALOGUE
            .iter()
            .map(|(alias, _, family, limit)| (*alias, *family, *limit))
    }
}
