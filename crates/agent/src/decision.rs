//! Turning a raw completion payload into a decision.
//!
//! Models are asked for `{"plan": "...", "action": ...}`. Replies often wrap
//! that object in a code fence or prose, and older completion models answer
//! with `Plan:` / `Action:` lines instead, so both shapes are accepted.

use gridparley_core::environment::Action;
use gridparley_core::task::RoleVariant;
use serde_json::Value;

/// What could be read out of a payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub plan: String,
    pub action: Option<Value>,
}

/// Why a decision was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyReply,
    MissingAction,
    NotInVocabulary { action: String, allowed: Vec<String> },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::EmptyReply => f.write_str("the reply was empty"),
            Rejection::MissingAction => f.write_str("the reply did not contain an action"),
            Rejection::NotInVocabulary { action, allowed } => write!(
                f,
                "'{action}' is not a valid action; choose one of {}",
                allowed.join(", ")
            ),
        }
    }
}

/// Parse a payload. Never fails; missing parts come back empty.
pub fn parse(payload: &str) -> Decision {
    let body = strip_fence(payload.trim());

    if let Some(decision) = parse_json_object(body) {
        return decision;
    }

    parse_labelled_lines(body)
}

/// Check a decision against what the role may do.
///
/// Physical roles must name one of `physical_actions`; negotiation roles may
/// send any non-null JSON (a message or a structured proposal).
pub fn validate(
    payload: &str,
    decision: &Decision,
    role: RoleVariant,
    physical_actions: &[String],
) -> Result<Action, Rejection> {
    if payload.trim().is_empty() {
        return Err(Rejection::EmptyReply);
    }

    let action = match &decision.action {
        None | Some(Value::Null) => return Err(Rejection::MissingAction),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(Rejection::MissingAction),
        Some(action) => action,
    };

    if !role.is_physical() {
        return Ok(Action(action.clone()));
    }

    let name = match action {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if physical_actions.iter().any(|a| *a == name) {
        Ok(Action::named(name))
    } else {
        Err(Rejection::NotInVocabulary {
            action: name,
            allowed: physical_actions.to_vec(),
        })
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.rsplit_once("```").map_or(rest, |(body, _)| body).trim()
}

fn parse_json_object(text: &str) -> Option<Decision> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let object = value.as_object()?;
    if !object.contains_key("plan") && !object.contains_key("action") {
        return None;
    }

    let plan = match object.get("plan") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Some(Decision {
        plan,
        action: object.get("action").cloned(),
    })
}

fn parse_labelled_lines(text: &str) -> Decision {
    let mut decision = Decision::default();
    for line in text.lines() {
        let line = line.trim();
        if let Some(plan) = strip_label(line, "plan") {
            decision.plan = plan.to_string();
        } else if let Some(action) = strip_label(line, "action") {
            let action = action.trim_matches(|c| c == '"' || c == '\'' || c == '`');
            if !action.is_empty() {
                decision.action = Some(
                    serde_json::from_str::<Value>(action)
                        .ok()
                        .filter(|v| v.is_object() || v.is_array())
                        .unwrap_or_else(|| Value::String(action.to_string())),
                );
            }
        }
    }
    decision
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let (head, rest) = line.split_once(':')?;
    head.trim().eq_ignore_ascii_case(label).then(|| rest.trim())
}
