//! Dialogue history — one agent's ordered log of conversation turns.
//!
//! Each decision cycle appends one group of [`TURN_GROUP_SIZE`] turns
//! (observation prompt, raw reply, decision feedback, plan recap). The
//! window sent with a query is the last K turns. When the assembled request
//! would exceed the model's context limit, whole groups are evicted from the
//! oldest end of the window; a partial group is never removed.

use gridparley_core::message::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Turns produced by one decision cycle.
pub const TURN_GROUP_SIZE: usize = 4;

/// How the active window is selected from the full history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetrievalPolicy {
    /// The last `k` turns; `k == 0` means no history at all.
    RecentK { k: usize },
}

impl RetrievalPolicy {
    pub fn k(&self) -> usize {
        match self {
            RetrievalPolicy::RecentK { k } => *k,
        }
    }
}

/// What an eviction pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub turns_evicted: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

impl EvictionReport {
    pub fn evicted(&self) -> bool {
        self.turns_evicted > 0
    }
}

#[derive(Debug, Clone)]
pub struct DialogueHistory {
    turns: Vec<Message>,
    policy: RetrievalPolicy,
}

impl DialogueHistory {
    pub fn new(policy: RetrievalPolicy) -> Self {
        Self {
            turns: Vec::new(),
            policy,
        }
    }

    pub fn recent_k(k: usize) -> Self {
        Self::new(RetrievalPolicy::RecentK { k })
    }

    pub fn policy(&self) -> RetrievalPolicy {
        self.policy
    }

    pub fn append_turn(&mut self, message: Message) {
        self.turns.push(message);
    }

    /// The last `min(k, len)` turns. Never mutates the history.
    pub fn windowed_view(&self, k: usize) -> &[Message] {
        let start = self.turns.len().saturating_sub(k);
        &self.turns[start..]
    }

    /// The window under the configured retrieval policy.
    pub fn window(&self) -> &[Message] {
        self.windowed_view(self.policy.k())
    }

    /// Evict whole turn groups from the oldest end of the window while
    /// `head + window + pending` is estimated at or above `limit` tokens.
    ///
    /// The window is re-read after every removal, so the estimate always
    /// covers the turns the next query will carry. Stops once under budget or
    /// when the window holds no whole [`TURN_GROUP_SIZE`] group.
    pub fn evict_if_over_budget<F>(
        &mut self,
        estimate: F,
        head: &[Message],
        pending: &Message,
        limit: usize,
    ) -> EvictionReport
    where
        F: Fn(&Message) -> usize,
    {
        let fixed: usize = head.iter().map(&estimate).sum::<usize>() + estimate(pending);
        let window_tokens = |turns: &[Message]| -> usize { turns.iter().map(&estimate).sum() };
        let tokens_before = fixed + window_tokens(self.window());

        let mut tokens_after = tokens_before;
        let mut turns_evicted = 0;
        while tokens_after >= limit {
            // Groups are counted back from the newest turn; a window starting
            // mid-group only offers the whole groups after that point.
            let whole = self.window().len() / TURN_GROUP_SIZE * TURN_GROUP_SIZE;
            if whole == 0 {
                break;
            }
            let group_start = self.turns.len() - whole;
            self.turns.drain(group_start..group_start + TURN_GROUP_SIZE);
            turns_evicted += TURN_GROUP_SIZE;
            tokens_after = fixed + window_tokens(self.window());
        }

        if fixed >= limit {
            debug!(
                tokens = fixed,
                limit,
                "Instruction head and pending message alone exceed the context limit"
            );
        }

        let report = EvictionReport {
            turns_evicted,
            tokens_before,
            tokens_after,
        };
        if report.evicted() {
            debug!(
                turns_evicted,
                tokens_before = report.tokens_before,
                tokens_after = report.tokens_after,
                limit,
                "Evicted dialogue turns over budget"
            );
        }
        report
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::estimate_message_tokens;

    fn history_with_groups(k: usize, groups: usize) -> DialogueHistory {
        let mut history = DialogueHistory::recent_k(k);
        for g in 0..groups {
            history.append_turn(Message::user(format!("observation {g}")));
            history.append_turn(Message::assistant(format!("reply {g}")));
            history.append_turn(Message::user(format!("feedback {g}")));
            history.append_turn(Message::assistant(format!("recap {g}")));
        }
        history
    }

    #[test]
    fn window_is_last_k_turns() {
        let history = history_with_groups(8, 3);
        let window = history.window();
        assert_eq!(window.len(), 8);
        assert_eq!(window[0].content, "observation 1");
        assert_eq!(window[7].content, "recap 2");
    }

    #[test]
    fn window_never_exceeds_history() {
        let history = history_with_groups(100, 2);
        assert_eq!(history.windowed_view(100).len(), 8);
        assert_eq!(history.windowed_view(3).len(), 3);
    }

    #[test]
    fn zero_k_window_is_empty() {
        let history = history_with_groups(8, 5);
        assert!(history.windowed_view(0).is_empty());
        assert!(DialogueHistory::recent_k(0).window().is_empty());
        assert_eq!(history.len(), 20);
    }

    #[test]
    fn under_budget_evicts_nothing() {
        let mut history = history_with_groups(8, 2);
        let report = history.evict_if_over_budget(
            estimate_message_tokens,
            &[Message::system("You are miner_0.")],
            &Message::user("step"),
            10_000,
        );
        assert!(!report.evicted());
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn eviction_shrinks_the_window_actually_sent() {
        let mut history = history_with_groups(8, 3);
        let head = [Message::system("head")];
        let pending = Message::user("pending");
        // Each turn is a flat 10 tokens; head + pending cost 20.
        let report = history.evict_if_over_budget(|_| 10, &head, &pending, 70);

        // 20 + 80 >= 70; dropping group 1 slides group 0 into the window
        // (still 100), dropping group 0 leaves group 2 alone: 20 + 40 < 70.
        assert_eq!(report.turns_evicted, 8);
        assert_eq!(report.tokens_before, 100);
        assert_eq!(report.tokens_after, 60);
        assert_eq!(history.len(), 4);
        assert_eq!(history.len() % TURN_GROUP_SIZE, 0);

        let window = history.window();
        assert_eq!(window[0].content, "observation 2");
        let sent = 20 + 10 * window.len();
        assert_eq!(sent, report.tokens_after);
        assert!(sent < 70);
    }

    #[test]
    fn composed_request_fits_after_eviction() {
        use crate::query::QueryClient;
        use crate::token::estimate_messages_tokens;

        let mut history = DialogueHistory::recent_k(8);
        for g in 0..6 {
            history.append_turn(Message::user(format!("observation {g} {}", "x".repeat(200))));
            history.append_turn(Message::assistant(format!("reply {g} {}", "y".repeat(200))));
            history.append_turn(Message::user(format!("feedback {g}")));
            history.append_turn(Message::assistant(format!("recap {g}")));
        }
        let head = [Message::system("You are carpenter_0.")];
        let user = "Step 6: you are at (3, 4).";
        let limit = 200;

        let report =
            history.evict_if_over_budget(estimate_message_tokens, &head, &Message::user(user), limit);
        let sent = QueryClient::compose(&head, &history, user, true);

        assert!(report.evicted());
        assert_eq!(estimate_messages_tokens(&sent), report.tokens_after);
        assert!(report.tokens_after < limit);
        assert_eq!(history.len() % TURN_GROUP_SIZE, 0);
    }

    #[test]
    fn eviction_stops_when_window_exhausted() {
        let mut history = history_with_groups(8, 2);
        let report = history.evict_if_over_budget(
            |_| 1_000,
            &[],
            &Message::user("pending"),
            10,
        );
        assert_eq!(report.turns_evicted, 8);
        assert!(history.is_empty());
        assert!(report.tokens_after >= 10);
    }

    #[test]
    fn eviction_never_splits_a_group() {
        // Window of 6 turns: only the newest group lies wholly inside it.
        let mut history = history_with_groups(6, 2);
        let report = history.evict_if_over_budget(|_| 10, &[], &Message::user("p"), 60);
        assert_eq!(report.turns_evicted, 4);
        assert_eq!(report.tokens_before, 70);
        assert_eq!(report.tokens_after, 50);
        assert_eq!(history.len(), 4);
        assert_eq!(history.windowed_view(4)[0].content, "observation 0");
        assert_eq!(history.windowed_view(4)[3].content, "recap 0");
    }

    #[test]
    fn clear_empties_history() {
        let mut history = history_with_groups(8, 1);
        history.clear();
        assert!(history.is_empty());
    }
}
