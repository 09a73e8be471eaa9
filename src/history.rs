use serde::{Deserialize, Serialize};
use tracing::warn;

/// Threads shorter than this are never reduced.
const MIN_TURNS_BEFORE_REDUCE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBudget {
    pub upper_limit: usize,
    pub chars_per_token: usize,
    pub reduce_factor: f64,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            upper_limit: 4096,
            chars_per_token: 4,
            reduce_factor: 0.5,
        }
    }
}

/// One ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thread {
    turns: Vec<Turn>,
}

impl Thread {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Thread turns followed by `next`, without recording `next`.
    pub fn with_pending(&self, next: Turn) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.extend_from_slice(&self.turns);
        messages.push(next);
        messages
    }

    /// Non-space characters divided by the budget's chars-per-token ratio.
    pub fn approx_tokens(&self, budget: &TokenBudget) -> f64 {
        let chars: usize = self
            .turns
            .iter()
            .map(|t| t.content.chars().filter(|c| *c != ' ').count())
            .sum();
        chars as f64 / budget.chars_per_token.max(1) as f64
    }

    /// Once the thread exceeds the upper limit, drops the two turns right
    /// after the leading one until it fits `upper_limit * reduce_factor`.
    /// Returns the number of windows dropped.
    pub fn reduce(&mut self, budget: &TokenBudget) -> usize {
        let limit = budget.upper_limit as f64;
        if self.turns.len() <= MIN_TURNS_BEFORE_REDUCE || self.approx_tokens(budget) <= limit {
            return 0;
        }

        let target = limit * budget.reduce_factor;
        let mut dropped = 0;
        while self.turns.len() > 1 && self.approx_tokens(budget) > target {
            let end = self.turns.len().min(3);
            self.turns.drain(1..end);
            dropped += 1;
        }

        warn!(
            dropped,
            remaining = self.turns.len(),
            "history over token budget, forgot the earliest turns"
        );
        dropped
    }
}

/// The three threads one conversation owns.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub answer: Thread,
    pub rewrite: Thread,
    pub related: Thread,
}

impl Conversation {
    pub fn reset(&mut self) {
        self.answer.clear();
        self.rewrite.clear();
        self.related.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(upper_limit: usize) -> TokenBudget {
        TokenBudget {
            upper_limit,
            chars_per_token: 1,
            reduce_factor: 0.5,
        }
    }

    fn thread_of(contents: &[&str]) -> Thread {
        let mut thread = Thread::default();
        thread.append(Turn::system(contents[0]));
        for (i, c) in contents[1..].iter().enumerate() {
            if i % 2 == 0 {
                thread.append(Turn::user(*c));
            } else {
                thread.append(Turn::assistant(*c));
            }
        }
        thread
    }

    fn contents(thread: &Thread) -> Vec<&str> {
        thread.turns().iter().map(|t| t.content.as_str()).collect()
    }

    #[test]
    fn approx_tokens_ignores_spaces() {
        let thread = thread_of(&["a b c", "dddd"]);
        let b = TokenBudget {
            upper_limit: 100,
            chars_per_token: 4,
            reduce_factor: 0.5,
        };
        assert_eq!(thread.approx_tokens(&b), 7.0 / 4.0);
    }

    #[test]
    fn approx_tokens_counts_chars_not_bytes() {
        let thread = thread_of(&["你好"]);
        assert_eq!(thread.approx_tokens(&budget(10)), 2.0);
    }

    #[test]
    fn short_threads_are_never_reduced() {
        let mut thread = thread_of(&["s", "aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc", "dddddddddd"]);
        let before = thread.clone();
        assert_eq!(thread.reduce(&budget(1)), 0);
        assert_eq!(thread, before);
    }

    #[test]
    fn under_upper_limit_is_untouched() {
        let mut thread = thread_of(&["s", "1", "2", "3", "4", "5", "6"]);
        let before = thread.clone();
        assert_eq!(thread.reduce(&budget(7)), 0);
        assert_eq!(thread, before);
    }

    #[test]
    fn drops_windows_after_the_system_turn() {
        // 7 turns of 10 chars = 70 tokens; limit 60, target 30.
        let mut thread = thread_of(&[
            "ssssssssss",
            "u1u1u1u1u1",
            "a1a1a1a1a1",
            "u2u2u2u2u2",
            "a2a2a2a2a2",
            "u3u3u3u3u3",
            "a3a3a3a3a3",
        ]);
        let dropped = thread.reduce(&budget(60));
        assert_eq!(dropped, 2);
        assert_eq!(contents(&thread), ["ssssssssss", "u3u3u3u3u3", "a3a3a3a3a3"]);
        assert_eq!(thread.turns()[0].role, Role::System);
    }

    #[test]
    fn reduction_stops_at_the_leading_turn() {
        let huge = "x".repeat(500);
        let mut thread = thread_of(&[&huge, "1", "2", "3", "4", "5"]);
        thread.reduce(&budget(100));
        assert_eq!(thread.len(), 1);
        assert_eq!(thread.turns()[0].content, huge);
    }

    #[test]
    fn odd_tail_drops_single_turn() {
        // After two windows one turn remains after the system turn.
        let mut thread = thread_of(&["s", "aaaa", "bbbb", "cccc", "dddd", "eeee"]);
        assert_eq!(thread.reduce(&budget(4)), 3);
        assert_eq!(contents(&thread), ["s"]);
    }

    #[test]
    fn stops_as_soon_as_target_holds() {
        let mut thread = thread_of(&["s", "aaaa", "bbbb", "cccc", "dddd", "eeee"]);
        assert_eq!(thread.reduce(&budget(10)), 2);
        assert_eq!(contents(&thread), ["s", "eeee"]);
    }

    #[test]
    fn reduce_is_idempotent() {
        let cases: Vec<Vec<String>> = vec![
            (0..12).map(|i| "w".repeat(i * 3 + 1)).collect(),
            (0..6).map(|_| "z".repeat(40)).collect(),
            vec!["x".repeat(400), "y".into(), "y".into(), "y".into(), "y".into(), "y".into()],
            (0..3).map(|_| "q".repeat(100)).collect(),
        ];
        for case in cases {
            let refs: Vec<&str> = case.iter().map(String::as_str).collect();
            let b = budget(50);
            let mut once = thread_of(&refs);
            once.reduce(&b);
            let mut twice = once.clone();
            twice.reduce(&b);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn with_pending_does_not_record() {
        let thread = thread_of(&["s"]);
        let messages = thread.with_pending(Turn::user("q"));
        assert_eq!(messages.len(), 2);
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn conversation_reset_clears_all_threads() {
        let mut conv = Conversation::default();
        conv.answer.append(Turn::system("a"));
        conv.rewrite.append(Turn::system("b"));
        conv.related.append(Turn::system("c"));
        conv.reset();
        assert!(conv.answer.is_empty() && conv.rewrite.is_empty() && conv.related.is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
