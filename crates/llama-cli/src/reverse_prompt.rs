//! Reverse prompt detection over the recent-token window.

use llama_engine::TokenId;
use llama_sampling::HistoryWindow;

/// A tokenized reverse prompt. Matching happens in token space, so the
/// text is tokenized once, without BOS, at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReversePrompt {
    tokens: Vec<TokenId>,
}

impl ReversePrompt {
    pub fn new(tokens: Vec<TokenId>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True iff the prompt is nonempty and `history` ends with it.
    pub fn matches(&self, history: &HistoryWindow) -> bool {
        !self.tokens.is_empty() && history.tail_equals(&self.tokens)
    }
}
