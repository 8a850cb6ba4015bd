//! Sliding window over the most recently seen token ids.

use std::collections::VecDeque;

use llama_engine::TokenId;

/// Token id used to fill a fresh window.
pub const FILLER_TOKEN_ID: TokenId = 0;

/// Fixed-capacity window of recent token ids.
///
/// The window always holds exactly `capacity` ids: it starts full of
/// [`FILLER_TOKEN_ID`] and every push evicts the oldest entry. It backs both
/// the repetition penalty and reverse-prompt matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryWindow {
    tokens: VecDeque<TokenId>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            tokens: std::iter::repeat(FILLER_TOKEN_ID).take(capacity).collect(),
            capacity,
        }
    }

    /// Append `id`, evicting the oldest entry. A zero-capacity window ignores it.
    pub fn push(&mut self, id: TokenId) {
        if self.capacity == 0 {
            return;
        }
        self.tokens.pop_front();
        self.tokens.push_back(id);
    }

    /// True iff the last `seq.len()` entries equal `seq`, in order.
    pub fn tail_equals(&self, seq: &[TokenId]) -> bool {
        seq.len() <= self.tokens.len()
            && self
                .tokens
                .iter()
                .rev()
                .zip(seq.iter().rev())
                .all(|(a, b)| a == b)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TokenId> + '_ {
        self.tokens.iter()
    }

    pub fn last(&self) -> Option<TokenId> {
        self.tokens.back().copied()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
