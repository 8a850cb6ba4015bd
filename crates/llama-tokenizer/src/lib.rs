//! # llama-tokenizer
//!
//! Deterministic tokenization for llama.rs.
//!
//! This crate provides:
//! - A `Tokenizer` trait for pluggable tokenization backends
//! - [`Vocab`], a greedy longest-match tokenizer over byte-string pieces
//! - A built-in byte-level vocabulary that covers any UTF-8 input
//! - JSON vocabulary files
//!
//! Ids 0, 1 and 2 are reserved for `<unk>`, `<s>` and `</s>`. Their pieces are
//! printable but never matched against input text.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use llama_engine::{TokenId, BOS_TOKEN_ID};
use serde::Deserialize;

/// Number of reserved ids at the start of every vocabulary.
pub const N_SPECIAL_TOKENS: usize = 3;

/// Error type for tokenization operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizerError {
    #[error("Invalid token ID: {0}")]
    InvalidToken(TokenId),

    #[error("no vocabulary entry matches input at byte offset {offset}")]
    Unmatched { offset: usize },

    #[error("vocabulary error: {0}")]
    Vocab(String),
}

pub type TokenizerResult<T> = std::result::Result<T, TokenizerError>;

/// Core tokenizer trait. Implementations can be swapped without changing app code.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids, optionally prefixed with the BOS marker.
    fn tokenize(&self, text: &str, add_bos: bool) -> TokenizerResult<Vec<TokenId>>;

    /// Printable byte string for a single token.
    fn piece(&self, id: TokenId) -> TokenizerResult<&[u8]>;

    /// Get vocabulary size.
    fn vocab_size(&self) -> usize;

    /// Concatenate the pieces of `tokens`.
    fn decode(&self, tokens: &[TokenId]) -> TokenizerResult<Vec<u8>> {
        let mut out = Vec::new();
        for &id in tokens {
            out.extend_from_slice(self.piece(id)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct VocabFile {
    tokens: Vec<String>,
}

/// Bidirectional mapping between token ids and byte-string pieces.
#[derive(Debug, Clone)]
pub struct Vocab {
    id_to_piece: Vec<Vec<u8>>,
    piece_to_id: HashMap<Vec<u8>, TokenId>,
    max_piece_len: usize,
}

impl Vocab {
    /// Build a vocabulary from pieces indexed by id.
    ///
    /// The first [`N_SPECIAL_TOKENS`] entries are the reserved specials.
    /// Empty or duplicate non-special pieces are rejected.
    pub fn from_pieces<I, P>(pieces: I) -> TokenizerResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let id_to_piece: Vec<Vec<u8>> = pieces.into_iter().map(Into::into).collect();
        if id_to_piece.len() < N_SPECIAL_TOKENS {
            return Err(TokenizerError::Vocab(format!(
                "vocabulary needs at least {} special entries, got {}",
                N_SPECIAL_TOKENS,
                id_to_piece.len()
            )));
        }

        let mut piece_to_id = HashMap::with_capacity(id_to_piece.len());
        let mut max_piece_len = 0;
        for (id, piece) in id_to_piece.iter().enumerate().skip(N_SPECIAL_TOKENS) {
            if piece.is_empty() {
                return Err(TokenizerError::Vocab(format!("empty piece at id {}", id)));
            }
            if piece_to_id.insert(piece.clone(), id as TokenId).is_some() {
                return Err(TokenizerError::Vocab(format!(
                    "duplicate piece {:?} at id {}",
                    String::from_utf8_lossy(piece),
                    id
                )));
            }
            max_piece_len = max_piece_len.max(piece.len());
        }

        Ok(Self {
            id_to_piece,
            piece_to_id,
            max_piece_len,
        })
    }

    /// Byte-level vocabulary: the specials followed by every single byte.
    ///
    /// Byte `b` maps to id `b + 3`, so any input tokenizes.
    pub fn byte_level() -> Self {
        let mut id_to_piece = vec![b"<unk>".to_vec(), b"<s>".to_vec(), b"</s>".to_vec()];
        id_to_piece.extend((0..=255u8).map(|b| vec![b]));
        let piece_to_id = id_to_piece
            .iter()
            .enumerate()
            .skip(N_SPECIAL_TOKENS)
            .map(|(id, piece)| (piece.clone(), id as TokenId))
            .collect();
        Self {
            id_to_piece,
            piece_to_id,
            max_piece_len: 1,
        }
    }

    /// Load a vocabulary from a JSON file of the form `{"tokens": [...]}`.
    pub fn from_json_file(path: &Path) -> TokenizerResult<Self> {
        let file = File::open(path).map_err(|e| {
            TokenizerError::Vocab(format!("failed to open {}: {}", path.display(), e))
        })?;
        let parsed: VocabFile = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            TokenizerError::Vocab(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Self::from_pieces(parsed.tokens)
    }

    /// Id of a non-special piece, if present.
    pub fn id_of(&self, piece: &[u8]) -> Option<TokenId> {
        self.piece_to_id.get(piece).copied()
    }

    /// Length in bytes of the longest non-special piece.
    pub fn max_piece_len(&self) -> usize {
        self.max_piece_len
    }
}

impl Tokenizer for Vocab {
    fn tokenize(&self, text: &str, add_bos: bool) -> TokenizerResult<Vec<TokenId>> {
        let bytes = text.as_bytes();
        let mut ids = Vec::with_capacity(bytes.len() + usize::from(add_bos));
        if add_bos {
            ids.push(BOS_TOKEN_ID);
        }

        let mut pos = 0;
        while pos < bytes.len() {
            let longest = self.max_piece_len.min(bytes.len() - pos);
            let matched = (1..=longest)
                .rev()
                .find_map(|len| self.id_of(&bytes[pos..pos + len]).map(|id| (id, len)));

            match matched {
                Some((id, len)) => {
                    ids.push(id);
                    pos += len;
                }
                None => return Err(TokenizerError::Unmatched { offset: pos }),
            }
        }

        Ok(ids)
    }

    fn piece(&self, id: TokenId) -> TokenizerResult<&[u8]> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.id_to_piece.get(idx))
            .map(Vec::as_slice)
            .ok_or(TokenizerError::InvalidToken(id))
    }

    fn vocab_size(&self) -> usize {
        self.id_to_piece.len()
    }
}
