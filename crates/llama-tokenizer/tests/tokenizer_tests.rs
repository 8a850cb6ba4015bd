//! Integration tests for llama-tokenizer.
//!
//! Validates:
//! - Pieces concatenate back to the input bytes
//! - Reverse prompts and user splices tokenize without BOS
//! - JSON vocabulary files load and reject malformed input
//! - Thread safety (concurrent tokenize)
//! - Trait object usage (dyn Tokenizer)

use std::io::Write;
use std::sync::Arc;

use llama_engine::BOS_TOKEN_ID;
use llama_tokenizer::*;

// ===========================================================================
// Roundtrip
// ===========================================================================

#[test]
fn pieces_reassemble_input() {
    let vocab = Vocab::byte_level();
    let inputs = [
        "Hello",
        "User:",
        "the quick brown fox\n",
        "tabs\tand\\backslashes",
        "日本語",
    ];
    for input in &inputs {
        let ids = vocab.tokenize(input, false).unwrap();
        let decoded = vocab.decode(&ids).unwrap();
        assert_eq!(decoded, input.as_bytes(), "roundtrip failed for: {:?}", input);
    }
}

#[test]
fn bos_decodes_to_marker_piece() {
    let vocab = Vocab::byte_level();
    let ids = vocab.tokenize("hi", true).unwrap();
    assert_eq!(ids[0], BOS_TOKEN_ID);
    assert_eq!(vocab.decode(&ids).unwrap(), b"<s>hi");
}

#[test]
fn reverse_prompt_is_a_tail_of_the_prompt_tokens() {
    // Tokenizing without BOS must produce the same ids the model would see
    // when the same text is generated one piece at a time.
    let vocab = Vocab::byte_level();
    let prompt = vocab.tokenize("Transcript.\nUser:", true).unwrap();
    let antiprompt = vocab.tokenize("User:", false).unwrap();
    assert!(prompt.ends_with(&antiprompt));
}

// ===========================================================================
// Vocabulary files
// ===========================================================================

#[test]
fn json_vocab_loads() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"tokens": ["<unk>", "<s>", "</s>", "Hel", "lo", "H", "e", "l", "o", "\n"]}}"#
    )
    .unwrap();

    let vocab = Vocab::from_json_file(file.path()).unwrap();
    assert_eq!(vocab.vocab_size(), 10);
    assert_eq!(vocab.max_piece_len(), 3);
    assert_eq!(vocab.tokenize("Hello\n", false).unwrap(), vec![3, 4, 9]);
}

#[test]
fn json_vocab_missing_file_errors() {
    let err = Vocab::from_json_file(std::path::Path::new("/nonexistent/vocab.json")).unwrap_err();
    assert!(matches!(err, TokenizerError::Vocab(_)));
    assert!(err.to_string().contains("failed to open"));
}

#[test]
fn json_vocab_malformed_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"pieces": []}}"#).unwrap();
    let err = Vocab::from_json_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse"));
}

// ===========================================================================
// Concurrency and dispatch
// ===========================================================================

#[test]
fn concurrent_tokenize_is_deterministic() {
    let vocab = Arc::new(Vocab::byte_level());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let vocab = Arc::clone(&vocab);
            std::thread::spawn(move || vocab.tokenize("same input", false).unwrap())
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn trait_object_usage() {
    let tok: Box<dyn Tokenizer> = Box::new(Vocab::byte_level());
    let ids = tok.tokenize("ok", false).unwrap();
    assert_eq!(ids, vec![b'o' as i32 + 3, b'k' as i32 + 3]);
    assert_eq!(tok.piece(ids[0]).unwrap(), b"o");
}
