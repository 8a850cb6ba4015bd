//! Line-oriented user input for interactive splices.

use std::borrow::Cow;
use std::io::{BufRead, Write};

use llama_engine::TokenId;
use llama_tokenizer::Tokenizer;

use crate::console;

/// Longest line accepted from the user, in bytes.
pub const MAX_LINE_BYTES: usize = 255;

/// One physical line of user input, newline-terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLine {
    pub text: String,
    /// The line ended in a backslash and the user has more to say.
    pub continues: bool,
}

/// Read a single line.
///
/// The trailing newline is dropped and the content capped at
/// [`MAX_LINE_BYTES`]. A final backslash becomes a newline and marks a
/// continuation; otherwise a newline is appended. End of input reads as an
/// empty line.
pub fn read_line<R: BufRead>(input: &mut R) -> std::io::Result<InputLine> {
    let mut raw = Vec::new();
    input.read_until(b'\n', &mut raw)?;
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }

    let mut text = match String::from_utf8_lossy(&raw) {
        Cow::Borrowed(text) => text.to_owned(),
        Cow::Owned(text) => {
            tracing::warn!(
                len = raw.len(),
                "input line is not valid UTF-8, replacing bad bytes"
            );
            text
        }
    };
    if text.len() > MAX_LINE_BYTES {
        let mut end = MAX_LINE_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        tracing::warn!(
            len = text.len(),
            kept = end,
            "input line too long, truncating"
        );
        text.truncate(end);
    }

    let continues = text.ends_with('\\');
    if continues {
        text.pop();
    }
    text.push('\n');

    Ok(InputLine { text, continues })
}

/// Read one splice from the user, tokenize it without BOS, and append it to
/// `queue`. Returns the number of tokens added.
pub fn read_user_input<R, W, T>(
    input: &mut R,
    out: &mut W,
    tokenizer: &T,
    use_color: bool,
    queue: &mut Vec<TokenId>,
) -> crate::Result<usize>
where
    R: BufRead,
    W: Write,
    T: Tokenizer + ?Sized,
{
    let mut total = 0;
    loop {
        out.flush()?;
        if use_color {
            write!(out, "{}", console::USER_INPUT)?;
            out.flush()?;
        }
        let line = read_line(input)?;
        if use_color {
            write!(out, "{}", console::ANSI_COLOR_RESET)?;
        }

        let tokens = tokenizer.tokenize(&line.text, false)?;
        total += tokens.len();
        queue.extend(tokens);

        if !line.continues {
            break;
        }
    }
    tracing::debug!(tokens = total, "user input queued");
    Ok(total)
}
