//! ANSI escape sequences used when `--color` is on.

pub const ANSI_COLOR_YELLOW: &str = "\x1b[33m";
pub const ANSI_COLOR_GREEN: &str = "\x1b[32m";
pub const ANSI_BOLD: &str = "\x1b[1m";
pub const ANSI_COLOR_RESET: &str = "\x1b[0m";

/// Prompt text is echoed in yellow.
pub const PROMPT: &str = ANSI_COLOR_YELLOW;

/// User typing happens in bold green.
pub const USER_INPUT: &str = "\x1b[1m\x1b[32m";
