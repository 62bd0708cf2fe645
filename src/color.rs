//! Terminal color helpers for fednode's progress output.
//!
//! Colors are suppressed when stdout is not a TTY or `NO_COLOR` is set
//! (https://no-color.org/).

use std::io::IsTerminal;
use std::sync::OnceLock;

static ENABLED: OnceLock<bool> = OnceLock::new();

pub fn enabled() -> bool {
    *ENABLED.get_or_init(|| {
        std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
    })
}

fn paint(on: bool, code: &str, s: &str) -> String {
    if on {
        format!("\x1b[{}m{}\x1b[0m", code, s)
    } else {
        s.to_string()
    }
}

fn wrap(code: &str, s: &str) -> String {
    paint(enabled(), code, s)
}

pub fn bold(s: &str) -> String       { wrap("1",    s) }
pub fn green(s: &str) -> String      { wrap("32",   s) }
pub fn yellow(s: &str) -> String     { wrap("33",   s) }
pub fn red(s: &str) -> String        { wrap("31",   s) }
pub fn bold_green(s: &str) -> String { wrap("1;32", s) }
