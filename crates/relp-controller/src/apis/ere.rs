//! POSIX extended regular expression checks
//!
//! The forwarder evaluates `re_match()` with POSIX ERE semantics. The `regex`
//! crate accepts a superset of that syntax, so Perl-only constructs are
//! rejected up front and the remainder is compiled to catch syntax errors.
//! Bracket expressions are rewritten first because `regex` gives `\`, `[`,
//! `&` and `~` a meaning inside `[...]` that POSIX does not.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EreError {
    #[error("Perl escape '\\{0}' is not supported by POSIX ERE")]
    PerlEscape(char),

    #[error("non-greedy repetition is not supported by POSIX ERE")]
    NonGreedy,

    #[error("group flags '(?' are not supported by POSIX ERE")]
    GroupFlags,

    #[error("trailing backslash")]
    TrailingBackslash,

    #[error("{0}")]
    Syntax(String),
}

/// Escapes that only exist in Perl-style dialects.
const PERL_ESCAPES: &[char] = &[
    'd', 'D', 's', 'S', 'w', 'W', 'b', 'B', 'A', 'z', 'Z', 'p', 'P', 'Q', 'E', 'C', 'G', 'K',
    'x', 'X',
];

/// Compiles `pattern` after rejecting constructs outside POSIX ERE.
pub fn compile_posix_ere(pattern: &str) -> Result<Regex, EreError> {
    check_posix_syntax(pattern)?;
    Regex::new(&literal_brackets(pattern)).map_err(|e| EreError::Syntax(e.to_string()))
}

/// Escapes bracket members that `regex` would otherwise read as escapes,
/// nested classes or set operators.
fn literal_brackets(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                out.extend(chars[i..chars.len().min(i + 2)].iter());
                i += 2;
            }
            '[' => {
                let end = skip_bracket_expression(&chars, i);
                push_bracket(&chars[i..end], &mut out);
                i = end;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn push_bracket(bracket: &[char], out: &mut String) {
    out.push('[');
    let mut i = 1;
    if bracket.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }
    if bracket.get(i) == Some(&']') {
        out.push_str("\\]");
        i += 1;
    }
    while i < bracket.len() {
        match bracket[i] {
            '[' if bracket.get(i + 1) == Some(&':') => {
                let close = class_end(bracket, i);
                out.extend(bracket[i..close].iter());
                i = close;
            }
            c @ ('\\' | '[' | '&' | '~') => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
}

/// Index just past the `[:class:]` starting at `start`.
fn class_end(chars: &[char], start: usize) -> usize {
    chars[start + 2..]
        .windows(2)
        .position(|w| w[0] == ':' && w[1] == ']')
        .map_or(chars.len(), |p| start + 2 + p + 2)
}

fn check_posix_syntax(pattern: &str) -> Result<(), EreError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    let mut after_quantifier = false;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    return Err(EreError::TrailingBackslash);
                };
                if PERL_ESCAPES.contains(&next) {
                    return Err(EreError::PerlEscape(next));
                }
                after_quantifier = false;
                i += 2;
                continue;
            }
            '[' => {
                i = skip_bracket_expression(&chars, i);
                after_quantifier = false;
                continue;
            }
            '(' if chars.get(i + 1) == Some(&'?') => return Err(EreError::GroupFlags),
            '?' if after_quantifier => return Err(EreError::NonGreedy),
            '*' | '+' | '?' | '}' => {
                after_quantifier = true;
                i += 1;
                continue;
            }
            _ => {}
        }
        after_quantifier = false;
        i += 1;
    }

    Ok(())
}

/// Returns the index just past the bracket expression starting at `start`.
/// A `]` directly after `[` or `[^` is a literal member; `[:class:]` is skipped whole.
fn skip_bracket_expression(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '[' if chars.get(i + 1) == Some(&':') => i = class_end(chars, i),
            ']' => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}
