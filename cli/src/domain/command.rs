//! Encoding of a command line for remote shell execution.
//!
//! Pure functions only — no I/O, no async.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::domain::error::RunError;

/// Quote `token` for a POSIX shell using single quotes.
///
/// Each embedded `'` is emitted as `\'` outside the quoted runs. Empty runs
/// next to an embedded quote are dropped rather than written as `''`, so
/// `'bash'` becomes `\''bash'\'`. A wholly empty token becomes `''`.
#[must_use]
pub fn quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }

    let mut out = String::with_capacity(token.len() + 2);
    let mut rest = token;
    loop {
        match rest.find('\'') {
            None => {
                if !rest.is_empty() {
                    out.push('\'');
                    out.push_str(rest);
                    out.push('\'');
                }
                return out;
            }
            Some(0) => {
                out.push_str("\\'");
                rest = &rest[1..];
            }
            Some(i) => {
                out.push('\'');
                out.push_str(&rest[..i]);
                out.push('\'');
                out.push_str("\\'");
                rest = &rest[i + 1..];
            }
        }
    }
}

/// Encode `args` into a single shell command string.
///
/// `args[0]` is looked up in `aliases`; a match is substituted verbatim,
/// otherwise `args[0]` is quoted. Remaining arguments are quoted one by one
/// and joined with single spaces.
///
/// # Errors
///
/// Returns [`RunError::EmptyCommand`] if `args` is empty.
pub fn encode_command<S: AsRef<str>>(
    aliases: &BTreeMap<String, String>,
    args: &[S],
) -> Result<String> {
    let (first, rest) = args.split_first().ok_or(RunError::EmptyCommand)?;
    let first = first.as_ref();
    let base = aliases
        .get(first)
        .cloned()
        .unwrap_or_else(|| quote(first));

    let mut parts = Vec::with_capacity(args.len());
    parts.push(base);
    parts.extend(rest.iter().map(|arg| quote(arg.as_ref())));
    Ok(parts.join(" "))
}
