//! Error line patterns
//!
//! The four patterns are mutually exclusive; `classify_error` tries them in a
//! fixed order and the first match wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::error;

use super::event::ProtocolErrorKind;

/// Offset past the `!NN!` marker where the channel digits of an open failure start
const OPEN_FAILURE_DIGIT_OFFSET: usize = 4;

static OPEN_FAILED: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?:cannot|could not|unable to) open channel"));

static OPEN_TIMEOUT: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"timeout (?:while )?opening channel"));

static KILL_FAILED: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"common name '([^']*)' not found"));

static DUPLICATE_INSTANCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"another instance (?:of \S+ )?is already running"));

/// A pattern that fails to compile is logged and never matches
fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|e| error!("Invalid error pattern {:?}: {}", pattern, e))
        .ok()
}

fn is_match(pattern: &Option<Regex>, line: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(line))
}

/// Match `line` against the known error patterns
pub fn classify_error(line: &str) -> Option<ProtocolErrorKind> {
    if is_match(&OPEN_FAILED, line) {
        Some(ProtocolErrorKind::OpenFailed)
    } else if is_match(&OPEN_TIMEOUT, line) {
        Some(ProtocolErrorKind::OpenTimeout)
    } else if is_match(&KILL_FAILED, line) {
        Some(ProtocolErrorKind::KillFailed)
    } else if is_match(&DUPLICATE_INSTANCE, line) {
        Some(ProtocolErrorKind::DuplicateInstance)
    } else {
        None
    }
}

/// Quoted common name of a failed kill
pub fn kill_failed_username(line: &str) -> Option<String> {
    KILL_FAILED
        .as_ref()
        .and_then(|re| re.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Channel number of an open failure: every digit after the `!NN!` marker.
///
/// Digits anywhere in the message text are concatenated, so a message that
/// carries other numbers yields a wrong channel number.
pub fn open_failure_channel(line: &str) -> String {
    line.chars()
        .skip(OPEN_FAILURE_DIGIT_OFFSET)
        .filter(char::is_ascii_digit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &[(&str, ProtocolErrorKind)] = &[
        ("!00! ERROR: could not open channel 05", ProtocolErrorKind::OpenFailed),
        ("!00! cannot open channel 12", ProtocolErrorKind::OpenFailed),
        ("!00! unable to open channel 03: refused", ProtocolErrorKind::OpenFailed),
        ("!00! ERROR: timeout while opening channel 05", ProtocolErrorKind::OpenTimeout),
        ("!00! timeout opening channel 07", ProtocolErrorKind::OpenTimeout),
        (">02> ERROR: common name 'alice' not found", ProtocolErrorKind::KillFailed),
        ("!02! ERROR: common name 'bob smith' not found", ProtocolErrorKind::KillFailed),
        ("!00! another instance is already running", ProtocolErrorKind::DuplicateInstance),
        (
            "!00! ERROR: another instance of ovpn-wrapper is already running",
            ProtocolErrorKind::DuplicateInstance,
        ),
    ];

    fn matchers() -> [(&'static LazyLock<Option<Regex>>, ProtocolErrorKind); 4] {
        [
            (&OPEN_FAILED, ProtocolErrorKind::OpenFailed),
            (&OPEN_TIMEOUT, ProtocolErrorKind::OpenTimeout),
            (&KILL_FAILED, ProtocolErrorKind::KillFailed),
            (&DUPLICATE_INSTANCE, ProtocolErrorKind::DuplicateInstance),
        ]
    }

    #[test]
    fn test_patterns_compile() {
        for (pattern, kind) in matchers() {
            assert!(pattern.is_some(), "{:?} pattern", kind);
        }
    }

    #[test]
    fn test_patterns_mutually_exclusive() {
        for (line, expected) in CORPUS {
            let hits: Vec<ProtocolErrorKind> = matchers()
                .iter()
                .filter(|(re, _)| is_match(re, line))
                .map(|(_, kind)| *kind)
                .collect();
            assert_eq!(hits, vec![*expected], "line {:?}", line);
            assert_eq!(classify_error(line), Some(*expected));
        }
    }

    #[test]
    fn test_unrelated_lines_unclassified() {
        for line in [
            ">00> OK",
            ">02> SUCCESS: common name 'alice' found, 1 client(s) killed",
            ">02> OpenVPN Version: OpenVPN 2.6.8",
            "!00! something else went wrong",
        ] {
            assert_eq!(classify_error(line), None, "line {:?}", line);
        }
    }

    #[test]
    fn test_kill_failed_username() {
        assert_eq!(
            kill_failed_username(">02> ERROR: common name 'bob smith' not found").as_deref(),
            Some("bob smith")
        );
        assert_eq!(kill_failed_username(">02> OK"), None);
    }

    #[test]
    fn test_open_failure_channel_digits() {
        assert_eq!(open_failure_channel("!00! ERROR: could not open channel 05"), "05");
        assert_eq!(open_failure_channel("!00! timeout opening channel 7"), "7");
        // other numbers in the text are folded in
        assert_eq!(
            open_failure_channel("!00! could not open channel 05 on port 7505"),
            "057505"
        );
        assert_eq!(open_failure_channel("!00!"), "");
    }
}
