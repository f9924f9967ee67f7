//! Line prefix classification
//!
//! Every line on the wrapper stream starts with a four character marker
//! `sNNs`: a sentinel character, the two character channel code, and the same
//! sentinel again.

/// Direction/kind carried by the sentinel pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    /// `<NN<` outbound, echoed back by the remote tty
    Output,
    /// `>NN>` reply or event
    Input,
    /// `_NN_` reply without a trailing newline
    InputNoNewline,
    /// `!NN!` error
    Error,
    /// `.NN.` closedown notice
    Closedown,
    Undefined,
}

impl PrefixKind {
    fn from_sentinel(c: char) -> Self {
        match c {
            '<' => Self::Output,
            '>' => Self::Input,
            '_' => Self::InputNoNewline,
            '!' => Self::Error,
            '.' => Self::Closedown,
            _ => Self::Undefined,
        }
    }

    pub fn sentinel(self) -> Option<char> {
        match self {
            Self::Output => Some('<'),
            Self::Input => Some('>'),
            Self::InputNoNewline => Some('_'),
            Self::Error => Some('!'),
            Self::Closedown => Some('.'),
            Self::Undefined => None,
        }
    }
}

/// Classify the first whitespace-delimited token of a line
pub fn classify(token: &str) -> PrefixKind {
    let mut chars = token.chars();
    let (Some(first), Some(_), Some(_), Some(fourth)) =
        (chars.next(), chars.next(), chars.next(), chars.next())
    else {
        return PrefixKind::Undefined;
    };

    if first != fourth {
        return PrefixKind::Undefined;
    }
    PrefixKind::from_sentinel(first)
}

/// A recognised line prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePrefix {
    pub kind: PrefixKind,
    pub channel: String,
}

impl LinePrefix {
    /// Parse the prefix of a whole line. `None` for undefined prefixes.
    pub fn parse(line: &str) -> Option<Self> {
        let token = line.split_whitespace().next()?;
        let kind = classify(token);
        if kind == PrefixKind::Undefined {
            return None;
        }
        let channel: String = token.chars().skip(1).take(2).collect();
        Some(Self { kind, channel })
    }
}
