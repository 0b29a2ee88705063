use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Whether a send targets one person or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    Individual,
    Group,
}

/// Group ids are base64 of 32 bytes, so anything shorter is not one.
const MIN_GROUP_ID_LEN: usize = 21;

impl RecipientKind {
    /// Guess the kind from the address alone.
    ///
    /// Phone numbers start with `+`. Anything else made only of base64
    /// characters and longer than 20 characters is taken to be a group id.
    /// This is a heuristic: callers that know the kind should say so.
    #[must_use]
    pub fn detect(address: &str) -> Self {
        let looks_like_group = !address.starts_with('+')
            && address.len() >= MIN_GROUP_ID_LEN
            && address.chars().all(is_base64_char);
        if looks_like_group {
            Self::Group
        } else {
            Self::Individual
        }
    }

    /// An explicit kind wins over [`RecipientKind::detect`].
    #[must_use]
    pub fn resolve(address: &str, explicit: Option<Self>) -> Self {
        explicit.unwrap_or_else(|| Self::detect(address))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
        }
    }
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

impl fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" | "direct" | "contact" => Ok(Self::Individual),
            "group" => Ok(Self::Group),
            other => Err(format!(
                "unknown recipient type '{other}' (expected 'individual' or 'group')"
            )),
        }
    }
}
