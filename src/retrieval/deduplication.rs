//! Content identity used to deduplicate passages across sources

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// How passage text is turned into a deduplication key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKeyPolicy {
    /// Byte-for-byte text equality
    #[default]
    Exact,
    /// Trim and collapse whitespace runs to a single space before keying
    CollapseWhitespace,
}

impl FromStr for ContentKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "collapse_whitespace" => Ok(Self::CollapseWhitespace),
            other => Err(format!(
                "Content key policy must be 'exact' or 'collapse_whitespace', got '{}'",
                other
            )),
        }
    }
}

/// Deduplication identity of a passage (BLAKE3 digest of its keyed text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentKey(blake3::Hash);

impl ContentKey {
    pub fn new(content: &str, policy: ContentKeyPolicy) -> Self {
        let keyed = normalize_content(content, policy);
        Self(blake3::hash(keyed.as_bytes()))
    }
}

/// Text that the key is derived from under `policy`
pub fn normalize_content(content: &str, policy: ContentKeyPolicy) -> Cow<'_, str> {
    match policy {
        ContentKeyPolicy::Exact => Cow::Borrowed(content),
        ContentKeyPolicy::CollapseWhitespace => {
            Cow::Owned(content.split_whitespace().collect::<Vec<_>>().join(" "))
        }
    }
}
