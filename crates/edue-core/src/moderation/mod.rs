//! Word-list based profanity filtering for chat messages.
//!
//! Text is NFKC-normalized and lowercased, allowed words are stripped out,
//! and whatever remains is searched for blocked substrings. Allowed words are
//! stripped longest first so that e.g. "class" is removed before "ass" is
//! looked for.

use std::collections::HashSet;
use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Message sent to a user whose chat message was removed.
pub const MODERATION_NOTICE: &str = "Your message was removed due to inappropriate language. \
Please use safe language to keep our learning space suitable for all. Thank you!";

/// Load a word list: one word per line, trimmed and lowercased, blank lines skipped.
///
/// A missing or unreadable file is treated as an empty list.
#[must_use]
pub fn load_wordlist(path: &Path) -> HashSet<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_wordlist(&content),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Word list not readable, treating as empty");
            HashSet::new()
        }
    }
}

fn parse_wordlist(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Blocked/allowed word filter.
#[derive(Debug, Clone, Default)]
pub struct WordFilter {
    blacklist: HashSet<String>,
    /// Sorted by length, longest first.
    whitelist: Vec<String>,
}

impl WordFilter {
    /// Create a filter from in-memory word sets.
    #[must_use]
    pub fn new<B, W>(blacklist: B, whitelist: W) -> Self
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        let blacklist = blacklist
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        let mut whitelist: Vec<String> = whitelist
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        whitelist.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self {
            blacklist,
            whitelist,
        }
    }

    /// Load both lists from disk.
    #[must_use]
    pub fn from_files(blacklist: &Path, whitelist: &Path) -> Self {
        let filter = Self::new(load_wordlist(blacklist), load_wordlist(whitelist));
        tracing::info!(
            blocked = filter.blacklist.len(),
            allowed = filter.whitelist.len(),
            "Loaded moderation word lists"
        );
        filter
    }

    /// Number of blocked words.
    #[must_use]
    pub fn blocked_len(&self) -> usize {
        self.blacklist.len()
    }

    /// Check whether a message contains a blocked word.
    #[must_use]
    pub fn is_profane(&self, text: &str) -> bool {
        if self.blacklist.is_empty() {
            return false;
        }

        let mut cleaned: String = text.nfkc().collect::<String>().to_lowercase();
        for word in &self.whitelist {
            if cleaned.contains(word.as_str()) {
                cleaned = cleaned.replace(word.as_str(), "");
            }
        }

        self.blacklist.iter().any(|bad| cleaned.contains(bad.as_str()))
    }
}
