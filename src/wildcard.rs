//! Matching of `*` wildcard patterns.
//!
//! Only `*` is special: it matches any (possibly empty) sequence of
//! characters. A pattern is split into its literal tokens once and can
//! then be matched against many candidates.

/// Check whether `s` contains a wildcard of any kind understood by
/// shell globbing (`*` or a `[...]` character class).
pub fn has_wildcard(s: &str) -> bool {
    s.contains('*') || (s.contains('[') && s.contains(']'))
}


/// A pre-tokenized `*` wildcard pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WildcardPattern {
    tokens: Vec<String>,
    start_wildcard: bool,
    end_wildcard: bool,
}

impl WildcardPattern {
    /// Tokenize `pattern`.
    pub fn new(pattern: &str) -> Self {
        let tokens = pattern
            .split('*')
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            tokens,
            start_wildcard: pattern.starts_with('*'),
            end_wildcard: pattern.ends_with('*'),
        }
    }

    /// Create a pattern from already split literal tokens.
    pub fn with_tokens<I, S>(tokens: I, start_wildcard: bool, end_wildcard: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(S::into).collect(),
            start_wildcard,
            end_wildcard,
        }
    }

    /// The literal tokens of the pattern.
    #[inline]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Check whether `candidate` matches the pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        let (first, last) = match (self.tokens.first(), self.tokens.last()) {
            (Some(first), Some(last)) => (first, last),
            // No literal tokens: either "*" (or "**"...), matching
            // everything, or the empty pattern.
            _ => return self.start_wildcard || candidate.is_empty(),
        };

        // A lone anchored token has to cover the whole candidate.
        if self.tokens.len() == 1 && !self.start_wildcard && !self.end_wildcard {
            return candidate == first.as_str()
        }

        let mut start = 0;
        let mut next = 0;
        if !self.start_wildcard {
            if !candidate.starts_with(first.as_str()) {
                return false
            }
            start = 1;
            next = first.len();
        }

        // With an anchored end the last token has to match the suffix,
        // so only the tokens before it are searched for and they must
        // all fit in front of it.
        let (end, limit) = if self.end_wildcard {
            (self.tokens.len(), candidate.len())
        } else {
            if !candidate.ends_with(last.as_str()) {
                return false
            }
            (self.tokens.len() - 1, candidate.len() - last.len())
        };

        for token in self.tokens.get(start..end).unwrap_or_default() {
            match candidate[next..].find(token.as_str()) {
                Some(idx) => next += idx + token.len(),
                None => return false,
            }
        }
        next <= limit
    }
}
