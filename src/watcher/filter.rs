//! Filename glob filtering.

use globset::{GlobBuilder, GlobMatcher};

use crate::error::DispatchError;

/// A compiled pattern, or the reason it failed to compile.
#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    matcher: std::result::Result<GlobMatcher, String>,
}

/// Ordered list of filename globs. A name is admitted by the first pattern
/// that matches it.
///
/// `*` and `?` never cross a `/`; `**` does. Matching is case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct FilenameFilter {
    patterns: Vec<Pattern>,
}

impl FilenameFilter {
    /// Compile `patterns`.
    ///
    /// Malformed patterns are kept and reported each time matching reaches
    /// them, so one bad pattern only affects events that get that far.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let source = p.as_ref().to_string();
                let matcher = GlobBuilder::new(&source)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| e.kind().to_string());
                if let Err(reason) = &matcher {
                    tracing::warn!(pattern = %source, %reason, "Invalid filename pattern");
                }
                Pattern { source, matcher }
            })
            .collect();

        Self { patterns }
    }

    /// Return the first pattern matching `name`, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Glob`] if a malformed pattern is reached
    /// before any pattern matches.
    pub fn first_match(&self, name: &str) -> std::result::Result<Option<&str>, DispatchError> {
        for pattern in &self.patterns {
            let matcher = pattern.matcher.as_ref().map_err(|reason| DispatchError::Glob {
                pattern: pattern.source.clone(),
                reason: reason.clone(),
            })?;

            if matcher.is_match(name) {
                tracing::debug!(file_name = name, pattern = %pattern.source, "match");
                return Ok(Some(&pattern.source));
            }

            tracing::debug!(file_name = name, pattern = %pattern.source, "no match");
        }

        Ok(None)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, name: &str) -> bool {
        FilenameFilter::new(&[pattern])
            .first_match(name)
            .unwrap()
            .is_some()
    }

    #[test]
    fn test_single_segment_wildcard() {
        assert!(matches("*.go", "main.go"));
        assert!(!matches("*.go", "sub/main.go"));
        assert!(!matches("*.go", "main.rs"));
    }

    #[test]
    fn test_recursive_wildcard() {
        assert!(matches("**/*.go", "main.go"));
        assert!(matches("**/*.go", "sub/main.go"));
        assert!(matches("**/*.go", "a/b/c/main.go"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(matches("*.txt", "notes.txt"));
        assert!(!matches("*.txt", "NOTES.TXT"));
        assert!(!matches("README", "readme"));
    }

    #[test]
    fn test_character_classes_and_alternation() {
        assert!(matches("report-[0-9].csv", "report-7.csv"));
        assert!(!matches("report-[0-9].csv", "report-x.csv"));
        assert!(matches("*.{jpg,png}", "photo.png"));
        assert!(matches("?.md", "a.md"));
        assert!(!matches("?.md", "ab.md"));
    }

    #[test]
    fn test_first_match_wins() {
        let filter = FilenameFilter::new(&["*.log", "*.txt", "a.*"]);
        assert_eq!(filter.first_match("a.txt").unwrap(), Some("*.txt"));
        assert_eq!(filter.first_match("a.log").unwrap(), Some("*.log"));
        assert_eq!(filter.first_match("b.csv").unwrap(), None);
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = FilenameFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        assert_eq!(filter.first_match("a.txt").unwrap(), None);
    }

    #[test]
    fn test_malformed_pattern_errors_when_reached() {
        let filter = FilenameFilter::new(&["*.txt", "[a-", "*.log"]);
        assert_eq!(filter.len(), 3);

        // Matched before the bad pattern is evaluated.
        assert_eq!(filter.first_match("a.txt").unwrap(), Some("*.txt"));

        let err = filter.first_match("a.log").unwrap_err();
        assert!(matches!(err, DispatchError::Glob { ref pattern, .. } if pattern == "[a-"));
    }
}
