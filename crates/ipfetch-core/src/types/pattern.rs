//! URL pattern used for selective invalidation

use regex::Regex;

use crate::CacheError;

/// Text pattern matched against stored request URLs
///
/// Regular-expression search semantics: the pattern may match anywhere in
/// the URL unless anchored with `^`/`$`.
#[derive(Debug, Clone)]
pub struct UrlPattern(Regex);

impl UrlPattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| CacheError::InvalidPattern(e.to_string()))
    }

    /// Check a stored URL
    pub fn matches(&self, url: &str) -> bool {
        self.0.is_match(url)
    }

    /// Original pattern source
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unanchored_match() {
        let p = UrlPattern::new(r"patents\.google\.com/patent/US").unwrap();
        assert!(p.matches("https://patents.google.com/patent/US1234567B2/en"));
        assert!(!p.matches("https://api.uspto.gov/api/v1/patent/applications"));
    }

    #[test]
    fn test_anchored_match() {
        let p = UrlPattern::new(r"^https://api\.uspto\.gov/").unwrap();
        assert!(p.matches("https://api.uspto.gov/x"));
        assert!(!p.matches("http://mirror/https://api.uspto.gov/x"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            UrlPattern::new("(unclosed"),
            Err(CacheError::InvalidPattern(_))
        ));
    }
}
