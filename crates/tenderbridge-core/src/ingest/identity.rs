use regex::Regex;
use url::Url;

use crate::{Error, Result};

/// Derives the natural notice identifier from a source URL.
#[derive(Debug, Clone)]
pub struct NoticeIdentity {
    pattern: Regex,
}

impl NoticeIdentity {
    /// `pattern` must have one capture group holding the identifier.
    pub fn from_pattern(pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|e| Error::pattern(pattern, e))?;
        if compiled.captures_len() < 2 {
            return Err(Error::Config(format!(
                "notice id pattern `{pattern}` needs a capture group"
            )));
        }
        Ok(Self { pattern: compiled })
    }

    /// Full URLs are matched on their path; anything else is matched as is.
    #[must_use]
    pub fn derive(&self, source: &str) -> Option<String> {
        let source = source.trim();
        let parsed = Url::parse(source).ok();
        let haystack = parsed.as_ref().map_or(source, Url::path);

        self.pattern
            .captures(haystack)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    fn identity() -> NoticeIdentity {
        NoticeIdentity::from_pattern(&ExtractionConfig::default().notice_id_pattern).unwrap()
    }

    #[test]
    fn test_derive_from_url() {
        assert_eq!(
            identity().derive("https://www.boamp.fr/avis/detail/24-123456?utm=x#top"),
            Some("24-123456".into())
        );
        assert_eq!(
            identity().derive("https://www.boamp.fr/pages/avis/detail/24-7/"),
            Some("24-7".into())
        );
    }

    #[test]
    fn test_derive_from_bare_path() {
        assert_eq!(identity().derive("/avis/detail/24-99"), Some("24-99".into()));
    }

    #[test]
    fn test_no_identity() {
        assert_eq!(identity().derive("https://www.boamp.fr/recherche"), None);
        assert_eq!(identity().derive(""), None);
    }

    #[test]
    fn test_pattern_needs_group() {
        assert!(NoticeIdentity::from_pattern(r"/avis/detail/\d+").is_err());
        assert!(NoticeIdentity::from_pattern(r"(unclosed").is_err());
    }
}
