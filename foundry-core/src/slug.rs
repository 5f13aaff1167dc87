//! App slug validation
//!
//! Slugs are used in URLs and hostnames, so they are restricted to
//! lowercase alphanumerics with single interior hyphens.

use std::sync::LazyLock;

use regex::Regex;

pub static APP_SLUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9](-?[a-z0-9])*$").expect("app slug regex"));

/// Maximum slug length; anything longer breaks subdomain hostnames.
pub const MAX_APP_SLUG_LEN: usize = 32;

pub fn is_valid_app_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.len() <= MAX_APP_SLUG_LEN && APP_SLUG_REGEX.is_match(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        for slug in ["code", "code-server", "a", "a1", "1a", "x-1-y-2"] {
            assert!(is_valid_app_slug(slug), "expected {slug:?} to be valid");
        }
    }

    #[test]
    fn invalid_slugs() {
        for slug in [
            "",
            "-code",
            "code-",
            "co--de",
            "Code",
            "code_server",
            "code server",
            "ide.web",
        ] {
            assert!(!is_valid_app_slug(slug), "expected {slug:?} to be invalid");
        }
        assert!(!is_valid_app_slug(&"a".repeat(MAX_APP_SLUG_LEN + 1)));
    }
}
