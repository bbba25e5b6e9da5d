use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
/// `www.<apex>` is the longest name derived from an apex, and it still has
/// to fit in [`MAX_NAME_LEN`].
const MAX_APEX_LEN: usize = MAX_NAME_LEN - "www.".len();

/// A fully qualified apex domain, eg: `mysite.com` or `sub.mysite.com`.
/// Only constructed through [`DomainName::parse`], so holding one means
/// the name is syntactically valid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    /// Examples of valid values:
    /// - mysite.com
    /// - multiple.sub.domains.mysite.com
    ///
    /// Examples of invalid values:
    /// - *.mysite.com (wildcards are derived, never provided)
    /// - cannotendwithdot.com.
    /// - localhost
    pub fn parse(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let invalid = |reason: &str| Error::config("domain_name", format!("{s:?} is not a valid domain name. {reason}"));
        if name.is_empty() {
            return Err(invalid("Must not be empty"));
        }
        if name.len() > MAX_APEX_LEN {
            return Err(invalid(&format!(
                "Must be at most {MAX_APEX_LEN} characters so that www.<name> and *.<name> are valid hostnames"
            )));
        }
        if name.ends_with('.') {
            return Err(invalid("Must not end with a dot"));
        }
        if name.contains('*') {
            return Err(invalid("Must not contain a wildcard"));
        }
        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Err(invalid("Must have at least two labels, eg: mysite.com"));
        }
        for label in &labels {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(invalid("Every label must be between 1 and 63 characters"));
            }
            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(invalid("May only contain letters, numbers, dots, and dashes"));
            }
            if label.starts_with('-') || label.ends_with('-') {
                return Err(invalid("Labels must not start or end with a dash"));
            }
        }
        // labels is non-empty, checked above.
        if labels[labels.len() - 1].chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("Top level domain must not be numeric"));
        }
        Ok(DomainName(name))
    }

    pub fn apex(&self) -> &str {
        &self.0
    }

    pub fn www(&self) -> String {
        format!("www.{}", self.0)
    }

    pub fn wildcard(&self) -> String {
        format!("*.{}", self.0)
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// true if a certificate/alias entry `pattern` serves `host`.
/// A wildcard only matches exactly one extra label, like ACM and CloudFront do.
pub fn covers(pattern: &str, host: &str) -> bool {
    if pattern == host {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(rest) => match host.split_once('.') {
            Some((first, host_rest)) => !first.is_empty() && host_rest == rest,
            None => false,
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes() {
        let d = DomainName::parse("Gyuri.ORG").unwrap();
        assert_eq!(d.apex(), "gyuri.org");
        assert_eq!(d.www(), "www.gyuri.org");
        assert_eq!(d.wildcard(), "*.gyuri.org");
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "not a domain!!", "localhost", "mysite.com.", "*.mysite.com", "-a.com", "a-.com", "a..com", "10.0.0.1"] {
            assert!(matches!(DomainName::parse(bad), Err(Error::Configuration { .. })), "{bad} should be invalid");
        }
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(DomainName::parse(&long_label).is_err());
    }

    /// a valid name of exactly `len` characters, labels well under 63.
    fn name_of_len(len: usize) -> String {
        let head = format!("{}.", "a".repeat(50)).repeat(4);
        format!("{head}{}.com", "b".repeat(len - head.len() - ".com".len()))
    }

    #[test]
    fn derived_names_fit_dns_limit() {
        let longest = DomainName::parse(&name_of_len(249)).unwrap();
        assert_eq!(longest.apex().len(), 249);
        assert_eq!(longest.www().len(), 253);
        assert!(longest.wildcard().len() <= 253);

        for len in [250, 251, 253] {
            match DomainName::parse(&name_of_len(len)) {
                Err(Error::Configuration { field, reason }) => {
                    assert_eq!(field, "domain_name");
                    assert!(reason.contains("www.<name>"), "{reason}");
                }
                other => panic!("{len} characters should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn wildcard_covers_one_level() {
        assert!(covers("example.org", "example.org"));
        assert!(covers("*.example.org", "www.example.org"));
        assert!(!covers("*.example.org", "example.org"));
        assert!(!covers("*.example.org", "a.b.example.org"));
        assert!(!covers("www.example.org", "api.example.org"));
    }
}
