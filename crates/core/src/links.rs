//! Category-scoped action link extraction
//!
//! Every rule is anchored to the configured base domain: the configured path
//! expression is appended to the escaped `scheme://domain` prefix, so a rule
//! can never match a URL on another host. A rule may expose a named `token`
//! capture group for flows that need the embedded code rather than the link.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::types::NotificationMessage;

/// Characters stripped from both ends of a matched link
const TRIM_CHARS: &[char] = &['"', '\'', '`'];

/// Link configuration as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Host every notification link must live on, e.g. `app.example.com`
    pub base_domain: String,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default)]
    pub rules: Vec<LinkRuleSpec>,
}

fn default_scheme() -> String {
    "https".to_string()
}

/// One category: a path expression relative to the base domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRuleSpec {
    pub category: String,

    /// Regular expression matched right after `scheme://base_domain`; must
    /// start with `/`
    pub path: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            base_domain: "app.example.com".to_string(),
            scheme: default_scheme(),
            rules: vec![
                LinkRuleSpec {
                    category: "activation".to_string(),
                    path: r"/activate/(?P<token>[A-Za-z0-9_-]+)".to_string(),
                },
                LinkRuleSpec {
                    category: "login".to_string(),
                    path: r"/login\?token=(?P<token>[A-Za-z0-9_.-]+)".to_string(),
                },
                LinkRuleSpec {
                    category: "gift".to_string(),
                    path: r"/gift/(?P<token>[A-Za-z0-9_-]+)".to_string(),
                },
                LinkRuleSpec {
                    category: "story".to_string(),
                    path: r"/stories/[A-Za-z0-9_/-]+".to_string(),
                },
                LinkRuleSpec {
                    category: "unsubscribe".to_string(),
                    path: r"/unsubscribe[^\s<>]*".to_string(),
                },
            ],
        }
    }
}

/// Compiled rule for one link category
#[derive(Debug, Clone)]
pub struct LinkExtractionRule {
    pub category: String,
    pub pattern: Regex,
}

/// Compiled rules plus the domain they are anchored to
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    scheme: String,
    base_domain: String,
    rules: BTreeMap<String, LinkExtractionRule>,
}

impl LinkExtractor {
    pub fn from_settings(settings: &LinkSettings) -> Result<Self> {
        let domain = settings.base_domain.trim().to_ascii_lowercase();
        if domain.is_empty() || domain.contains('/') || domain.contains(char::is_whitespace) {
            return Err(Error::InvalidConfiguration(format!(
                "links.base_domain '{}' is not a bare hostname",
                settings.base_domain
            )));
        }
        let scheme = settings.scheme.trim().to_ascii_lowercase();
        if scheme != "https" && scheme != "http" {
            return Err(Error::InvalidConfiguration(format!(
                "links.scheme must be http or https, got '{}'",
                settings.scheme
            )));
        }

        let prefix = format!("{}://{}", regex::escape(&scheme), regex::escape(&domain));
        let mut rules = BTreeMap::new();
        for spec in &settings.rules {
            if !spec.path.starts_with('/') {
                return Err(Error::InvalidConfiguration(format!(
                    "link rule '{}' path must start with '/', got '{}'",
                    spec.category, spec.path
                )));
            }
            if rules.contains_key(&spec.category) {
                return Err(Error::InvalidConfiguration(format!(
                    "link rule '{}' defined twice",
                    spec.category
                )));
            }
            let pattern = Regex::new(&format!("(?i:{}){}", prefix, spec.path)).map_err(|e| {
                Error::InvalidConfiguration(format!("link rule '{}': {}", spec.category, e))
            })?;
            rules.insert(
                spec.category.clone(),
                LinkExtractionRule {
                    category: spec.category.clone(),
                    pattern,
                },
            );
        }

        Ok(Self {
            scheme,
            base_domain: domain,
            rules,
        })
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn rule(&self, category: &str) -> Result<&LinkExtractionRule> {
        self.rules
            .get(category)
            .ok_or_else(|| Error::UnknownLinkCategory(category.to_string()))
    }

    /// First absolute URL for `category`, searching the body then the subject
    pub fn extract(&self, message: &NotificationMessage, category: &str) -> Result<String> {
        self.find(message, category).map(|(link, _)| link)
    }

    /// The rule's `token` capture from the first matching link
    pub fn extract_token(&self, message: &NotificationMessage, category: &str) -> Result<String> {
        match self.find(message, category)? {
            (_, Some(token)) => Ok(token),
            (link, None) => Err(Error::LinkNotFound {
                category: format!("{} (token)", category),
                subject: message.subject().to_string(),
                body: link,
            }),
        }
    }

    /// Whether `category` has at least one valid link in the message
    pub fn contains(&self, message: &NotificationMessage, category: &str) -> Result<bool> {
        match self.find(message, category) {
            Ok(_) => Ok(true),
            Err(Error::LinkNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn find(&self, message: &NotificationMessage, category: &str) -> Result<(String, Option<String>)> {
        let rule = self.rule(category)?;

        for text in [message.body(), message.subject()] {
            for caps in rule.pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else {
                    continue;
                };
                let candidate = whole
                    .as_str()
                    .trim()
                    .trim_matches(TRIM_CHARS)
                    .trim();
                if self.is_navigable(candidate) {
                    let token = caps.name("token").map(|m| m.as_str().to_string());
                    debug!(category, link = candidate, "extracted link");
                    return Ok((candidate.to_string(), token));
                }
            }
        }

        Err(Error::LinkNotFound {
            category: category.to_string(),
            subject: message.subject().to_string(),
            body: message.body().to_string(),
        })
    }

    fn is_navigable(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        match Url::parse(candidate) {
            Ok(url) => {
                url.scheme() == self.scheme
                    && url
                        .host_str()
                        .map_or(false, |host| host.eq_ignore_ascii_case(&self.base_domain))
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn extractor() -> LinkExtractor {
        LinkExtractor::from_settings(&LinkSettings::default()).unwrap()
    }

    #[test]
    fn test_extracts_single_link_unchanged() {
        let msg = NotificationMessage::new(
            "noreply@app.example.com",
            "Welcome",
            "Click https://app.example.com/activate/abc-123 to start.",
        );
        let ex = extractor();
        let first = ex.extract(&msg, "activation").unwrap();
        let second = ex.extract(&msg, "activation").unwrap();
        assert_eq!(first, "https://app.example.com/activate/abc-123");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unrelated_domain_is_not_a_match() {
        let msg = NotificationMessage::new(
            "noreply@app.example.com",
            "Welcome",
            "Click https://evil.example.org/activate/abc-123 now",
        );
        let err = extractor().extract(&msg, "activation").unwrap_err();
        assert!(matches!(err, Error::LinkNotFound { ref category, .. } if category == "activation"));
    }

    #[test]
    fn test_lookalike_host_rejected() {
        let msg = NotificationMessage::new(
            "x",
            "y",
            "https://app.example.com.evil.org/activate/abc",
        );
        assert!(extractor().extract(&msg, "activation").is_err());
    }

    #[test]
    fn test_subject_fallback() {
        let msg = NotificationMessage::new(
            "x",
            "Your gift: https://app.example.com/gift/g-77",
            "No links in here.",
        );
        assert_eq!(
            extractor().extract(&msg, "gift").unwrap(),
            "https://app.example.com/gift/g-77"
        );
    }

    #[test_case("<a href=\"https://app.example.com/activate/tok\">go</a>" ; "html attribute")]
    #[test_case("'https://app.example.com/activate/tok'" ; "single quoted")]
    #[test_case("   https://app.example.com/activate/tok\n" ; "whitespace")]
    fn test_surrounding_quotes_and_space_trimmed(body: &str) {
        let msg = NotificationMessage::new("x", "y", body);
        assert_eq!(
            extractor().extract(&msg, "activation").unwrap(),
            "https://app.example.com/activate/tok"
        );
    }

    #[test]
    fn test_extract_token() {
        let msg = NotificationMessage::new(
            "x",
            "Sign in",
            "Use https://app.example.com/login?token=eyJ.abc-1 within 15 minutes",
        );
        assert_eq!(extractor().extract_token(&msg, "login").unwrap(), "eyJ.abc-1");
    }

    #[test]
    fn test_unknown_category() {
        let msg = NotificationMessage::new("x", "y", "z");
        assert!(matches!(
            extractor().extract(&msg, "billing"),
            Err(Error::UnknownLinkCategory(_))
        ));
    }

    #[test_case("", "/a" ; "empty domain")]
    #[test_case("app.example.com/path", "/a" ; "domain with path")]
    #[test_case("app.example.com", "activate" ; "relative path")]
    #[test_case("app.example.com", "/(unclosed" ; "bad regex")]
    fn test_invalid_settings(domain: &str, path: &str) {
        let settings = LinkSettings {
            base_domain: domain.to_string(),
            scheme: "https".to_string(),
            rules: vec![LinkRuleSpec {
                category: "activation".to_string(),
                path: path.to_string(),
            }],
        };
        assert!(matches!(
            LinkExtractor::from_settings(&settings),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
