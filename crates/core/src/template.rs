//! Expected notification shapes and placeholder rendering
//!
//! Subject lines, senders and recipient rules are data: a template names the
//! notification type, carries a subject pattern with `{placeholder}` slots and
//! lists the link categories the message must contain. Templates are grouped
//! in a YAML catalog; a built-in catalog covers the standard notification
//! types and can be replaced by a file at runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::seed::PersonSeed;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"));

const BUILTIN_CATALOG: &str = include_str!("../templates/notifications.yaml");

/// Named values substituted into `{placeholder}` slots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placeholders(BTreeMap<String, String>);

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `firstName`, `lastName` and `email` for a single person
    pub fn for_person(person: &PersonSeed) -> Self {
        Self::new()
            .with("firstName", &person.first_name)
            .with("lastName", &person.last_name)
            .with("email", &person.email)
    }

    /// Giver and receiver names for gift notifications
    pub fn for_gift(giver: &PersonSeed, receiver: &PersonSeed) -> Self {
        Self::new()
            .with("giverFirstName", &giver.first_name)
            .with("giverLastName", &giver.last_name)
            .with("giverEmail", &giver.email)
            .with("receiverFirstName", &receiver.first_name)
            .with("receiverLastName", &receiver.last_name)
            .with("receiverEmail", &receiver.email)
    }

    /// Values from `other` win on conflict
    pub fn merged(mut self, other: &Placeholders) -> Self {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Placeholders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Substitute every `{name}` in `pattern`. Unknown names are an error.
pub fn render(pattern: &str, values: &Placeholders) -> Result<String> {
    render_inner(pattern, values, false)
}

/// Like [`render`], but values are regex-escaped so the result stays a valid
/// pattern that matches them literally
pub fn render_regex(pattern: &str, values: &Placeholders) -> Result<String> {
    render_inner(pattern, values, true)
}

/// Placeholder names referenced by `pattern`, in order of first appearance
pub fn placeholder_names(pattern: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in PLACEHOLDER.captures_iter(pattern) {
        let name = cap[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

fn render_inner(pattern: &str, values: &Placeholders, escape: bool) -> Result<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;
    for cap in PLACEHOLDER.captures_iter(pattern) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let name = name.as_str();
        let value = values.get(name).ok_or_else(|| Error::MissingPlaceholder {
            pattern: pattern.to_string(),
            name: name.to_string(),
        })?;
        out.push_str(&pattern[last..whole.start()]);
        if escape {
            out.push_str(&regex::escape(value));
        } else {
            out.push_str(value);
        }
        last = whole.end();
    }
    out.push_str(&pattern[last..]);
    Ok(out)
}

/// Prefix/suffix style rule for addresses whose exact value is dynamic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRule {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl AddressRule {
    /// Render placeholders inside the rule value
    pub fn render(&self, values: &Placeholders) -> Result<AddressRule> {
        Ok(match self {
            AddressRule::Exact(v) => AddressRule::Exact(render(v, values)?),
            AddressRule::Prefix(v) => AddressRule::Prefix(render(v, values)?),
            AddressRule::Suffix(v) => AddressRule::Suffix(render(v, values)?),
            AddressRule::Contains(v) => AddressRule::Contains(render(v, values)?),
        })
    }

    /// Case-insensitive match against a bare or display-name-wrapped address
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = bare_address(candidate).to_ascii_lowercase();
        match self {
            AddressRule::Exact(v) => candidate == v.to_ascii_lowercase(),
            AddressRule::Prefix(v) => candidate.starts_with(&v.to_ascii_lowercase()),
            AddressRule::Suffix(v) => candidate.ends_with(&v.to_ascii_lowercase()),
            AddressRule::Contains(v) => candidate.contains(&v.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for AddressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressRule::Exact(v) => write!(f, "= {}", v),
            AddressRule::Prefix(v) => write!(f, "{}*", v),
            AddressRule::Suffix(v) => write!(f, "*{}", v),
            AddressRule::Contains(v) => write!(f, "*{}*", v),
        }
    }
}

/// `"Shop" <noreply@shop.test>` -> `noreply@shop.test`
pub fn bare_address(value: &str) -> &str {
    let value = value.trim();
    match (value.rfind('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => value[open + 1..close].trim(),
        _ => value,
    }
}

/// Expected shape of one notification type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedTemplate {
    pub name: String,

    /// Subject with `{placeholder}` slots
    pub subject_pattern: String,

    /// Treat `subject_pattern` as a regular expression after substitution
    #[serde(default)]
    pub subject_is_regex: bool,

    /// Matched as a substring of the real sender, which may carry a display name
    #[serde(default)]
    pub expected_sender: Option<String>,

    #[serde(default)]
    pub required_link_categories: BTreeSet<String>,

    #[serde(default)]
    pub recipient: Option<AddressRule>,
}

impl ExpectedTemplate {
    pub fn new(name: impl Into<String>, subject_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject_pattern: subject_pattern.into(),
            subject_is_regex: false,
            expected_sender: None,
            required_link_categories: BTreeSet::new(),
            recipient: None,
        }
    }

    pub fn regex_subject(mut self) -> Self {
        self.subject_is_regex = true;
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.expected_sender = Some(sender.into());
        self
    }

    pub fn require_link(mut self, category: impl Into<String>) -> Self {
        self.required_link_categories.insert(category.into());
        self
    }

    pub fn recipient_rule(mut self, rule: AddressRule) -> Self {
        self.recipient = Some(rule);
        self
    }

    /// Build the subject matcher for a concrete set of placeholder values
    pub fn subject_matcher(&self, values: &Placeholders) -> Result<SubjectMatcher> {
        if self.subject_is_regex {
            let rendered = render_regex(&self.subject_pattern, values)?;
            Ok(SubjectMatcher::Pattern(Regex::new(&rendered)?))
        } else {
            Ok(SubjectMatcher::Exact(render(&self.subject_pattern, values)?))
        }
    }
}

/// Rendered subject expectation
#[derive(Debug, Clone)]
pub enum SubjectMatcher {
    Exact(String),
    Pattern(Regex),
}

impl SubjectMatcher {
    pub fn matches(&self, subject: &str) -> bool {
        match self {
            SubjectMatcher::Exact(expected) => subject.trim() == expected.trim(),
            SubjectMatcher::Pattern(re) => re.is_match(subject.trim()),
        }
    }
}

impl fmt::Display for SubjectMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectMatcher::Exact(s) => write!(f, "subject \"{}\"", s),
            SubjectMatcher::Pattern(re) => write!(f, "subject =~ /{}/", re.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    templates: Vec<ExpectedTemplate>,
}

/// Templates indexed by notification type name
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, ExpectedTemplate>,
}

impl TemplateCatalog {
    /// Catalog shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let mut templates = BTreeMap::new();
        for template in file.templates {
            if templates.contains_key(&template.name) {
                return Err(Error::InvalidConfiguration(format!(
                    "template '{}' defined twice",
                    template.name
                )));
            }
            templates.insert(template.name.clone(), template);
        }
        Ok(Self { templates })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn get(&self, name: &str) -> Result<&ExpectedTemplate> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }

    pub fn insert(&mut self, template: ExpectedTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpectedTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
