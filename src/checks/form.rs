//! Login form scanning.
//!
//! Pages are scanned with regular expressions rather than a DOM parser: the
//! only things needed are `<input>` attributes and a couple of `<meta>` tags.

use regex::Regex;
use std::sync::OnceLock;

/// Hidden fields echoed back on submit when present.
pub const ANTI_FORGERY_FIELDS: &[&str] = &[
    "__VIEWSTATE",
    "__VIEWSTATEGENERATOR",
    "__EVENTVALIDATION",
    "__RequestVerificationToken",
    "csrf_token",
    "csrfmiddlewaretoken",
    "_csrf",
    "_token",
    "authenticity_token",
];

/// `<meta name=...>` tags carrying a token, with the field it is posted as.
const META_TOKENS: &[(&str, &str)] = &[("csrf-token", "_token"), ("_csrf", "_csrf")];

/// One `<input>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    /// Lower-cased `type` attribute, `"text"` when absent
    pub input_type: String,
}

fn input_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<input\b[^>]*>").expect("input pattern is valid"))
}

fn meta_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern is valid"))
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)(?:^|\s)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("attribute pattern is valid")
    })
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    // Skip the tag name so `<input` is not read as an attribute
    let body = tag.find(char::is_whitespace).map(|i| &tag[i..])?;
    attribute_pattern().captures_iter(body).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        Some(decode_entities(value))
    })
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#43;", "+")
        .replace("&#x2B;", "+")
        .replace("&#47;", "/")
        .replace("&#x2F;", "/")
        .replace("&#61;", "=")
        .replace("&#x3D;", "=")
        .replace("&amp;", "&")
}

/// All named `<input>` elements in document order.
pub fn parse_inputs(html: &str) -> Vec<FormField> {
    input_pattern()
        .find_iter(html)
        .filter_map(|m| {
            let tag = m.as_str();
            let name = attribute(tag, "name").filter(|n| !n.is_empty())?;
            Some(FormField {
                name,
                value: attribute(tag, "value").unwrap_or_default(),
                input_type: attribute(tag, "type")
                    .map(|t| t.to_ascii_lowercase())
                    .unwrap_or_else(|| "text".to_string()),
            })
        })
        .collect()
}

/// Anti-forgery tokens to send back with the login form.
///
/// Input fields come first in document order, then tokens only exposed via
/// `<meta>` tags. A name already present as an input is not repeated.
pub fn anti_forgery_tokens(html: &str, inputs: &[FormField]) -> Vec<(String, String)> {
    let mut tokens: Vec<(String, String)> = inputs
        .iter()
        .filter(|field| ANTI_FORGERY_FIELDS.contains(&field.name.as_str()))
        .map(|field| (field.name.clone(), field.value.clone()))
        .collect();

    for tag in meta_pattern().find_iter(html) {
        let Some(meta_name) = attribute(tag.as_str(), "name") else {
            continue;
        };
        let Some((_, field)) = META_TOKENS
            .iter()
            .find(|(meta, _)| meta.eq_ignore_ascii_case(&meta_name))
        else {
            continue;
        };
        let Some(content) = attribute(tag.as_str(), "content") else {
            continue;
        };
        if !tokens.iter().any(|(name, _)| name == field) {
            tokens.push((field.to_string(), content));
        }
    }
    tokens
}

/// How a field matcher recognizes an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatcher {
    /// `type` attribute equals the value
    Type(String),
    /// Name contains the fragment, case-insensitive
    NameContains(String),
}

impl FieldMatcher {
    pub fn name_contains(fragment: &str) -> Self {
        FieldMatcher::NameContains(fragment.to_ascii_lowercase())
    }

    pub fn input_type(input_type: &str) -> Self {
        FieldMatcher::Type(input_type.to_ascii_lowercase())
    }

    fn matches(&self, field: &FormField) -> bool {
        match self {
            FieldMatcher::Type(t) => field.input_type == *t,
            FieldMatcher::NameContains(fragment) => {
                field.name.to_ascii_lowercase().contains(fragment.as_str())
            }
        }
    }
}

/// Field names that will carry the credentials, plus an optional submit pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFields {
    pub username: String,
    pub password: String,
    pub submit: Option<(String, String)>,
}

/// Result of scanning a login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Detected(LoginFields),
    /// Detection failed for at least one credential field; defaults were used
    Fallback(LoginFields),
}

impl Detection {
    pub fn fields(&self) -> &LoginFields {
        match self {
            Detection::Detected(fields) | Detection::Fallback(fields) => fields,
        }
    }

    pub fn into_fields(self) -> LoginFields {
        match self {
            Detection::Detected(fields) | Detection::Fallback(fields) => fields,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Detection::Fallback(_))
    }
}

/// Ordered matchers for each role. The first matcher that finds a candidate
/// wins, and within a matcher the first candidate in document order.
#[derive(Debug, Clone)]
pub struct LoginFormDetector {
    username: Vec<FieldMatcher>,
    password: Vec<FieldMatcher>,
    submit: Vec<FieldMatcher>,
    fallback_username: String,
    fallback_password: String,
}

impl Default for LoginFormDetector {
    fn default() -> Self {
        Self {
            username: vec![
                FieldMatcher::name_contains("user"),
                FieldMatcher::name_contains("usuario"),
                FieldMatcher::name_contains("login"),
                FieldMatcher::input_type("email"),
                FieldMatcher::name_contains("email"),
            ],
            password: vec![
                FieldMatcher::input_type("password"),
                FieldMatcher::name_contains("pass"),
                FieldMatcher::name_contains("pwd"),
                FieldMatcher::name_contains("clave"),
            ],
            submit: vec![
                FieldMatcher::name_contains("btn"),
                FieldMatcher::name_contains("submit"),
                FieldMatcher::name_contains("entrar"),
                FieldMatcher::name_contains("login"),
            ],
            fallback_username: "username".to_string(),
            fallback_password: "password".to_string(),
        }
    }
}

impl LoginFormDetector {
    pub fn new(
        username: Vec<FieldMatcher>,
        password: Vec<FieldMatcher>,
        submit: Vec<FieldMatcher>,
    ) -> Self {
        Self {
            username,
            password,
            submit,
            ..Default::default()
        }
    }

    /// Field names used when detection finds nothing.
    pub fn with_fallback(mut self, username: &str, password: &str) -> Self {
        self.fallback_username = username.to_string();
        self.fallback_password = password.to_string();
        self
    }

    pub fn detect(&self, inputs: &[FormField]) -> Detection {
        let username = first_match(&self.username, inputs, |f| {
            matches!(f.input_type.as_str(), "text" | "email" | "tel" | "")
        });
        let password = first_match(&self.password, inputs, |f| {
            matches!(f.input_type.as_str(), "password" | "text" | "")
        });
        let submit = first_match(&self.submit, inputs, |f| {
            matches!(f.input_type.as_str(), "submit" | "button" | "image")
        })
        .map(|f| (f.name.clone(), f.value.clone()));

        match (username, password) {
            (Some(user), Some(pass)) if user.name != pass.name => {
                Detection::Detected(LoginFields {
                    username: user.name.clone(),
                    password: pass.name.clone(),
                    submit,
                })
            }
            (user, pass) => Detection::Fallback(LoginFields {
                username: user
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| self.fallback_username.clone()),
                password: pass
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| self.fallback_password.clone()),
                submit,
            }),
        }
    }
}

fn first_match<'a>(
    matchers: &[FieldMatcher],
    inputs: &'a [FormField],
    eligible: impl Fn(&FormField) -> bool,
) -> Option<&'a FormField> {
    matchers.iter().find_map(|matcher| {
        inputs
            .iter()
            .filter(|field| eligible(field))
            .find(|field| matcher.matches(field))
    })
}
