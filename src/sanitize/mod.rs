//! Payload sanitization.
//!
//! Strips script elements, `javascript:` schemes and inline event-handler
//! attributes from every string leaf of a JSON value. The walk uses an
//! explicit stack bounded by depth and node count; `serde_json::Value` is
//! an owned tree, so there are no cycles to chase.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use url::form_urlencoded;

use crate::config::SanitizerConfig;

static SCRIPT_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));
static SCRIPT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?script\b[^>]*>").expect("valid regex"));
static JAVASCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("valid regex"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("payload nested deeper than {max_depth} levels")]
    TooDeep { max_depth: usize },

    #[error("payload has more than {max_nodes} values")]
    TooManyNodes { max_nodes: usize },
}

/// What a sanitize pass touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeReport {
    pub visited: usize,
    pub modified: usize,
}

#[derive(Debug, Clone)]
pub struct PayloadSanitizer {
    max_depth: usize,
    max_nodes: usize,
}

impl Default for PayloadSanitizer {
    fn default() -> Self {
        Self::from_config(&SanitizerConfig::default())
    }
}

impl PayloadSanitizer {
    pub fn new(max_depth: usize, max_nodes: usize) -> Self {
        Self {
            max_depth,
            max_nodes,
        }
    }

    pub fn from_config(config: &SanitizerConfig) -> Self {
        Self::new(config.max_depth, config.max_nodes)
    }

    /// Clean every string leaf in place.
    ///
    /// On error the value may be partially cleaned and must be discarded.
    pub fn sanitize(&self, value: &mut Value) -> Result<SanitizeReport, SanitizeError> {
        let mut report = SanitizeReport::default();
        let mut stack: Vec<(&mut Value, usize)> = vec![(value, 0)];

        while let Some((node, depth)) = stack.pop() {
            if depth > self.max_depth {
                return Err(SanitizeError::TooDeep {
                    max_depth: self.max_depth,
                });
            }
            report.visited += 1;
            if report.visited > self.max_nodes {
                return Err(SanitizeError::TooManyNodes {
                    max_nodes: self.max_nodes,
                });
            }

            match node {
                Value::String(s) => {
                    let cleaned = match clean_str(s) {
                        Cow::Owned(cleaned) => Some(cleaned),
                        Cow::Borrowed(_) => None,
                    };
                    if let Some(cleaned) = cleaned {
                        *s = cleaned;
                        report.modified += 1;
                    }
                }
                Value::Array(items) => {
                    stack.extend(items.iter_mut().map(|v| (v, depth + 1)));
                }
                Value::Object(map) => {
                    stack.extend(map.values_mut().map(|v| (v, depth + 1)));
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => {}
            }
        }

        Ok(report)
    }
}

/// Strip injection patterns from one string, repeating until nothing
/// changes so removed fragments cannot splice into a new match.
/// Borrows when the input is already clean.
pub fn clean_str(input: &str) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(input);
    loop {
        let next = strip_once(&current);
        if next == current.as_ref() {
            return current;
        }
        current = Cow::Owned(next);
    }
}

/// Clean the values of a raw query string. Keys pass through unchanged.
/// Returns `None` when nothing needed cleaning so callers keep the
/// original encoding.
pub fn sanitize_query(query: &str) -> Option<String> {
    let mut dirty = false;
    let pairs: Vec<(Cow<'_, str>, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| {
            let cleaned = clean_str(&value);
            dirty |= matches!(cleaned, Cow::Owned(_));
            (key, cleaned.into_owned())
        })
        .collect();

    if !dirty {
        return None;
    }

    let mut out = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        out.append_pair(key, value);
    }
    Some(out.finish())
}

fn strip_once(input: &str) -> String {
    let s = SCRIPT_ELEMENT.replace_all(input, "");
    let s = SCRIPT_TAG.replace_all(&s, "");
    let s = JAVASCRIPT_SCHEME.replace_all(&s, "");
    EVENT_HANDLER.replace_all(&s, "").into_owned()
}
