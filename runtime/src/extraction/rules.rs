// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Extraction rules, value transforms, and extracted values.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// How to read one field from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRule {
    pub field: String,
    pub selector: String,
    /// Read this attribute instead of text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub required: bool,
}

impl ExtractionRule {
    pub fn text(field: &str, selector: &str) -> Self {
        Self {
            field: field.to_string(),
            selector: selector.to_string(),
            attribute: None,
            transform: None,
            multiple: false,
            required: false,
        }
    }

    pub fn attr(field: &str, selector: &str, attribute: &str) -> Self {
        Self {
            attribute: Some(attribute.to_string()),
            ..Self::text(field, selector)
        }
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Closed set of value transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    Trim,
    /// Resolve against the site base URL.
    AbsoluteUrl,
    /// Split on commas into trimmed, non-empty parts.
    CommaSplit,
    StripTags,
}

impl Transform {
    /// Apply to one raw value. `CommaSplit` may yield several values; the
    /// others yield at most one.
    pub fn apply(self, raw: &str, base_url: &str) -> Vec<String> {
        match self {
            Transform::Trim => vec![raw.trim().to_string()],
            Transform::AbsoluteUrl => normalize_url(base_url, raw).into_iter().collect(),
            Transform::CommaSplit => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            Transform::StripTags => vec![strip_tags(raw).trim().to_string()],
        }
    }
}

/// An extracted value: one string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(t) => t.trim().is_empty(),
            FieldValue::List(l) => l.is_empty(),
        }
    }

    /// Scalar view: the text, or the first list element.
    pub fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(t) if !t.trim().is_empty() => Some(t),
            FieldValue::Text(_) => None,
            FieldValue::List(l) => l.into_iter().find(|v| !v.trim().is_empty()),
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            FieldValue::Text(t) if t.trim().is_empty() => Vec::new(),
            FieldValue::Text(t) => vec![t],
            FieldValue::List(l) => l,
        }
    }
}

/// Make `raw` absolute against `base_url`.
///
/// `http…` is kept, `//host` gains `https:`, `/path` is appended to the base,
/// anything else gains `https://`. Blank input yields `None`.
pub fn normalize_url(base_url: &str, raw: &str) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() {
        return None;
    }
    if url.starts_with("http") {
        Some(url.to_string())
    } else if let Some(rest) = url.strip_prefix("//") {
        Some(format!("https://{rest}"))
    } else if url.starts_with('/') {
        Some(format!("{}{url}", base_url.trim_end_matches('/')))
    } else {
        Some(format!("https://{url}"))
    }
}

pub fn strip_tags(raw: &str) -> String {
    TAGS.replace_all(raw, "").into_owned()
}
