//! Field descriptors and extracted values.
//!
//! A descriptor says where a datum lives on a source page and how to clean it
//! up. Descriptors are fixed at configuration time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One structured item, e.g. a table row keyed by column name.
pub type Item = BTreeMap<String, String>;

/// One table cell read into a named key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Zero-based index among the row's `td` cells
    pub cell: usize,
    /// Reduce the cell to its first number
    #[serde(default)]
    pub digits: bool,
}

impl Column {
    pub fn text(name: &str, cell: usize) -> Self {
        Self {
            name: name.to_string(),
            cell,
            digits: false,
        }
    }

    pub fn number(name: &str, cell: usize) -> Self {
        Self {
            digits: true,
            ..Self::text(name, cell)
        }
    }
}

/// Post-processing applied to the matched text of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Keep the first number in the text, with separators removed.
    Digits,
    /// Take the first match longer than `min_chars` characters.
    FirstLongerThan { min_chars: usize },
    /// Collect up to `max_items` matches longer than `min_chars` characters.
    List { max_items: usize, min_chars: usize },
    /// Drop footnote markers such as `[1]` or `[a]`.
    StripFootnotes,
    /// Read up to `max_items` table rows into items. Rows without enough
    /// `td` cells (header rows) are skipped; the first column must be
    /// non-empty. `constants` are copied into every item.
    Rows {
        max_items: usize,
        columns: Vec<Column>,
        #[serde(default)]
        constants: BTreeMap<String, String>,
    },
}

/// Where one field lives on a source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name, unique across all sources
    pub name: String,
    /// CSS selector evaluated against the whole document
    pub selector: String,
    /// Keep only matches whose first `th` contains this text (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Sub-selector evaluated inside each match to locate the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Post-processing; without one the first match's text is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            label: None,
            value: None,
            rule: None,
        }
    }

    /// Match an infobox-style row by its header label and read its `td`.
    pub fn row(name: impl Into<String>, selector: impl Into<String>, label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            value: Some("td".to_string()),
            ..Self::new(name, selector)
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// A final value for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Records(Vec<Item>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Item]> {
        match self {
            FieldValue::Records(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::List(items) => f.write_str(&items.join("; ")),
            FieldValue::Records(items) => write!(f, "{} rows", items.len()),
        }
    }
}
