//! Parsers for the class, style and prop mini-languages.
//!
//! Each mutator takes a [`Change`] of `add`/`remove`/`replace` strings. All
//! three strings are parsed before anything is computed, so a parse error never
//! leaves a half-applied mutation behind.

use indexmap::IndexMap;
use serde_json::Value;

use super::tokenizer::{tokenize, PropToken};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// A modification request in one of the mini-languages.
///
/// `replace` discards all prior values first, `remove` deletes the named
/// entries, `add` merges. A bare `&str` converts to an `add` change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Change<'a> {
    pub add: Option<&'a str>,
    pub remove: Option<&'a str>,
    pub replace: Option<&'a str>,
}

impl<'a> Change<'a> {
    /// A change that only adds.
    pub fn add(input: &'a str) -> Self {
        Self {
            add: Some(input),
            ..Self::default()
        }
    }

    /// A change that only removes.
    pub fn remove(input: &'a str) -> Self {
        Self {
            remove: Some(input),
            ..Self::default()
        }
    }

    /// A change that replaces everything.
    pub fn replace(input: &'a str) -> Self {
        Self {
            replace: Some(input),
            ..Self::default()
        }
    }

    /// Also remove these entries (builder).
    pub fn and_remove(mut self, input: &'a str) -> Self {
        self.remove = Some(input);
        self
    }

    /// Also add these entries (builder).
    pub fn and_add(mut self, input: &'a str) -> Self {
        self.add = Some(input);
        self
    }
}

impl<'a> From<&'a str> for Change<'a> {
    fn from(input: &'a str) -> Self {
        Self::add(input)
    }
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

/// Split a class string on whitespace.
///
/// Quotes, `;`, `=`, `{` and `}` never appear in a class name and are rejected.
pub fn parse_classes(input: &str) -> Result<Vec<String>> {
    input
        .split_whitespace()
        .map(|token| {
            if token.contains(['"', '\'', ';', '=', '{', '}']) {
                Err(Error::parse(input, token, "invalid class name"))
            } else {
                Ok(token.to_owned())
            }
        })
        .collect()
}

/// Compute the class list after applying `change` to `current`.
///
/// Duplicates are dropped keeping the first occurrence.
pub fn apply_classes(current: &[String], change: &Change<'_>) -> Result<Vec<String>> {
    let remove = parse_classes(change.remove.unwrap_or_default())?;
    let add = parse_classes(change.add.unwrap_or_default())?;
    let replace = change.replace.map(parse_classes).transpose()?;

    let base: &[String] = if replace.is_some() { &[] } else { current };
    let mut result: Vec<String> = Vec::with_capacity(base.len() + add.len());
    let candidates = base
        .iter()
        .filter(|c| !remove.contains(*c))
        .chain(add.iter())
        .chain(replace.iter().flatten());
    for class in candidates {
        if !result.contains(class) {
            result.push(class.clone());
        }
    }
    Ok(result)
}

/// Render a class list back into its mini-language form.
pub fn classes_to_string(classes: &[String]) -> String {
    classes.join(" ")
}

// ---------------------------------------------------------------------------
// Style
// ---------------------------------------------------------------------------

/// Parse `key: value; key: value` into an ordered map.
pub fn parse_style(input: &str) -> Result<IndexMap<String, String>> {
    let mut result = IndexMap::new();
    for word in input.split(';') {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        let (key, value) = word
            .split_once(':')
            .ok_or_else(|| Error::parse(input, word, "expected `key: value`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::parse(input, word, "empty style name"));
        }
        result.insert(key.to_owned(), value.trim().to_owned());
    }
    Ok(result)
}

/// Compute the style map after applying `change` to `current`.
pub fn apply_style(
    current: &IndexMap<String, String>,
    change: &Change<'_>,
) -> Result<IndexMap<String, String>> {
    let remove = parse_style(change.remove.unwrap_or_default())?;
    let add = parse_style(change.add.unwrap_or_default())?;
    let replace = change.replace.map(parse_style).transpose()?;

    let mut result = if replace.is_some() {
        IndexMap::new()
    } else {
        current.clone()
    };
    for key in remove.keys() {
        result.shift_remove(key);
    }
    result.extend(add);
    result.extend(replace.into_iter().flatten());
    Ok(result)
}

/// Render a style map back into its mini-language form.
pub fn style_to_string(style: &IndexMap<String, String>) -> String {
    style
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

fn is_prop_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Parse `flag key=value key="quoted value"` into an ordered map.
///
/// A bare key is the boolean flag `true`, a bare value is its literal string,
/// and a quoted value is decoded as a JSON string.
pub fn parse_props(input: &str) -> Result<IndexMap<String, Value>> {
    let tokens = tokenize(input);
    let mut result = IndexMap::new();
    let mut cursor = 0;

    while let Some(key) = tokens.get(cursor) {
        match key.token {
            Some(PropToken::Word) if is_prop_name(&key.text) => {}
            Some(PropToken::Word) => {
                return Err(Error::parse(input, &key.text, "invalid prop name"))
            }
            Some(PropToken::Eq) => return Err(Error::parse(input, &key.text, "missing prop name")),
            Some(PropToken::Quoted) => {
                return Err(Error::parse(input, &key.text, "quoted value without a prop name"))
            }
            Some(PropToken::Unterminated) => {
                return Err(Error::parse(input, &key.text, "unterminated quote"))
            }
            None => return Err(Error::parse(input, &key.text, "unexpected character")),
        }
        cursor += 1;

        let eq = match tokens.get(cursor) {
            Some(eq) if eq.token == Some(PropToken::Eq) => eq,
            _ => {
                result.insert(key.text.clone(), Value::Bool(true));
                continue;
            }
        };
        if eq.start != key.end {
            return Err(Error::parse(input, &eq.text, "whitespace before `=`"));
        }
        cursor += 1;

        let value = tokens
            .get(cursor)
            .ok_or_else(|| Error::parse(input, &format!("{}=", key.text), "missing value"))?;
        if value.start != eq.end {
            return Err(Error::parse(input, &value.text, "whitespace after `=`"));
        }
        let decoded = match value.token {
            Some(PropToken::Word) => Value::String(value.text.clone()),
            Some(PropToken::Quoted) => {
                serde_json::from_str::<Value>(&value.text).map_err(|e| {
                    Error::parse(input, &value.text, format!("invalid quoted value: {e}"))
                })?
            }
            Some(PropToken::Unterminated) => {
                return Err(Error::parse(input, &value.text, "unterminated quote"))
            }
            Some(PropToken::Eq) | None => {
                return Err(Error::parse(input, &value.text, "unexpected value"))
            }
        };
        cursor += 1;
        result.insert(key.text.clone(), decoded);
    }

    Ok(result)
}

/// Compute the prop map after applying `change` to `current`.
pub fn apply_props(
    current: &IndexMap<String, Value>,
    change: &Change<'_>,
) -> Result<IndexMap<String, Value>> {
    let remove = parse_props(change.remove.unwrap_or_default())?;
    let add = parse_props(change.add.unwrap_or_default())?;
    let replace = change.replace.map(parse_props).transpose()?;

    let mut result = if replace.is_some() {
        IndexMap::new()
    } else {
        current.clone()
    };
    for key in remove.keys() {
        result.shift_remove(key);
    }
    result.extend(add);
    result.extend(replace.into_iter().flatten());
    Ok(result)
}

fn is_bare_value(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || "_-.%:/".contains(c))
}

/// Render a prop map back into its mini-language form.
///
/// `true` becomes a bare flag; `false` and `null` props are left out because the
/// mini-language cannot express them. Non-string values are written as quoted
/// JSON text.
pub fn props_to_string(props: &IndexMap<String, Value>) -> String {
    props
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Bool(true) => Some(key.clone()),
            Value::Bool(false) | Value::Null => None,
            Value::String(s) if is_bare_value(s) => Some(format!("{key}={s}")),
            Value::String(s) => Some(format!("{key}={}", Value::String(s.clone()))),
            other => Some(format!("{key}={}", Value::String(other.to_string()))),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
