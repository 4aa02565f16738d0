//! Placeholder substitution for weight and space name templates.
//!
//! The grammar is fixed: `$$` is a literal dollar sign, `$ident` and
//! `${ident}` are placeholders, where `ident` is `[_a-z][_a-z0-9]*`
//! optionally followed by `+1` or `-1`. The arithmetic suffix is part of the
//! key, so `layer_index+1` is looked up as-is in the table. Anything else
//! after a `$` is malformed.

use std::{borrow::Cow, collections::BTreeMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\$(?:(?P<escaped>\$)|(?P<named>[_a-z][_a-z0-9]*(?:[+-]1)?)|\{(?P<braced>[_a-z][_a-z0-9]*(?:[+-]1)?)\}|(?P<invalid>))",
    )
    .expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Splits a template into literal text and placeholder keys.
pub fn tokenize(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        if whole.start > last {
            segments.push(Segment::Literal(&template[last..whole.start]));
        }
        if caps.name("escaped").is_some() {
            segments.push(Segment::Literal("$"));
        } else if let Some(key) = caps.name("named").or_else(|| caps.name("braced")) {
            segments.push(Segment::Placeholder(key.as_str()));
        } else {
            return Err(Error::template(
                template,
                format!("invalid placeholder at byte {}", whole.start),
            ));
        }
        last = whole.end;
    }
    if last < template.len() {
        segments.push(Segment::Literal(&template[last..]));
    }
    Ok(segments)
}

/// Checks template syntax without resolving anything.
pub fn validate(template: &str) -> Result<()> {
    tokenize(template).map(|_| ())
}

/// Values available to a substitution: `num_layers` always, `layer_index`
/// only when instantiating a layer template. Both come with their `+1` and
/// `-1` neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitutions {
    values: BTreeMap<String, i64>,
}

impl Substitutions {
    pub fn new(num_layers: usize) -> Result<Self> {
        let mut table = Self {
            values: BTreeMap::new(),
        };
        table.insert_with_neighbours("num_layers", num_layers)?;
        Ok(table)
    }

    pub fn for_layer(num_layers: usize, layer_index: usize) -> Result<Self> {
        let mut table = Self::new(num_layers)?;
        table.insert_with_neighbours("layer_index", layer_index)?;
        Ok(table)
    }

    /// Values and both neighbours must fit in an `i64`.
    fn insert_with_neighbours(&mut self, key: &str, value: usize) -> Result<()> {
        let out_of_range =
            || Error::Configuration(format!("{} value {} is out of range", key, value));
        let value = i64::try_from(value).map_err(|_| out_of_range())?;
        let next = value.checked_add(1).ok_or_else(out_of_range)?;
        self.values.insert(key.to_owned(), value);
        self.values.insert(format!("{}+1", key), next);
        self.values.insert(format!("{}-1", key), value - 1);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.values.get(key).copied()
    }

    /// Replaces every placeholder in `template`. Strings without a `$` are
    /// returned borrowed.
    pub fn apply<'a>(&self, template: &'a str) -> Result<Cow<'a, str>> {
        if !template.contains('$') {
            return Ok(Cow::Borrowed(template));
        }
        let mut out = String::with_capacity(template.len());
        for segment in tokenize(template)? {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => {
                    let value = self.get(key).ok_or_else(|| {
                        Error::template(template, format!("no value for placeholder {}", key))
                    })?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(Cow::Owned(out))
    }

    pub fn apply_owned(&self, template: &str) -> Result<String> {
        self.apply(template).map(Cow::into_owned)
    }
}

/// Implemented by descriptors whose string fields may hold placeholders.
pub trait Substitute: Sized {
    fn substitute(&self, table: &Substitutions) -> Result<Self>;

    /// Every raw template string carried by the descriptor.
    fn templates(&self) -> Vec<&str>;
}
