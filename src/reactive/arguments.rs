//! Call arguments for refreshable functions and their binding rules.
//!
//! A refreshable function declares its parameter names. [`Arguments`] are
//! bound against that list the way a call site would: positional values fill
//! parameters in order, keyword values fill parameters by name, and a
//! parameter may not receive both.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Positional and keyword values for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    /// Values filling parameters in declaration order.
    pub positional: Vec<Value>,
    /// Values filling parameters by name.
    pub keyword: IndexMap<String, Value>,
}

impl Arguments {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional value (builder).
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword value (builder).
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Whether neither positional nor keyword values are present.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Combine recorded arguments with the ones passed to a refresh.
    ///
    /// Non-empty new positional values replace the old ones wholesale;
    /// keyword values are merged, new ones winning.
    pub fn merged(&self, update: &Arguments) -> Arguments {
        let positional = if update.positional.is_empty() {
            self.positional.clone()
        } else {
            update.positional.clone()
        };
        let mut keyword = self.keyword.clone();
        keyword.extend(update.keyword.iter().map(|(k, v)| (k.clone(), v.clone())));
        Arguments {
            positional,
            keyword,
        }
    }

    /// Bind against the declared parameter names of `function`.
    ///
    /// Parameters that receive no value are simply absent from the result.
    pub fn bind(&self, function: &str, params: &[String]) -> Result<BoundArguments> {
        let binding_error = |message: String| Error::Binding {
            function: function.to_owned(),
            message,
        };
        if self.positional.len() > params.len() {
            return Err(binding_error(format!(
                "{function}() takes {} positional arguments but {} were given",
                params.len(),
                self.positional.len()
            )));
        }
        for name in self.keyword.keys() {
            let Some(index) = params.iter().position(|p| p == name) else {
                return Err(binding_error(format!(
                    "{function}() got an unexpected keyword argument '{name}'"
                )));
            };
            if index < self.positional.len() {
                return Err(binding_error(format!(
                    "'{name}' needs to be consistently passed to {function}() \
                     either as positional or as keyword argument"
                )));
            }
        }
        // Declaration order regardless of how values were passed.
        let values = params
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                self.positional
                    .get(index)
                    .or_else(|| self.keyword.get(name))
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Ok(BoundArguments { values })
    }
}

// ---------------------------------------------------------------------------
// BoundArguments
// ---------------------------------------------------------------------------

/// Parameter name → value after binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    values: IndexMap<String, Value>,
}

impl BoundArguments {
    /// The raw value of a parameter, if it was passed.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Decode a parameter into a concrete type.
    ///
    /// A parameter that was not passed decodes from `null`, so `Option<T>`
    /// yields `None` for it.
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.values.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|err| Error::handler(format!("argument '{name}': {err}")))
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate `(name, value)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
