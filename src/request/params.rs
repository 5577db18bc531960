//! Typed access to the loosely typed parameter object of a batch item.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::ops::RangeInclusive;

/// Whole floats that fit an `i64`; `i64::MAX as f64` is 2^63, one past the end.
fn is_whole_i64(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Key under which optional fields may be grouped.
pub const ADDITIONAL_OPTIONS: &str = "additionalOptions";

/// Read-only view over an item's parameters.
///
/// Lookups check the top level first and then the nested
/// `additionalOptions` object. `null` and the empty string count as absent.
#[derive(Debug, Clone, Copy)]
pub struct ParamMap<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> ParamMap<'a> {
    pub fn new(values: &'a Map<String, Value>) -> Self {
        Self { values }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        let values = self.values;
        let nested = values
            .get(ADDITIONAL_OPTIONS)
            .and_then(Value::as_object)
            .and_then(|options| options.get(name));

        values
            .get(name)
            .filter(|v| is_present(v))
            .or_else(|| nested.filter(|v| is_present(v)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Optional string; numbers are accepted and rendered in their JSON form.
    pub fn string(&self, name: &str) -> Result<Option<String>> {
        match self.lookup(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(Error::invalid(
                name,
                format!("expected a string, got {}", type_name(other)),
            )),
        }
    }

    pub fn required_string(&self, name: &str) -> Result<String> {
        self.string(name)?
            .ok_or_else(|| Error::MissingRequiredParameter(name.to_string()))
    }

    pub fn string_or(&self, name: &str, default: &str) -> Result<String> {
        Ok(self.string(name)?.unwrap_or_else(|| default.to_string()))
    }

    /// String restricted to `allowed`, falling back to `default` when absent.
    pub fn choice(&self, name: &str, allowed: &[&str], default: &str) -> Result<String> {
        let value = self.string_or(name, default)?;
        if allowed.contains(&value.as_str()) {
            Ok(value)
        } else {
            Err(Error::invalid(
                name,
                format!("'{}' is not one of {}", value, allowed.join(", ")),
            ))
        }
    }

    pub fn number(&self, name: &str, range: RangeInclusive<f64>) -> Result<Option<f64>> {
        let value = match self.lookup(name) {
            None => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        }
        .ok_or_else(|| Error::invalid(name, "expected a number"))?;

        if !range.contains(&value) {
            return Err(Error::invalid(
                name,
                format!(
                    "{} is outside the range {}..={}",
                    value,
                    range.start(),
                    range.end()
                ),
            ));
        }
        Ok(Some(value))
    }

    pub fn integer(&self, name: &str, range: RangeInclusive<i64>) -> Result<Option<i64>> {
        let value = match self.lookup(name) {
            None => return Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| is_whole_i64(*f)).map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(_) => None,
        }
        .ok_or_else(|| Error::invalid(name, "expected an integer"))?;

        if !range.contains(&value) {
            return Err(Error::invalid(
                name,
                format!(
                    "{} is outside the range {}..={}",
                    value,
                    range.start(),
                    range.end()
                ),
            ));
        }
        Ok(Some(value))
    }

    pub fn required_integer(&self, name: &str, range: RangeInclusive<i64>) -> Result<i64> {
        self.integer(name, range)?
            .ok_or_else(|| Error::MissingRequiredParameter(name.to_string()))
    }

    /// Nested parameter object. An empty object counts as absent.
    pub fn object(&self, name: &str) -> Result<Option<ParamMap<'a>>> {
        match self.lookup(name) {
            None => Ok(None),
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(Value::Object(map)) => Ok(Some(ParamMap::new(map))),
            Some(other) => Err(Error::invalid(
                name,
                format!("expected an object, got {}", type_name(other)),
            )),
        }
    }

    pub fn required_object(&self, name: &str) -> Result<ParamMap<'a>> {
        self.object(name)?
            .ok_or_else(|| Error::MissingRequiredParameter(name.to_string()))
    }

    /// First present string among `names`, checked in the given order.
    pub fn first_string(&self, names: &[&str]) -> Result<Option<String>> {
        for name in names {
            if let Some(value) = self.string(name)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
