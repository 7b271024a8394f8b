use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ParseError;

/// AND-combined key to allowed-values constraints. Also used for a
/// source's filter data, where each key maps to the values the source
/// carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterMap {
    attributes: BTreeMap<String, Vec<String>>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing any previous values for `key`.
    pub fn with<K, I, V>(mut self, key: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(key, values);
        self
    }

    pub fn insert<K, I, V>(&mut self, key: K, values: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(key.into(), values.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.attributes.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.attributes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn parse(json: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    /// Reads `{"key": ["v1", "v2"], ...}`. Any non-object, non-array or
    /// non-string member is rejected.
    pub fn from_json_value(value: &Value) -> Result<Self, ParseError> {
        let object = value.as_object().ok_or_else(|| {
            ParseError::MalformedFilter(format!("expected object, got {value}"))
        })?;

        let mut map = Self::new();
        for (key, values) in object {
            let values = values.as_array().ok_or_else(|| {
                ParseError::MalformedFilter(format!(
                    "values for {key:?} must be an array"
                ))
            })?;
            let values = values
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        ParseError::MalformedFilter(format!(
                            "value {v} for {key:?} is not a string"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            map.attributes.insert(key.clone(), values);
        }
        Ok(map)
    }
}

/// A trigger-side filter clause: an OR-combined list of filter maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterSet {
    /// The clause was absent. Imposes no constraint.
    #[default]
    Unconstrained,

    /// Alternatives, any of which may match. An empty list imposes no
    /// constraint.
    AnyOf(Vec<FilterMap>),

    /// The clause was present but could not be parsed. Never passes.
    Malformed,
}

impl FilterSet {
    pub fn single(map: FilterMap) -> Self {
        Self::AnyOf(vec![map])
    }

    /// Parses either a single filter map or an array of filter maps.
    pub fn parse(json: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self, ParseError> {
        match value {
            Value::Null => Ok(Self::Unconstrained),
            Value::Object(_) => {
                Ok(Self::single(FilterMap::from_json_value(value)?))
            }
            Value::Array(maps) => maps
                .iter()
                .map(FilterMap::from_json_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::AnyOf),
            other => Err(ParseError::MalformedFilter(format!(
                "expected object or array, got {other}"
            ))),
        }
    }

    /// Parses a clause at the trigger boundary. A clause that fails to
    /// parse becomes [`FilterSet::Malformed`] so that it fails closed.
    pub fn parse_lenient(json: &str) -> Self {
        Self::parse(json).unwrap_or_else(|err| {
            warn!("Treating unparsable filter clause as non-matching: {err}");
            Self::Malformed
        })
    }

    /// Same as [`FilterSet::parse_lenient`] for a clause embedded in a
    /// larger JSON document. A missing clause is unconstrained.
    pub fn from_json_value_lenient(value: Option<&Value>) -> Self {
        match value {
            None => Self::Unconstrained,
            Some(value) => Self::from_json_value(value).unwrap_or_else(|err| {
                warn!(
                    "Treating unparsable filter clause as non-matching: {err}"
                );
                Self::Malformed
            }),
        }
    }
}
