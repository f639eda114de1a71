//! Compilation parameters and their signature
//!
//! Parameters are named values handed to a script at compile and evaluation
//! time. The *signature* only covers the set of `(name, type)` pairs, so the
//! values may change freely between runs while a cached artifact stays valid.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::digest::{digest_str, Algorithm};

/// Name of the implicit parameter carrying the run arguments of an evaluation
pub const RUN_ARGS: &str = "run_args";

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Json(serde_json::Value),
}

impl ParamValue {
    /// Semantic type tag used in the signature and the human-readable description
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
            ParamValue::List(_) => "list",
            ParamValue::Json(_) => "json",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::List(v) => f.write_str(&v.join(",")),
            ParamValue::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered set of compilation parameters plus the run arguments of one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptParameters {
    values: IndexMap<String, ParamValue>,
    run_args: Vec<String>,
}

impl ScriptParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter, keeping the original position on replace
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_run_args(mut self, args: Vec<String>) -> Self {
        self.run_args = args;
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn run_args(&self) -> &[String] {
        &self.run_args
    }

    /// Number of declared parameters, including the implicit run arguments
    pub fn count(&self) -> u32 {
        self.declared().count() as u32
    }

    /// `name: type` pairs in declaration order, run arguments last
    pub fn description(&self) -> String {
        self.declared()
            .map(|(name, ty)| format!("{name}: {ty}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Digest of the `(name, type)` set, independent of declaration order and values
    pub fn signature(&self, algorithm: Algorithm) -> String {
        let mut pairs: Vec<String> = self
            .declared()
            .map(|(name, ty)| format!("{name}:{ty}"))
            .collect();
        pairs.sort();
        digest_str(&pairs.join("\n"), algorithm)
    }

    fn declared(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.values
            .iter()
            .filter(|(name, _)| name.as_str() != RUN_ARGS)
            .map(|(name, value)| (name.as_str(), value.type_name()))
            .chain(std::iter::once((RUN_ARGS, "list")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_ignores_order_and_values() {
        let a = ScriptParameters::new()
            .with("player", ParamValue::Text("steve".into()))
            .with("level", ParamValue::Int(3));
        let b = ScriptParameters::new()
            .with("level", ParamValue::Int(99))
            .with("player", ParamValue::Text("alex".into()))
            .with_run_args(vec!["--fast".into()]);

        assert_eq!(a.signature(Algorithm::Sha256), b.signature(Algorithm::Sha256));
    }

    #[test]
    fn test_signature_changes_with_type() {
        let a = ScriptParameters::new().with("level", ParamValue::Int(3));
        let b = ScriptParameters::new().with("level", ParamValue::Text("3".into()));
        assert_ne!(a.signature(Algorithm::Sha256), b.signature(Algorithm::Sha256));
    }

    #[test]
    fn test_signature_changes_with_added_parameter() {
        let a = ScriptParameters::new();
        let b = ScriptParameters::new().with("debug", ParamValue::Bool(true));
        assert_ne!(a.signature(Algorithm::Sha256), b.signature(Algorithm::Sha256));
    }

    #[test]
    fn test_description_and_count() {
        let params = ScriptParameters::new()
            .with("player", ParamValue::Text("steve".into()))
            .with("level", ParamValue::Int(3));
        assert_eq!(params.count(), 3);
        assert_eq!(
            params.description(),
            "player: text, level: int, run_args: list"
        );
        assert_eq!(ScriptParameters::new().description(), "run_args: list");
    }
}
