use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::AttributeValue;

/// A feature flag definition.
///
/// Flags are supplied by a [`FlagStore`](crate::FlagStore) and treated as read-only snapshots
/// during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub key: String,
    pub enabled: bool,
    /// Served when the flag is off, when a prerequisite fails, when no rule matches, and whenever
    /// a variation index is out of range.
    pub default_value: FlagValue,
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Evaluated in order, first match wins.
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Informational only, the evaluator does not enforce it.
    #[serde(default, rename = "type")]
    pub flag_type: FlagType,
}

impl Flag {
    /// Value of the variant at `index`, or the flag's default value if `index` is out of range.
    pub fn variant_value(&self, index: usize) -> &FlagValue {
        self.variants
            .get(index)
            .map(|variant| &variant.value)
            .unwrap_or(&self.default_value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    #[default]
    Bool,
    String,
    Int,
    Float,
    Json,
}

/// Value a flag can resolve to.
///
/// `FlagValue` is untagged: integers deserialize as [`FlagValue::Int`], other numbers as
/// [`FlagValue::Float`], and objects, arrays and nulls as [`FlagValue::Json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            FlagValue::Json(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            FlagValue::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Integers, and floats without a fractional part that fit into `i64`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FlagValue::Int(i) => Some(*i),
            FlagValue::Float(f) => float_to_int(*f),
            FlagValue::Json(serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(float_to_int)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FlagValue::Float(f) => Some(*f),
            FlagValue::Int(i) => Some(*i as f64),
            FlagValue::Json(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Any value has a JSON representation. Returns `None` only for non-finite floats.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            FlagValue::Bool(b) => Some((*b).into()),
            FlagValue::Int(i) => Some((*i).into()),
            FlagValue::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
            FlagValue::String(s) => Some(s.as_str().into()),
            FlagValue::Json(v) => Some(v.clone()),
        }
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub name: String,
    pub value: FlagValue,
}

/// A targeting rule.
///
/// A rule serves `variation` unless it has a `rollout`, which takes precedence. A `percentage`
/// gate skips the rule for contexts bucketed outside of it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: Option<String>,
    /// AND-combined. An empty list always matches.
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(default)]
    pub variation: usize,
    /// 0 to 100.
    #[serde(default)]
    pub percentage: Option<u32>,
    #[serde(default)]
    pub rollout: Option<Rollout>,
}

/// A single attribute comparison. Matches if the attribute satisfies the operator for ANY of the
/// listed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    pub attribute: String,
    pub operator: Operator,
    pub values: Vec<AttributeValue>,
    #[serde(default)]
    pub negate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Regular expression.
    Matches,
    SemverEq,
    SemverGt,
    SemverLt,
}

/// Weighted distribution over variations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    /// Attribute to bucket by. Defaults to the context key.
    #[serde(default)]
    pub bucket_by: Option<String>,
    pub variations: Vec<WeightedVariation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedVariation {
    pub variation: usize,
    /// On a 0 to 100000 scale.
    pub weight: u32,
}

/// Requires the flag `key` to resolve to variation `variation` before the dependent flag's rules
/// are considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    pub key: String,
    pub variation: usize,
}
