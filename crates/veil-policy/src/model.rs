use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use veil_core::{Value, ValueType};

/// Root of a policy document: what to anonymize and how.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Requirement {
    /// Project the policy belongs to.
    pub project: String,
    /// Policy format version (`major.minor`).
    pub version: String,
    /// Seed for reproducible substitutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Tables to anonymize, processed in declaration order.
    #[serde(default)]
    pub tables: Vec<TableDef>,
    /// Named plans shared by columns through `plan_ref`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plans: Vec<GlobalPlan>,
}

impl Requirement {
    /// Index of global plans by id. Later duplicates are ignored here and
    /// reported by validation.
    pub fn plan_index(&self) -> BTreeMap<&str, &PlanDef> {
        let mut index = BTreeMap::new();
        for global in &self.plans {
            index.entry(global.id.as_str()).or_insert(&global.plan);
        }
        index
    }
}

/// Plan declared once at the document root and referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GlobalPlan {
    pub id: String,
    #[serde(flatten)]
    pub plan: PlanDef,
}

/// Table to anonymize.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    /// Table name, optionally schema-qualified (`schema.table`).
    pub name: String,
    /// Free-form SQL predicate limiting the rows to anonymize.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Single key column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Composite key columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<String>,
    pub columns: Vec<ColumnDef>,
    /// Row exclusions applied in the SELECT.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<ExcludeDef>,
}

impl TableDef {
    /// Key columns declared in the document (empty when the key is discovered).
    pub fn declared_keys(&self) -> Vec<String> {
        match &self.primary_key {
            Some(key) => vec![key.clone()],
            None => self.primary_keys.clone(),
        }
    }
}

/// Column to anonymize.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    pub name: String,
    /// Declared value type of the column.
    #[serde(rename = "type", default = "default_column_type")]
    #[schemars(with = "String")]
    pub value_type: ValueType,
    /// Skip NULL and empty values.
    #[serde(default)]
    pub ignore_empty: bool,
    /// Inline plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanDef>,
    /// Id of a global plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_ref: Option<String>,
    /// Row exclusions evaluated per value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<ExcludeDef>,
}

fn default_column_type() -> ValueType {
    ValueType::Text
}

/// Exclusion predicate over one column.
///
/// `equals`, `like`, `null` and `in` exclude a row when they match;
/// `not_equals`, `not_like` and `not_in` require a row to match at least one
/// of them to be anonymized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExcludeDef {
    /// Column the predicate reads; defaults to the owning column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub null: bool,
    #[serde(default, rename = "in", skip_serializing_if = "Vec::is_empty")]
    pub in_list: Vec<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_equals: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_like: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_in: Vec<Scalar>,
}

impl ExcludeDef {
    pub fn has_exclusions(&self) -> bool {
        self.equals.is_some() || self.like.is_some() || self.null || !self.in_list.is_empty()
    }

    pub fn has_inclusions(&self) -> bool {
        self.not_equals.is_some() || self.not_like.is_some() || !self.not_in.is_empty()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Scalar literal used in exclusion predicates; compared by its text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(value) => f.write_str(value),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

/// Chain of functions producing a replacement value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlanDef {
    pub functions: Vec<FunctionDef>,
    /// Binary function merging chained outputs instead of replacing them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combiner: Option<FunctionDef>,
    /// Value merged between chained outputs when a combiner is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glue: Option<serde_json::Value>,
}

/// Reference to a catalog function (`Type#member`) with its arguments.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentDef>,
    /// Glue used before the next step's output is combined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glue: Option<serde_json::Value>,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
            glue: None,
        }
    }

    pub fn with_argument(mut self, argument: ArgumentDef) -> Self {
        self.arguments.push(argument);
        self
    }
}

/// Declared function argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArgumentDef {
    /// Parameter name to bind to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Zero-based parameter position to bind to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Declared type of the literal; converted when the plan is resolved.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Fixed-size array of literals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
    /// Substitute the running value at invocation time.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dynamic: bool,
}

/// Shape of a declared argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentKind {
    Literal(Value),
    Array(Vec<Value>),
    Dynamic,
}

impl ArgumentDef {
    pub fn literal(value: serde_json::Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn named(name: &str, value: serde_json::Value) -> Self {
        Self {
            name: Some(name.to_string()),
            value: Some(value),
            ..Self::default()
        }
    }

    pub fn dynamic() -> Self {
        Self {
            dynamic: true,
            ..Self::default()
        }
    }

    /// Classify the argument; `None` when it is not exactly one of
    /// `value`, `values` or `dynamic`.
    pub fn kind(&self) -> Option<ArgumentKind> {
        match (&self.value, &self.values, self.dynamic) {
            (Some(value), None, false) => Some(ArgumentKind::Literal(Value::from_json(value))),
            (None, Some(values), false) => Some(ArgumentKind::Array(
                values.iter().map(Value::from_json).collect(),
            )),
            (None, None, true) => Some(ArgumentKind::Dynamic),
            _ => None,
        }
    }
}
