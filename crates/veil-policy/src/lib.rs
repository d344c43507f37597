//! Policy documents: model, JSON Schema and validation.

pub mod errors;
pub mod model;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, PolicyError, Result, ValidationIssue, ValidationReport};
pub use model::{
    ArgumentDef, ArgumentKind, ColumnDef, ExcludeDef, FunctionDef, GlobalPlan, PlanDef,
    Requirement, Scalar, TableDef,
};
pub use schema::policy_json_schema;
pub use validate::{
    LoadedPolicy, POLICY_VERSION, check_version, load_policy, validate_policy,
    validate_policy_json, validate_requirement,
};
