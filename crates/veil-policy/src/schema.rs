use schemars::schema::RootSchema;
use schemars::schema_for;

use crate::model::Requirement;

/// Emit the JSON Schema for policy documents.
pub fn policy_json_schema() -> RootSchema {
    schema_for!(Requirement)
}
