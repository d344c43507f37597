use std::collections::HashSet;
use std::path::Path;

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::errors::{PolicyError, ValidationReport};
use crate::model::{ColumnDef, ExcludeDef, FunctionDef, PlanDef, Requirement, TableDef};
use crate::schema::policy_json_schema;

/// Policy format version understood by this engine.
pub const POLICY_VERSION: &str = "1.0";

/// Parsed policy with accumulated warnings.
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub requirement: Requirement,
    pub warnings: Vec<crate::errors::ValidationIssue>,
}

/// Validate a policy JSON document against the policy JSON Schema.
pub fn validate_policy_json(policy_json: &Value) -> Result<ValidationReport, PolicyError> {
    let schema = serde_json::to_value(policy_json_schema())?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| PolicyError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();

    if let Err(errors) = compiled.validate(policy_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.error("schema_violation", path, error.to_string(), None);
        }
    }

    Ok(report)
}

/// Compare `major.minor` versions. A major mismatch, or a document minor
/// newer than the engine minor, is incompatible.
pub fn check_version(document: &str, engine: &str) -> Result<(), PolicyError> {
    let incompatible = || PolicyError::IncompatibleVersion {
        document: document.to_string(),
        engine: engine.to_string(),
    };
    let (doc_major, doc_minor) = parse_version(document).ok_or_else(incompatible)?;
    let (app_major, app_minor) = parse_version(engine).ok_or_else(incompatible)?;

    if doc_major != app_major || doc_minor > app_minor {
        return Err(incompatible());
    }
    Ok(())
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Validate references and shapes the JSON Schema cannot express.
pub fn validate_requirement(requirement: &Requirement) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut plan_ids = HashSet::new();
    for (idx, global) in requirement.plans.iter().enumerate() {
        let base_path = format!("/plans/{idx}");
        if global.id.trim().is_empty() {
            report.error(
                "plan_id_empty",
                format!("{base_path}/id"),
                "plan id must be a non-empty string",
                None,
            );
        } else if !plan_ids.insert(global.id.as_str()) {
            report.error(
                "duplicate_plan_id",
                format!("{base_path}/id"),
                format!("plan id '{}' is declared more than once", global.id),
                Some("give every global plan a unique id"),
            );
        }
        validate_plan(&global.plan, &base_path, &mut report);
    }

    if requirement.tables.is_empty() {
        report.warning(
            "tables_empty",
            "/tables",
            "policy declares no tables",
            None,
        );
    }

    let mut table_names = HashSet::new();
    for (idx, table) in requirement.tables.iter().enumerate() {
        let base_path = format!("/tables/{idx}");
        if !table_names.insert(table.name.to_ascii_lowercase()) {
            report.error(
                "duplicate_table",
                format!("{base_path}/name"),
                format!("table '{}' is declared more than once", table.name),
                Some("merge duplicate tables into a single entry"),
            );
        }
        validate_table(table, &base_path, &plan_ids, &mut report);
    }

    report
}

/// Validate a policy end-to-end: schema, version, then references.
pub fn validate_policy(policy_json: &Value) -> Result<LoadedPolicy, PolicyError> {
    let structural = validate_policy_json(policy_json)?;
    if !structural.is_ok() {
        return Err(PolicyError::Invalid(structural));
    }

    let requirement: Requirement = serde_json::from_value(policy_json.clone())?;
    check_version(&requirement.version, POLICY_VERSION)?;

    let report = validate_requirement(&requirement);
    if !report.is_ok() {
        return Err(PolicyError::Invalid(report));
    }

    Ok(LoadedPolicy {
        requirement,
        warnings: report.warnings,
    })
}

/// Read and validate a policy document from disk.
pub fn load_policy(path: &Path) -> Result<LoadedPolicy, PolicyError> {
    let contents = std::fs::read_to_string(path)?;
    let policy_json: Value = serde_json::from_str(&contents)?;
    validate_policy(&policy_json)
}

fn validate_table(
    table: &TableDef,
    base_path: &str,
    plan_ids: &HashSet<&str>,
    report: &mut ValidationReport,
) {
    if table.name.trim().is_empty() {
        report.error(
            "table_name_empty",
            format!("{base_path}/name"),
            "table name must be a non-empty string",
            None,
        );
    }

    if table.primary_key.is_some() && !table.primary_keys.is_empty() {
        report.error(
            "key_conflict",
            base_path.to_string(),
            "declare either primary_key or primary_keys, not both",
            None,
        );
    }

    if table.columns.is_empty() {
        report.error(
            "columns_empty",
            format!("{base_path}/columns"),
            format!("table '{}' declares no columns", table.name),
            None,
        );
    }

    for (idx, exclude) in table.excludes.iter().enumerate() {
        let path = format!("{base_path}/excludes/{idx}");
        if exclude.name.is_none() {
            report.error(
                "exclude_name_missing",
                format!("{path}/name"),
                "table-level excludes must name the column they read",
                None,
            );
        }
        validate_exclude(exclude, &path, report);
    }

    let mut seen = HashSet::new();
    for (idx, column) in table.columns.iter().enumerate() {
        let path = format!("{base_path}/columns/{idx}");
        if !seen.insert(column.name.to_ascii_lowercase()) {
            report.warning(
                "duplicate_column",
                format!("{path}/name"),
                format!(
                    "column '{}.{}' is declared more than once; only the first is used",
                    table.name, column.name
                ),
                None,
            );
        }
        validate_column(column, &path, plan_ids, report);
    }
}

fn validate_column(
    column: &ColumnDef,
    base_path: &str,
    plan_ids: &HashSet<&str>,
    report: &mut ValidationReport,
) {
    match (&column.plan, &column.plan_ref) {
        (Some(_), Some(_)) => report.error(
            "plan_conflict",
            base_path.to_string(),
            format!("column '{}' declares both plan and plan_ref", column.name),
            None,
        ),
        (None, None) => report.error(
            "plan_missing",
            base_path.to_string(),
            format!("column '{}' declares neither plan nor plan_ref", column.name),
            Some("add an inline plan or reference a global plan"),
        ),
        (Some(plan), None) => validate_plan(plan, &format!("{base_path}/plan"), report),
        (None, Some(plan_ref)) => {
            if !plan_ids.contains(plan_ref.as_str()) {
                report.error(
                    "plan_ref_unknown",
                    format!("{base_path}/plan_ref"),
                    format!("plan '{plan_ref}' is not declared in /plans"),
                    None,
                );
            }
        }
    }

    for (idx, exclude) in column.excludes.iter().enumerate() {
        validate_exclude(exclude, &format!("{base_path}/excludes/{idx}"), report);
    }
}

fn validate_plan(plan: &PlanDef, base_path: &str, report: &mut ValidationReport) {
    if plan.functions.is_empty() {
        report.error(
            "plan_functions_empty",
            format!("{base_path}/functions"),
            "plan requires at least one function",
            None,
        );
    }
    for (idx, function) in plan.functions.iter().enumerate() {
        validate_function(function, &format!("{base_path}/functions/{idx}"), report);
    }
    if let Some(combiner) = &plan.combiner {
        let path = format!("{base_path}/combiner");
        validate_function(combiner, &path, report);
        if !combiner.arguments.is_empty() {
            report.error(
                "combiner_arguments",
                format!("{path}/arguments"),
                "combiners receive their two operands implicitly and take no arguments",
                None,
            );
        }
    }
    if plan.combiner.is_none() && (plan.glue.is_some() || plan.functions.iter().any(|f| f.glue.is_some())) {
        report.warning(
            "glue_without_combiner",
            base_path.to_string(),
            "glue has no effect without a combiner",
            None,
        );
    }
}

fn validate_function(function: &FunctionDef, base_path: &str, report: &mut ValidationReport) {
    let well_formed = function
        .name
        .split_once('#')
        .is_some_and(|(target, member)| !target.trim().is_empty() && !member.trim().is_empty());
    if !well_formed {
        report.error(
            "function_reference_invalid",
            format!("{base_path}/name"),
            format!("'{}' is not a Type#member reference", function.name),
            None,
        );
    }

    let mut names = HashSet::new();
    for (idx, argument) in function.arguments.iter().enumerate() {
        let path = format!("{base_path}/arguments/{idx}");
        if argument.kind().is_none() {
            report.error(
                "argument_shape",
                path.clone(),
                "argument must set exactly one of value, values or dynamic",
                None,
            );
        }
        if let Some(name) = &argument.name
            && !names.insert(name.as_str())
        {
            report.error(
                "duplicate_argument",
                format!("{path}/name"),
                format!("argument '{name}' is bound more than once"),
                None,
            );
        }
    }
}

fn validate_exclude(exclude: &ExcludeDef, base_path: &str, report: &mut ValidationReport) {
    if !exclude.has_exclusions() && !exclude.has_inclusions() {
        report.warning(
            "exclude_empty",
            base_path.to_string(),
            "exclude declares no condition and never matches",
            None,
        );
    }
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
