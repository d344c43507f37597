use std::path::Path;

use serde_json::json;
use veil_policy::{
    ArgumentKind, PolicyError, load_policy, validate_policy, validate_policy_json,
    validate_requirement,
};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn minimal_policy() -> serde_json::Value {
    json!({
        "project": "demo",
        "version": "1.0",
        "tables": [
            {
                "name": "users",
                "columns": [
                    { "name": "first_name", "plan": { "functions": [{ "name": "Core#randomFirstName" }] } }
                ]
            }
        ]
    })
}

#[test]
fn fixture_policy_loads_without_warnings() {
    let loaded = load_policy(&fixture("users.policy.json")).expect("load fixture policy");
    assert!(loaded.warnings.is_empty(), "unexpected warnings: {:?}", loaded.warnings);

    let requirement = loaded.requirement;
    assert_eq!(requirement.seed, Some(42));
    assert_eq!(requirement.tables.len(), 1);

    let table = &requirement.tables[0];
    assert_eq!(table.declared_keys(), vec!["id".to_string()]);
    assert_eq!(table.filter.as_deref(), Some("created_at < now()"));
    assert_eq!(table.excludes[0].in_list.len(), 2);

    let age = &table.columns[2];
    assert_eq!(age.value_type.to_string(), "int");
    let plan = age.plan.as_ref().expect("inline plan");
    let kinds: Vec<_> = plan.functions[0]
        .arguments
        .iter()
        .map(|argument| argument.kind())
        .collect();
    assert!(matches!(kinds[0], Some(ArgumentKind::Literal(_))));

    let index = requirement.plan_index();
    assert!(index.contains_key("full_name"));
    assert_eq!(index["full_name"].functions.len(), 2);
}

#[test]
fn unknown_fields_are_schema_violations() {
    let mut policy = minimal_policy();
    policy["tables"][0]["colums"] = json!([]);

    let report = validate_policy_json(&policy).expect("schema compiles");
    assert!(!report.is_ok());
    assert!(report.has_code("schema_violation"));
}

#[test]
fn missing_project_is_reported() {
    let mut policy = minimal_policy();
    policy.as_object_mut().expect("object").remove("project");

    let err = validate_policy(&policy).expect_err("project is required");
    assert!(matches!(err, PolicyError::Invalid(report) if report.has_code("schema_violation")));
}

#[test]
fn newer_minor_version_is_rejected() {
    let mut policy = minimal_policy();
    policy["version"] = json!("1.7");

    let err = validate_policy(&policy).expect_err("version too new");
    assert!(matches!(err, PolicyError::IncompatibleVersion { .. }));
}

#[test]
fn plan_reference_rules_are_enforced() {
    let policy = json!({
        "project": "demo",
        "version": "1.0",
        "plans": [
            { "id": "name", "functions": [{ "name": "Core#randomFirstName" }] },
            { "id": "name", "functions": [{ "name": "Core#randomLastName" }] }
        ],
        "tables": [
            {
                "name": "users",
                "primary_key": "id",
                "primary_keys": ["id", "tenant"],
                "columns": [
                    { "name": "a", "plan_ref": "missing" },
                    { "name": "b" },
                    {
                        "name": "c",
                        "plan_ref": "name",
                        "plan": { "functions": [{ "name": "Core#randomFirstName" }] }
                    },
                    { "name": "d", "plan": { "functions": [] } },
                    { "name": "e", "plan": { "functions": [{ "name": "randomFirstName" }] } }
                ]
            }
        ]
    });

    let requirement = serde_json::from_value(policy).expect("parse requirement");
    let report = validate_requirement(&requirement);

    for code in [
        "duplicate_plan_id",
        "key_conflict",
        "plan_ref_unknown",
        "plan_missing",
        "plan_conflict",
        "plan_functions_empty",
        "function_reference_invalid",
    ] {
        assert!(report.has_code(code), "expected {code} in {report}");
    }
}

#[test]
fn table_level_excludes_must_name_a_column() {
    let mut policy = minimal_policy();
    policy["tables"][0]["excludes"] = json!([{ "equals": "x" }]);

    let err = validate_policy(&policy).expect_err("unnamed table exclude");
    let PolicyError::Invalid(report) = err else {
        panic!("expected invalid policy");
    };
    assert!(report.has_code("exclude_name_missing"));
}

#[test]
fn duplicate_columns_only_warn() {
    let mut policy = minimal_policy();
    let column = policy["tables"][0]["columns"][0].clone();
    policy["tables"][0]["columns"]
        .as_array_mut()
        .expect("columns array")
        .push(column);

    let loaded = validate_policy(&policy).expect("duplicates are not fatal");
    assert_eq!(loaded.warnings.len(), 1);
    assert_eq!(loaded.warnings[0].code, "duplicate_column");
    assert_eq!(loaded.warnings[0].path, "/tables/0/columns/1/name");
}

#[test]
fn arguments_need_exactly_one_shape() {
    let mut policy = minimal_policy();
    policy["tables"][0]["columns"][0]["plan"]["functions"][0]["arguments"] =
        json!([{ "value": 1, "dynamic": true }]);

    let err = validate_policy(&policy).expect_err("ambiguous argument");
    assert!(matches!(err, PolicyError::Invalid(report) if report.has_code("argument_shape")));
}
