use fake::Fake;
use fake::faker::name::en::{FirstName, LastName};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use veil_core::{Value, ValueType};
use veil_functions::{
    CallContext, FunctionCatalog, FunctionError, ResolveRequest, ResolvedPlan, SampleStore,
    resolve,
};
use veil_policy::{ArgumentDef, FunctionDef, PlanDef};

fn run(plan: &ResolvedPlan, seed: Value, rng_seed: u64) -> Value {
    let samples = SampleStore::new();
    let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
    let mut ctx = CallContext::new(&mut rng, &samples);
    plan.invoke(&mut ctx, &seed).expect("invoke plan")
}

#[test]
fn chain_without_combiner_composes_functions() {
    let catalog = FunctionCatalog::with_builtins();
    let functions = vec![
        FunctionDef::new("Text#trim"),
        FunctionDef::new("Text#upper"),
        FunctionDef::new("Text#substring")
            .with_argument(ArgumentDef::named("start", json!(0)))
            .with_argument(ArgumentDef::named("length", json!(3))),
    ];
    let def = PlanDef {
        functions: functions.clone(),
        combiner: None,
        glue: None,
    };
    let plan = ResolvedPlan::resolve(&def, &catalog, &ValueType::Text, &ValueType::Text)
        .expect("resolve plan");

    let seed = Value::from("  hello world ");
    let samples = SampleStore::new();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut ctx = CallContext::new(&mut rng, &samples);
    let mut expected = seed.clone();
    for function in &functions {
        let resolved = resolve(
            &catalog,
            &ResolveRequest::step(&function.name, &function.arguments, ValueType::Text, ValueType::Any),
        )
        .expect("resolve step");
        expected = resolved.invoke(&mut ctx, &expected).expect("invoke step");
    }

    assert_eq!(run(&plan, seed, 1), expected);
    assert_eq!(expected, Value::from("HEL"));
}

#[test]
fn combiner_with_glue_builds_full_names() {
    let catalog = FunctionCatalog::with_builtins();
    let def = PlanDef {
        functions: vec![
            FunctionDef::new("Core#randomFirstName"),
            FunctionDef::new("Core#randomLastName"),
        ],
        combiner: Some(FunctionDef::new("Text#concat")),
        glue: Some(json!(" ")),
    };
    let plan = ResolvedPlan::resolve(&def, &catalog, &ValueType::Text, &ValueType::Text)
        .expect("resolve plan");

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let first: String = FirstName().fake_with_rng(&mut rng);
    let last: String = LastName().fake_with_rng(&mut rng);

    assert_eq!(run(&plan, Value::Null, 42), Value::Text(format!("{first} {last}")));
}

#[test]
fn same_seed_reproduces_substitutes() {
    let catalog = FunctionCatalog::with_builtins();
    let def = PlanDef {
        functions: vec![FunctionDef::new("Net#email")],
        combiner: None,
        glue: None,
    };
    let plan = ResolvedPlan::resolve(&def, &catalog, &ValueType::Text, &ValueType::Text)
        .expect("resolve plan");

    assert_eq!(run(&plan, Value::Null, 7), run(&plan, Value::Null, 7));
}

#[test]
fn last_step_output_converts_to_column_type() {
    let catalog = FunctionCatalog::with_builtins();
    let def = PlanDef {
        functions: vec![FunctionDef::new("Random#digits").with_argument(ArgumentDef::literal(json!(4)))],
        combiner: None,
        glue: None,
    };
    let plan = ResolvedPlan::resolve(&def, &catalog, &ValueType::Int, &ValueType::Int)
        .expect("text converts to int");

    let value = run(&plan, Value::Int(1234), 3);
    assert!(matches!(value, Value::Int(number) if (0..=9999).contains(&number)));
}

#[test]
fn combiner_must_accept_step_outputs() {
    let catalog = FunctionCatalog::with_builtins();
    let def = PlanDef {
        functions: vec![FunctionDef::new("Core#randomFirstName")],
        combiner: Some(FunctionDef::new("Random#boolean")),
        glue: None,
    };
    let err = ResolvedPlan::resolve(&def, &catalog, &ValueType::Text, &ValueType::Text)
        .expect_err("boolean is not a combiner");
    assert!(matches!(err, FunctionError::NotFound { .. }));
}
