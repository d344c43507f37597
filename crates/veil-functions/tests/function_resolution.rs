use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

use veil_core::{Value, ValueType};
use veil_functions::{
    CallContext, FunctionCatalog, FunctionDescriptor, FunctionError, ResolveRequest, SampleRequest,
    SampleStore, resolve,
};
use veil_policy::ArgumentDef;

fn invoke(catalog: &FunctionCatalog, request: &ResolveRequest<'_>, running: Value) -> Value {
    let resolved = resolve(catalog, request).expect("resolve function");
    let samples = SampleStore::new();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut ctx = CallContext::new(&mut rng, &samples);
    resolved.invoke(&mut ctx, &running).expect("invoke function")
}

#[test]
fn resolution_is_deterministic() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![ArgumentDef::literal(json!(2))];
    let request =
        ResolveRequest::step("Text#substring", &arguments, ValueType::Text, ValueType::Text);

    let first = resolve(&catalog, &request).expect("first resolution");
    let second = resolve(&catalog, &request).expect("second resolution");
    assert_eq!(first.descriptor().signature(), second.descriptor().signature());
    assert_eq!(first.distance(), second.distance());
}

#[test]
fn overloads_are_selected_by_arity() {
    let catalog = FunctionCatalog::with_builtins();
    let one = vec![ArgumentDef::literal(json!(2))];
    let two = vec![ArgumentDef::literal(json!(1)), ArgumentDef::literal(json!(3))];

    let short = resolve(
        &catalog,
        &ResolveRequest::step("Text#substring", &one, ValueType::Text, ValueType::Text),
    )
    .expect("one-argument overload");
    let long = resolve(
        &catalog,
        &ResolveRequest::step("Text#substring", &two, ValueType::Text, ValueType::Text),
    )
    .expect("two-argument overload");

    assert_eq!(short.descriptor().params.len(), 1);
    assert_eq!(long.descriptor().params.len(), 2);
    assert_eq!(
        invoke(
            &catalog,
            &ResolveRequest::step("Text#substring", &two, ValueType::Text, ValueType::Text),
            Value::from("abcdef"),
        ),
        Value::from("bcd")
    );
}

#[test]
fn named_arguments_bind_regardless_of_order() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![
        ArgumentDef::named("max", json!(12)),
        ArgumentDef::named("min", json!(10)),
    ];
    let request =
        ResolveRequest::step("Random#integer", &arguments, ValueType::Text, ValueType::Int);

    let value = invoke(&catalog, &request, Value::Null);
    let value = value.as_i64().expect("integer result");
    assert!((10..=12).contains(&value), "{value} out of range");
}

#[test]
fn indexed_arguments_fill_their_position() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![
        ArgumentDef {
            index: Some(1),
            value: Some(json!("-")),
            ..ArgumentDef::default()
        },
        ArgumentDef::literal(json!("a")),
    ];
    let request =
        ResolveRequest::step("Text#replace", &arguments, ValueType::Text, ValueType::Text);

    assert_eq!(
        invoke(&catalog, &request, Value::from("banana")),
        Value::from("b-n-n-")
    );
}

#[test]
fn receiver_type_ranks_overloads() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![ArgumentDef::literal(json!(3))];

    let on_timestamp = resolve(
        &catalog,
        &ResolveRequest::step("Dates#shift", &arguments, ValueType::Timestamp, ValueType::Any),
    )
    .expect("timestamp overload");
    assert_eq!(on_timestamp.returns(), &ValueType::Timestamp);

    let on_date = resolve(
        &catalog,
        &ResolveRequest::step("Dates#shift", &arguments, ValueType::Date, ValueType::Any),
    )
    .expect("date overload");
    assert_eq!(on_date.returns(), &ValueType::Date);
}

#[test]
fn declared_argument_type_steers_overloads() {
    let catalog = FunctionCatalog::with_builtins();
    let untyped = vec![
        ArgumentDef::literal(json!("2024-01-01")),
        ArgumentDef::literal(json!("2024-01-31")),
    ];
    let typed: Vec<ArgumentDef> = untyped
        .iter()
        .cloned()
        .map(|argument| ArgumentDef {
            value_type: Some(ValueType::Timestamp),
            ..argument
        })
        .collect();

    let by_date = resolve(
        &catalog,
        &ResolveRequest::step("Dates#between", &untyped, ValueType::Text, ValueType::Any),
    )
    .expect("date overload");
    assert_eq!(by_date.returns(), &ValueType::Date);

    let by_timestamp = resolve(
        &catalog,
        &ResolveRequest::step("Dates#between", &typed, ValueType::Text, ValueType::Any),
    )
    .expect("timestamp overload");
    assert_eq!(by_timestamp.returns(), &ValueType::Timestamp);
}

#[test]
fn unmatched_references_list_considered_signatures() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![
        ArgumentDef::literal(json!(1)),
        ArgumentDef::literal(json!(2)),
        ArgumentDef::literal(json!(3)),
    ];
    let err = resolve(
        &catalog,
        &ResolveRequest::step("Random#integer", &arguments, ValueType::Text, ValueType::Int),
    )
    .expect_err("no three-argument overload");

    let FunctionError::NotFound { considered, .. } = err else {
        panic!("expected NotFound, got {err:?}");
    };
    assert_eq!(considered.len(), 2);
    assert!(considered[0].starts_with("Random#integer(max: int)"));
}

#[test]
fn return_type_must_fit_the_consumer() {
    let catalog = FunctionCatalog::with_builtins();
    let err = resolve(
        &catalog,
        &ResolveRequest::step("Text#length", &[], ValueType::Text, ValueType::Date),
    )
    .expect_err("int cannot become a date");
    assert!(matches!(err, FunctionError::NotFound { .. }));
}

#[test]
fn malformed_and_unknown_references_fail() {
    let catalog = FunctionCatalog::with_builtins();
    let malformed = resolve(
        &catalog,
        &ResolveRequest::step("randomFirstName", &[], ValueType::Text, ValueType::Text),
    );
    assert!(matches!(malformed, Err(FunctionError::InvalidReference(_))));

    let unknown = resolve(
        &catalog,
        &ResolveRequest::step("Nope#missing", &[], ValueType::Text, ValueType::Text),
    );
    assert!(
        matches!(unknown, Err(FunctionError::NotFound { considered, .. }) if considered.is_empty())
    );
}

#[test]
fn literals_are_checked_against_their_declared_type() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![ArgumentDef {
        value: Some(json!("abc")),
        value_type: Some(ValueType::Int),
        ..ArgumentDef::default()
    }];
    let err = resolve(
        &catalog,
        &ResolveRequest::step("Random#integer", &arguments, ValueType::Text, ValueType::Int),
    )
    .expect_err("abc is not an int");
    assert!(matches!(err, FunctionError::InvalidArgument { .. }));
}

#[test]
fn dynamic_arguments_receive_the_running_value() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![ArgumentDef::dynamic()];
    let request = ResolveRequest::step("Core#hash", &arguments, ValueType::Text, ValueType::Text);

    let first = invoke(&catalog, &request, Value::from("123-45-6789"));
    let second = invoke(&catalog, &request, Value::from("123-45-6789"));
    let other = invoke(&catalog, &request, Value::from("987-65-4321"));
    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(first.as_str().map(str::len), Some(64));
}

#[test]
fn array_arguments_bind_to_list_parameters() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![ArgumentDef {
        values: Some(vec![json!("red"), json!("green")]),
        ..ArgumentDef::default()
    }];
    let request = ResolveRequest::step("Random#pick", &arguments, ValueType::Text, ValueType::Text);

    let value = invoke(&catalog, &request, Value::Null);
    assert!(matches!(value.as_str(), Some("red") | Some("green")));
}

#[test]
fn ties_keep_registration_order() {
    let mut catalog = FunctionCatalog::new();
    catalog.register(
        FunctionDescriptor::builder("Pick", "one", ValueType::Text)
            .param("value", ValueType::Int)
            .invoke(|_, _| Ok(Value::from("int"))),
    );
    catalog.register(
        FunctionDescriptor::builder("Pick", "one", ValueType::Text)
            .param("value", ValueType::Float)
            .invoke(|_, _| Ok(Value::from("float"))),
    );
    // "7" reaches int and float through the same constructor distance
    let arguments = vec![ArgumentDef::literal(json!("7"))];
    let request = ResolveRequest::step("Pick#one", &arguments, ValueType::Text, ValueType::Text);

    assert_eq!(invoke(&catalog, &request, Value::Null), Value::from("int"));
}

#[test]
fn combiners_bind_receiver_or_both_parameters() {
    let catalog = FunctionCatalog::with_builtins();
    let samples = SampleStore::new();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let mut ctx = CallContext::new(&mut rng, &samples);

    for reference in ["Text#concat", "Text#join"] {
        let combiner = resolve(
            &catalog,
            &ResolveRequest::combiner(reference, ValueType::Text, ValueType::Text, ValueType::Text),
        )
        .expect("resolve combiner");
        let merged = combiner
            .combine(&mut ctx, Value::from("ab"), Value::from("cd"))
            .expect("combine");
        assert_eq!(merged, Value::from("abcd"), "{reference}");
    }

    let err = resolve(
        &catalog,
        &ResolveRequest::combiner("Text#upper", ValueType::Text, ValueType::Text, ValueType::Text),
    )
    .expect_err("upper is unary");
    assert!(matches!(err, FunctionError::NotFound { .. }));
}

#[test]
fn sampling_functions_report_their_source_column() {
    let catalog = FunctionCatalog::with_builtins();
    let arguments = vec![
        ArgumentDef::named("table", json!("public.cities")),
        ArgumentDef::named("column", json!("name")),
    ];
    let request = ResolveRequest::step("Sample#value", &arguments, ValueType::Text, ValueType::Text);
    let resolved = resolve(&catalog, &request).expect("resolve sample");
    assert_eq!(
        resolved.sample_request(),
        Some(SampleRequest::new("public.cities", "name"))
    );

    let mut samples = SampleStore::new();
    samples.insert(
        &SampleRequest::new("public.cities", "name"),
        vec![Value::from("Recife")],
    );
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut ctx = CallContext::new(&mut rng, &samples);
    assert_eq!(
        resolved.invoke(&mut ctx, &Value::Null).expect("sample value"),
        Value::from("Recife")
    );
}

#[test]
fn decimal_bounds_never_abort_the_caller() {
    let catalog = FunctionCatalog::with_builtins();
    let samples = SampleStore::new();
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut ctx = CallContext::new(&mut rng, &samples);

    let wide = vec![
        ArgumentDef::literal(json!(-1.7e308)),
        ArgumentDef::literal(json!(1.7e308)),
    ];
    let request = ResolveRequest::step("Random#decimal", &wide, ValueType::Text, ValueType::Float);
    let value = resolve(&catalog, &request)
        .expect("resolve decimal")
        .invoke(&mut ctx, &Value::Null)
        .expect("wide range");
    assert!(value.as_f64().is_some_and(f64::is_finite), "{value:?}");

    let infinite = vec![ArgumentDef::literal(json!("-inf")), ArgumentDef::literal(json!(1))];
    let request =
        ResolveRequest::step("Random#decimal", &infinite, ValueType::Text, ValueType::Float);
    let outcome = resolve(&catalog, &request).and_then(|resolved| resolved.invoke(&mut ctx, &Value::Null));
    assert!(outcome.is_err(), "{outcome:?}");
}
