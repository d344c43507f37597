use fake::Fake;
use fake::faker::name::en::{FirstName, LastName, Name};
use rand::Rng;
use sha2::{Digest, Sha256};
use veil_core::{Value, ValueType};

use crate::catalog::{FunctionCatalog, FunctionDescriptor};

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register(
        FunctionDescriptor::builder("Core", "randomFirstName", ValueType::Text).invoke(|ctx, _| {
            let value: String = FirstName().fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
    catalog.register(
        FunctionDescriptor::builder("Core", "randomLastName", ValueType::Text).invoke(|ctx, _| {
            let value: String = LastName().fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
    catalog.register(
        FunctionDescriptor::builder("Core", "randomFullName", ValueType::Text).invoke(|ctx, _| {
            let value: String = Name().fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
    catalog.register(
        FunctionDescriptor::builder("Core", "randomUuid", ValueType::Text).invoke(|ctx, _| {
            let bytes: [u8; 16] = ctx.rng.random();
            Ok(Value::Text(
                uuid::Builder::from_random_bytes(bytes)
                    .into_uuid()
                    .to_string(),
            ))
        }),
    );
    catalog.register(
        FunctionDescriptor::builder("Core", "constant", ValueType::Any)
            .param("value", ValueType::Any)
            .invoke(|_, args| Ok(args.get(0).clone())),
    );
    catalog.register(
        FunctionDescriptor::builder("Core", "null", ValueType::Any).invoke(|_, _| Ok(Value::Null)),
    );
    // Stable pseudonym: equal inputs map to equal outputs across runs.
    catalog.register(
        FunctionDescriptor::builder("Core", "hash", ValueType::Text)
            .param("value", ValueType::Text)
            .invoke(|_, args| {
                Ok(match args.get(0).as_str() {
                    Some(text) => Value::Text(sha256_hex(text.as_bytes())),
                    None => Value::Null,
                })
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Core", "hash", ValueType::Text)
            .param("value", ValueType::Text)
            .param("salt", ValueType::Text)
            .invoke(|_, args| {
                let Some(text) = args.get(0).as_str() else {
                    return Ok(Value::Null);
                };
                let salted = format!("{}{text}", args.text(1)?);
                Ok(Value::Text(sha256_hex(salted.as_bytes())))
            }),
    );
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
