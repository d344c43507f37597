use veil_core::{Value, ValueType};

use crate::catalog::{Args, FunctionCatalog, FunctionDescriptor};
use crate::errors::CallError;

pub fn register(catalog: &mut FunctionCatalog) {
    register_map(catalog, "upper", |text| text.to_uppercase());
    register_map(catalog, "lower", |text| text.to_lowercase());
    register_map(catalog, "trim", |text| text.trim().to_string());

    catalog.register(
        FunctionDescriptor::builder("Text", "length", ValueType::Int)
            .receiver(ValueType::Text)
            .invoke(|_, args| {
                Ok(match args.receiver().as_str() {
                    Some(text) => Value::Int(text.chars().count() as i64),
                    None => Value::Null,
                })
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Text", "concat", ValueType::Text)
            .receiver(ValueType::Text)
            .param("other", ValueType::Text)
            .invoke(|_, args| Ok(concat(args.receiver(), args.get(0)))),
    );
    catalog.register(
        FunctionDescriptor::builder("Text", "join", ValueType::Text)
            .param("left", ValueType::Text)
            .param("right", ValueType::Text)
            .invoke(|_, args| Ok(concat(args.get(0), args.get(1)))),
    );
    catalog.register(
        FunctionDescriptor::builder("Text", "substring", ValueType::Text)
            .receiver(ValueType::Text)
            .param("start", ValueType::Int)
            .invoke(|_, args| substring(args, None)),
    );
    catalog.register(
        FunctionDescriptor::builder("Text", "substring", ValueType::Text)
            .receiver(ValueType::Text)
            .param("start", ValueType::Int)
            .param("length", ValueType::Int)
            .invoke(|_, args| {
                let length = non_negative(args.int(1)?, "length")?;
                substring(args, Some(length))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Text", "replace", ValueType::Text)
            .receiver(ValueType::Text)
            .param("from", ValueType::Text)
            .param("to", ValueType::Text)
            .invoke(|_, args| {
                let Some(text) = args.receiver().as_str() else {
                    return Ok(Value::Null);
                };
                let from = args.text(0)?;
                if from.is_empty() {
                    return Ok(Value::Text(text.to_string()));
                }
                Ok(Value::Text(text.replace(from, args.text(1)?)))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Text", "mask", ValueType::Text)
            .receiver(ValueType::Text)
            .param("keep", ValueType::Int)
            .invoke(|_, args| {
                let Some(text) = args.receiver().as_str() else {
                    return Ok(Value::Null);
                };
                let keep = non_negative(args.int(0)?, "keep")?;
                let total = text.chars().count();
                let masked = text
                    .chars()
                    .enumerate()
                    .map(|(idx, ch)| if idx + keep < total { '*' } else { ch })
                    .collect();
                Ok(Value::Text(masked))
            }),
    );
}

fn register_map(catalog: &mut FunctionCatalog, member: &str, map: fn(&str) -> String) {
    catalog.register(
        FunctionDescriptor::builder("Text", member, ValueType::Text)
            .receiver(ValueType::Text)
            .invoke(move |_, args| {
                Ok(match args.receiver().as_str() {
                    Some(text) => Value::Text(map(text)),
                    None => Value::Null,
                })
            }),
    );
}

/// Concatenate text renderings; a NULL side yields the other side.
fn concat(left: &Value, right: &Value) -> Value {
    match (left.as_text(), right.as_text()) {
        (Some(left), Some(right)) => Value::Text(left + &right),
        (Some(only), None) | (None, Some(only)) => Value::Text(only),
        (None, None) => Value::Null,
    }
}

fn substring(args: &Args, length: Option<usize>) -> Result<Value, CallError> {
    let Some(text) = args.receiver().as_str() else {
        return Ok(Value::Null);
    };
    let start = non_negative(args.int(0)?, "start")?;
    let chars = text.chars().skip(start);
    Ok(Value::Text(match length {
        Some(length) => chars.take(length).collect(),
        None => chars.collect(),
    }))
}

fn non_negative(value: i64, name: &str) -> Result<usize, CallError> {
    usize::try_from(value).map_err(|_| CallError::new(format!("{name} must be >= 0, got {value}")))
}
