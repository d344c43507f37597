use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use veil_core::{Value, ValueType};

use crate::catalog::{FunctionCatalog, FunctionDescriptor};
use crate::errors::CallError;

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register(
        FunctionDescriptor::builder("Dates", "between", ValueType::Date)
            .param("min", ValueType::Date)
            .param("max", ValueType::Date)
            .invoke(|ctx, args| {
                let (min, max) = (date_arg(args.get(0), "min")?, date_arg(args.get(1), "max")?);
                if min > max {
                    return Err(CallError::new(format!("min {min} must be <= max {max}")));
                }
                let span = (max - min).num_days();
                add_days(min, ctx.rng.random_range(0..=span)).map(Value::Date)
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Dates", "between", ValueType::Timestamp)
            .param("min", ValueType::Timestamp)
            .param("max", ValueType::Timestamp)
            .invoke(|ctx, args| {
                let (min, max) = (
                    timestamp_arg(args.get(0), "min")?,
                    timestamp_arg(args.get(1), "max")?,
                );
                if min > max {
                    return Err(CallError::new(format!("min {min} must be <= max {max}")));
                }
                let span = (max - min).num_seconds();
                let offset = Duration::seconds(ctx.rng.random_range(0..=span));
                min.checked_add_signed(offset)
                    .map(Value::Timestamp)
                    .ok_or_else(|| CallError::new("timestamp out of range"))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Dates", "addDays", ValueType::Date)
            .receiver(ValueType::Date)
            .param("days", ValueType::Int)
            .invoke(|_, args| {
                let Some(date) = args.receiver().as_date() else {
                    return Ok(Value::Null);
                };
                add_days(date, args.int(0)?).map(Value::Date)
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Dates", "shift", ValueType::Date)
            .receiver(ValueType::Date)
            .param("maxDays", ValueType::Int)
            .invoke(|ctx, args| {
                let Some(date) = args.receiver().as_date() else {
                    return Ok(Value::Null);
                };
                let max = args.int(0)?.saturating_abs();
                add_days(date, ctx.rng.random_range(-max..=max)).map(Value::Date)
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Dates", "shift", ValueType::Timestamp)
            .receiver(ValueType::Timestamp)
            .param("maxDays", ValueType::Int)
            .invoke(|ctx, args| {
                let Some(timestamp) = args.receiver().as_timestamp() else {
                    return Ok(Value::Null);
                };
                let max = args.int(0)?.saturating_abs();
                let days = ctx.rng.random_range(-max..=max);
                let date = add_days(timestamp.date(), days)?;
                Ok(Value::Timestamp(date.and_time(timestamp.time())))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Dates", "year", ValueType::Int)
            .receiver(ValueType::Date)
            .invoke(|_, args| {
                Ok(match args.receiver().as_date() {
                    Some(date) => Value::Int(i64::from(date.year())),
                    None => Value::Null,
                })
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Dates", "format", ValueType::Text)
            .receiver(ValueType::Timestamp)
            .param("pattern", ValueType::Text)
            .invoke(|_, args| {
                let Some(timestamp) = args.receiver().as_timestamp() else {
                    return Ok(Value::Null);
                };
                let pattern = args.text(0)?;
                if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                    return Err(CallError::new(format!("invalid date pattern '{pattern}'")));
                }
                Ok(Value::Text(timestamp.format(pattern).to_string()))
            }),
    );
}

fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, CallError> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| CallError::new(format!("{date} shifted by {days} days is out of range")))
}

fn date_arg(value: &Value, name: &str) -> Result<NaiveDate, CallError> {
    value
        .as_date()
        .ok_or_else(|| CallError::new(format!("{name} must be a date")))
}

fn timestamp_arg(value: &Value, name: &str) -> Result<NaiveDateTime, CallError> {
    value
        .as_timestamp()
        .ok_or_else(|| CallError::new(format!("{name} must be a timestamp")))
}
