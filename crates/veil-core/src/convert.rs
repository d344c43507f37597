//! Type compatibility and value conversion.
//!
//! Every conversion falls into one row of a fixed preference table; the row's
//! distance ranks competing function overloads:
//!
//! | distance | kind        | pairs                                                  |
//! |----------|-------------|--------------------------------------------------------|
//! | 0        | exact       | `T -> T`                                               |
//! | 1        | widening    | `int -> float`, `bool -> int`, `date -> timestamp`     |
//! | 2        | assignable  | `T -> any`                                             |
//! | 3        | text        | `T -> text`                                            |
//! | 4        | constructor | `text -> int/float/bool/date/timestamp`, `float -> int`, `int -> bool`, `timestamp -> date`, `int -> timestamp` |
//!
//! Text-accepting constructors are only tried for text sources, so a pair that
//! passes `is_convertible` never fails for lack of a constructor. Parsing text
//! can still reject a concrete value (`"abc"` into `int`).
//!
//! A source declared as `any` is only known at invocation time; it converts
//! through the constructor row using the runtime type of the value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::ConversionError;
use crate::value::{Value, ValueType};

/// Kind of conversion selected for a `(from, to)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConversionKind {
    Exact,
    Widening,
    Assignable,
    Text,
    Constructor,
}

impl ConversionKind {
    pub fn distance(self) -> u32 {
        match self {
            ConversionKind::Exact => 0,
            ConversionKind::Widening => 1,
            ConversionKind::Assignable => 2,
            ConversionKind::Text => 3,
            ConversionKind::Constructor => 4,
        }
    }
}

/// Classify how a value of type `from` can stand in for `to`.
pub fn conversion_kind(from: &ValueType, to: &ValueType) -> Option<ConversionKind> {
    if from == to {
        return Some(ConversionKind::Exact);
    }
    match (from, to) {
        (ValueType::List(from), ValueType::List(to)) => conversion_kind(from, to),
        (_, ValueType::Any) => Some(ConversionKind::Assignable),
        (_, ValueType::Text) => Some(ConversionKind::Text),
        (_, ValueType::List(_)) => None,
        (ValueType::Any, _) => Some(ConversionKind::Constructor),
        _ if widens(from, to) => Some(ConversionKind::Widening),
        _ if constructor_param(from, to).is_some() => Some(ConversionKind::Constructor),
        _ => None,
    }
}

pub fn is_convertible(from: &ValueType, to: &ValueType) -> bool {
    conversion_kind(from, to).is_some()
}

pub fn conversion_distance(from: &ValueType, to: &ValueType) -> Option<u32> {
    conversion_kind(from, to).map(ConversionKind::distance)
}

/// Convert `value` into `to`, returning it unchanged when already compatible.
pub fn convert(value: Value, to: &ValueType) -> Result<Value, ConversionError> {
    if value.is_null() || *to == ValueType::Any {
        return Ok(value);
    }
    let from = value.value_type();
    if from == *to {
        return Ok(value);
    }

    match to {
        ValueType::Text => return Ok(Value::Text(value.to_string())),
        ValueType::List(element) => {
            return match value {
                Value::List(items) => items
                    .into_iter()
                    .map(|item| convert(item, element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                _ => Err(ConversionError::NoConstructor {
                    from,
                    to: to.clone(),
                }),
            };
        }
        _ => {}
    }

    if widens(&from, to) {
        return Ok(widen(value, to));
    }

    let Some(param) = constructor_param(&from, to) else {
        return Err(ConversionError::NoConstructor {
            from,
            to: to.clone(),
        });
    };
    let argument = if param == from {
        value
    } else {
        widen(value, &param)
    };
    construct(argument, to)
}

/// Parameter types accepted by the single-argument constructors of `to`.
fn constructors(to: &ValueType) -> &'static [ValueType] {
    match to {
        ValueType::Int => &[ValueType::Float, ValueType::Text],
        ValueType::Float => &[ValueType::Text],
        ValueType::Bool => &[ValueType::Int, ValueType::Text],
        ValueType::Date => &[ValueType::Timestamp, ValueType::Text],
        ValueType::Timestamp => &[ValueType::Int, ValueType::Text],
        _ => &[],
    }
}

/// Order in which constructor parameter types are tried for a source type.
fn preference(from: &ValueType) -> Vec<ValueType> {
    if *from == ValueType::Text {
        return vec![ValueType::Text, ValueType::Int, ValueType::Float];
    }
    let mut order = vec![from.clone()];
    order.extend(counterparts(from).iter().cloned());
    order.extend([ValueType::Int, ValueType::Float]);
    order
}

/// Best constructor parameter reachable from `from` without construction.
fn constructor_param(from: &ValueType, to: &ValueType) -> Option<ValueType> {
    let accepted = constructors(to);
    preference(from).into_iter().find(|param| {
        accepted.contains(param) && (param == from || widens(from, param))
    })
}

fn counterparts(from: &ValueType) -> &'static [ValueType] {
    match from {
        ValueType::Int => &[ValueType::Float],
        ValueType::Bool => &[ValueType::Int],
        ValueType::Date => &[ValueType::Timestamp],
        _ => &[],
    }
}

fn widens(from: &ValueType, to: &ValueType) -> bool {
    counterparts(from).contains(to)
}

fn widen(value: Value, to: &ValueType) -> Value {
    match (value, to) {
        (Value::Int(value), ValueType::Float) => Value::Float(value as f64),
        (Value::Bool(value), ValueType::Int) => Value::Int(i64::from(value)),
        (Value::Date(value), ValueType::Timestamp) => {
            Value::Timestamp(value.and_time(NaiveTime::MIN))
        }
        (value, _) => value,
    }
}

fn construct(value: Value, to: &ValueType) -> Result<Value, ConversionError> {
    let invalid = |value: &Value, reason: &str| ConversionError::Invalid {
        value: value.to_string(),
        to: to.clone(),
        reason: reason.to_string(),
    };

    match (&value, to) {
        (Value::Float(number), ValueType::Int) => {
            if number.is_finite() {
                Ok(Value::Int(number.trunc() as i64))
            } else {
                Err(invalid(&value, "not a finite number"))
            }
        }
        (Value::Text(text), ValueType::Int) => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|err| invalid(&value, &err.to_string())),
        (Value::Text(text), ValueType::Float) => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|err| invalid(&value, &err.to_string())),
        (Value::Int(number), ValueType::Bool) => Ok(Value::Bool(*number != 0)),
        (Value::Text(text), ValueType::Bool) => parse_bool(text)
            .map(Value::Bool)
            .ok_or_else(|| invalid(&value, "expected true/false")),
        (Value::Timestamp(timestamp), ValueType::Date) => Ok(Value::Date(timestamp.date())),
        (Value::Text(text), ValueType::Date) => parse_date(text)
            .or_else(|| parse_timestamp(text).map(|timestamp| timestamp.date()))
            .map(Value::Date)
            .ok_or_else(|| invalid(&value, "expected YYYY-MM-DD")),
        (Value::Int(seconds), ValueType::Timestamp) => DateTime::from_timestamp(*seconds, 0)
            .map(|timestamp| Value::Timestamp(timestamp.naive_utc()))
            .ok_or_else(|| invalid(&value, "epoch seconds out of range")),
        (Value::Text(text), ValueType::Timestamp) => parse_timestamp(text)
            .or_else(|| parse_date(text).map(|date| date.and_time(NaiveTime::MIN)))
            .map(Value::Timestamp)
            .ok_or_else(|| invalid(&value, "expected an RFC 3339 or YYYY-MM-DD HH:MM:SS timestamp")),
        _ => Err(ConversionError::NoConstructor {
            from: value.value_type(),
            to: to.clone(),
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONCRETE: &[ValueType] = &[
        ValueType::Bool,
        ValueType::Int,
        ValueType::Float,
        ValueType::Text,
        ValueType::Date,
        ValueType::Timestamp,
    ];

    fn sample_for(from: &ValueType, to: &ValueType) -> Value {
        if *from != ValueType::Text {
            return sample(from);
        }
        let text = match to {
            ValueType::Bool => "true",
            ValueType::Date => "2024-02-29",
            ValueType::Timestamp => "2024-02-29 10:30:00",
            _ => "7",
        };
        Value::Text(text.to_string())
    }

    fn sample(value_type: &ValueType) -> Value {
        match value_type {
            ValueType::Bool => Value::Bool(true),
            ValueType::Int => Value::Int(42),
            ValueType::Float => Value::Float(2.5),
            ValueType::Text => Value::Text("7".to_string()),
            ValueType::Date => Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ValueType::Timestamp => Value::Timestamp(
                NaiveDate::from_ymd_opt(2024, 2, 29)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
            ),
            ValueType::Any => Value::Null,
            ValueType::List(element) => Value::List(vec![sample(element)]),
        }
    }

    #[test]
    fn distances_follow_the_preference_table() {
        assert_eq!(conversion_distance(&ValueType::Int, &ValueType::Int), Some(0));
        assert_eq!(conversion_distance(&ValueType::Int, &ValueType::Float), Some(1));
        assert_eq!(conversion_distance(&ValueType::Int, &ValueType::Any), Some(2));
        assert_eq!(conversion_distance(&ValueType::Int, &ValueType::Text), Some(3));
        assert_eq!(conversion_distance(&ValueType::Text, &ValueType::Int), Some(4));
        assert_eq!(conversion_distance(&ValueType::Date, &ValueType::Int), None);
        assert_eq!(conversion_distance(&ValueType::Bool, &ValueType::Date), None);
    }

    #[test]
    fn convertible_pairs_convert_into_the_target_type() {
        for from in CONCRETE {
            for to in CONCRETE {
                if !is_convertible(from, to) {
                    continue;
                }
                let value = sample_for(from, to);
                let converted = convert(value.clone(), to)
                    .unwrap_or_else(|err| panic!("{from} -> {to} failed for {value}: {err}"));
                assert_eq!(&converted.value_type(), to, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn non_convertible_pairs_report_missing_constructor() {
        let result = convert(sample(&ValueType::Date), &ValueType::Float);
        assert_eq!(
            result,
            Err(ConversionError::NoConstructor {
                from: ValueType::Date,
                to: ValueType::Float,
            })
        );
    }

    #[test]
    fn text_constructors_parse_values() {
        assert_eq!(
            convert(Value::Text(" 12 ".to_string()), &ValueType::Int),
            Ok(Value::Int(12))
        );
        assert_eq!(
            convert(Value::Text("2020-01-02".to_string()), &ValueType::Timestamp),
            Ok(Value::Timestamp(
                NaiveDate::from_ymd_opt(2020, 1, 2)
                    .unwrap()
                    .and_time(NaiveTime::MIN)
            ))
        );
        assert!(matches!(
            convert(Value::Text("abc".to_string()), &ValueType::Int),
            Err(ConversionError::Invalid { .. })
        ));
    }

    #[test]
    fn float_to_int_truncates_and_bool_widens() {
        assert_eq!(convert(Value::Float(9.9), &ValueType::Int), Ok(Value::Int(9)));
        assert_eq!(convert(Value::Bool(true), &ValueType::Int), Ok(Value::Int(1)));
        assert_eq!(convert(Value::Int(0), &ValueType::Bool), Ok(Value::Bool(false)));
    }

    #[test]
    fn lists_convert_element_wise_and_null_passes_through() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            convert(list, &ValueType::list_of(ValueType::Text)),
            Ok(Value::List(vec![
                Value::Text("1".to_string()),
                Value::Text("2".to_string())
            ]))
        );
        assert_eq!(convert(Value::Null, &ValueType::Date), Ok(Value::Null));
        assert!(!is_convertible(&ValueType::Int, &ValueType::list_of(ValueType::Int)));
    }

    #[test]
    fn any_sources_defer_to_runtime_type() {
        assert_eq!(
            conversion_kind(&ValueType::Any, &ValueType::Int),
            Some(ConversionKind::Constructor)
        );
        assert_eq!(
            convert(Value::Text("5".to_string()), &ValueType::Int),
            Ok(Value::Int(5))
        );
    }
}
