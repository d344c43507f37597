use rand::Rng;
use veil_core::{Value, ValueType};

use crate::catalog::{FunctionCatalog, FunctionDescriptor};
use crate::errors::CallError;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register(
        FunctionDescriptor::builder("Random", "integer", ValueType::Int)
            .param("max", ValueType::Int)
            .invoke(|ctx, args| {
                let max = args.int(0)?;
                check_range(0, max)?;
                Ok(Value::Int(ctx.rng.random_range(0..=max)))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Random", "integer", ValueType::Int)
            .param("min", ValueType::Int)
            .param("max", ValueType::Int)
            .invoke(|ctx, args| {
                let (min, max) = (args.int(0)?, args.int(1)?);
                check_range(min, max)?;
                Ok(Value::Int(ctx.rng.random_range(min..=max)))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Random", "decimal", ValueType::Float)
            .param("min", ValueType::Float)
            .param("max", ValueType::Float)
            .invoke(|ctx, args| {
                let (min, max) = (args.float(0)?, args.float(1)?);
                Ok(Value::Float(decimal_between(ctx.rng, min, max)?))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Random", "boolean", ValueType::Bool)
            .invoke(|ctx, _| Ok(Value::Bool(ctx.rng.random_bool(0.5)))),
    );
    catalog.register(
        FunctionDescriptor::builder("Random", "digits", ValueType::Text)
            .param("count", ValueType::Int)
            .invoke(|ctx, args| {
                let count = count(args.int(0)?)?;
                let digits = (0..count)
                    .map(|_| char::from(b'0' + ctx.rng.random_range(0..10u8)))
                    .collect();
                Ok(Value::Text(digits))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Random", "letters", ValueType::Text)
            .param("count", ValueType::Int)
            .invoke(|ctx, args| {
                let count = count(args.int(0)?)?;
                let letters = (0..count)
                    .map(|_| char::from(LETTERS[ctx.rng.random_range(0..LETTERS.len())]))
                    .collect();
                Ok(Value::Text(letters))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Random", "pick", ValueType::Text)
            .param("values", ValueType::list_of(ValueType::Text))
            .invoke(|ctx, args| {
                let values = args.get(0).as_list().unwrap_or_default();
                if values.is_empty() {
                    return Err(CallError::new("values must not be empty"));
                }
                Ok(values[ctx.rng.random_range(0..values.len())].clone())
            }),
    );
}

fn check_range(min: i64, max: i64) -> Result<(), CallError> {
    if min > max {
        return Err(CallError::new(format!("min {min} must be <= max {max}")));
    }
    Ok(())
}

/// Uniform float in `[min, max]`. Spans too wide for rand's uniform sampler
/// interpolate between the bounds instead.
fn decimal_between<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> Result<f64, CallError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(CallError::new(format!(
            "bounds must be finite, got {min} and {max}"
        )));
    }
    if min > max {
        return Err(CallError::new(format!("min {min} must be <= max {max}")));
    }
    if max - min < f64::MAX / 2.0 {
        return Ok(rng.random_range(min..=max));
    }
    let unit: f64 = rng.random();
    Ok((min * (1.0 - unit) + max * unit).clamp(min, max))
}

fn count(value: i64) -> Result<usize, CallError> {
    usize::try_from(value).map_err(|_| CallError::new(format!("count must be >= 0, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn decimals_cover_the_whole_float_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            let value = decimal_between(&mut rng, -1.7e308, 1.7e308).expect("wide range");
            assert!(value.is_finite());
            assert!((-1.7e308..=1.7e308).contains(&value));
        }
        let value = decimal_between(&mut rng, f64::MIN, f64::MAX).expect("full range");
        assert!(value.is_finite());
        assert_eq!(decimal_between(&mut rng, 2.5, 2.5).expect("point"), 2.5);
    }

    #[test]
    fn decimals_reject_unusable_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(decimal_between(&mut rng, f64::NEG_INFINITY, 1.0).is_err());
        assert!(decimal_between(&mut rng, 0.0, f64::INFINITY).is_err());
        assert!(decimal_between(&mut rng, f64::NAN, 1.0).is_err());
        assert!(decimal_between(&mut rng, 2.0, 1.0).is_err());
    }
}
