use fake::Fake;
use fake::faker::internet::en::{IPv4, SafeEmail, Username};
use rand::Rng;
use veil_core::{Value, ValueType};

use crate::catalog::{FunctionCatalog, FunctionDescriptor};

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register(
        FunctionDescriptor::builder("Net", "email", ValueType::Text).invoke(|ctx, _| {
            let value: String = SafeEmail().fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
    // Overload deriving the local part from a name, e.g. the running value.
    catalog.register(
        FunctionDescriptor::builder("Net", "email", ValueType::Text)
            .param("name", ValueType::Text)
            .invoke(|ctx, args| {
                let local = match args.get(0).as_str().map(slugify) {
                    Some(slug) if !slug.is_empty() => slug,
                    _ => format!("user{}", ctx.rng.random_range(1..=9999)),
                };
                Ok(Value::Text(format!("{local}@example.com")))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Net", "username", ValueType::Text).invoke(|ctx, _| {
            let value: String = Username().fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
    catalog.register(
        FunctionDescriptor::builder("Net", "ipv4", ValueType::Text).invoke(|ctx, _| {
            let value: String = IPv4().fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
}

fn slugify(value: &str) -> String {
    let mut slug = String::new();
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('.') && !slug.is_empty() {
            slug.push('.');
        }
    }
    slug.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_joins_words_with_dots() {
        assert_eq!(slugify("Ana Maria  Silva"), "ana.maria.silva");
        assert_eq!(slugify("  --  "), "");
    }
}
