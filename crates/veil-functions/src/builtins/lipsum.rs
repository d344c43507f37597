use fake::Fake;
use fake::faker::lorem::en::{Paragraph, Sentence, Words};
use veil_core::{Value, ValueType};

use crate::catalog::{FunctionCatalog, FunctionDescriptor};
use crate::errors::CallError;

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register(
        FunctionDescriptor::builder("Lipsum", "words", ValueType::Text)
            .param("count", ValueType::Int)
            .invoke(|ctx, args| {
                let count = usize::try_from(args.int(0)?)
                    .map_err(|_| CallError::new("count must be >= 0"))?;
                let words: Vec<String> = Words(count..count + 1).fake_with_rng(ctx.rng);
                Ok(Value::Text(words.join(" ")))
            }),
    );
    catalog.register(
        FunctionDescriptor::builder("Lipsum", "sentence", ValueType::Text).invoke(|ctx, _| {
            let value: String = Sentence(4..10).fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
    catalog.register(
        FunctionDescriptor::builder("Lipsum", "paragraph", ValueType::Text).invoke(|ctx, _| {
            let value: String = Paragraph(3..6).fake_with_rng(ctx.rng);
            Ok(Value::Text(value))
        }),
    );
}
