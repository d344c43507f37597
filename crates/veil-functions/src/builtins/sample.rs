use veil_core::ValueType;

use crate::catalog::{FunctionCatalog, FunctionDescriptor};
use crate::errors::CallError;

pub fn register(catalog: &mut FunctionCatalog) {
    catalog.register(
        FunctionDescriptor::builder("Sample", "value", ValueType::Any)
            .param("table", ValueType::Text)
            .param("column", ValueType::Text)
            .sampling()
            .invoke(|ctx, args| {
                let (table, column) = (args.text(0)?, args.text(1)?);
                ctx.samples
                    .pick(table, column, ctx.rng)
                    .cloned()
                    .ok_or_else(|| CallError::new(format!("no sampled values for {table}.{column}")))
            }),
    );
}
