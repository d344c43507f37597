use std::collections::HashMap;

use rand::Rng;
use veil_core::Value;

/// Column whose existing values a sampling function draws from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleRequest {
    pub table: String,
    pub column: String,
}

impl SampleRequest {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    fn key(&self) -> (String, String) {
        (
            self.table.to_ascii_lowercase(),
            self.column.to_ascii_lowercase(),
        )
    }
}

/// Distinct values prefetched before any table is processed.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    values: HashMap<(String, String), Vec<Value>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: &SampleRequest, values: Vec<Value>) {
        self.values.insert(request.key(), values);
    }

    pub fn values(&self, table: &str, column: &str) -> &[Value] {
        self.values
            .get(&SampleRequest::new(table, column).key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pick(&self, table: &str, column: &str, rng: &mut impl Rng) -> Option<&Value> {
        let values = self.values(table, column);
        if values.is_empty() {
            return None;
        }
        values.get(rng.random_range(0..values.len()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
