/// Options that control how table names are looked up.
#[derive(Debug, Clone)]
pub struct MetadataOptions {
    /// Schema used for names without a `schema.` prefix.
    pub default_schema: String,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            default_schema: "public".to_string(),
        }
    }
}

impl MetadataOptions {
    /// Split `schema.table`, falling back to the default schema.
    pub fn qualify<'a>(&'a self, name: &'a str) -> (&'a str, &'a str) {
        match name.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => (self.default_schema.as_str(), name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataOptions;

    #[test]
    fn unqualified_names_use_default_schema() {
        let options = MetadataOptions::default();
        assert_eq!(options.qualify("users"), ("public", "users"));
        assert_eq!(options.qualify("crm.users"), ("crm", "users"));
    }
}
