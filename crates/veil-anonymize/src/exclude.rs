//! Row exclusions: in-process evaluation and SQL predicates.
//!
//! Values compare by their text rendering. NULL never equals, matches or is
//! contained in anything; only `null: true` matches it, and it satisfies no
//! `not_*` condition.
//!
//! In-process rendering follows PostgreSQL's text output, so column-level and
//! table-level lists agree on the same literal. `timestamptz` is the
//! exception: SQL renders the `+00` offset, the row value does not.

use regex::Regex;
use veil_core::{Dialect, Value};
use veil_policy::{ExcludeDef, Scalar};

use crate::errors::AnonymizeError;

static NULL: Value = Value::Null;

/// SQL `LIKE` pattern compiled to an anchored regex.
#[derive(Debug, Clone)]
pub struct LikePattern {
    pattern: String,
    regex: Regex,
}

impl LikePattern {
    /// `%` matches any run, `_` one character and `\` escapes the next one.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut source = String::from("(?s)^");
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '%' => source.push_str(".*"),
                '_' => source.push('.'),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        source.push_str(&regex::escape(&escaped.to_string()));
                    }
                }
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');
        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// One exclude entry bound to the column it reads.
#[derive(Debug, Clone)]
pub struct ExcludeRule {
    pub column: String,
    equals: Option<String>,
    like: Option<LikePattern>,
    null: bool,
    in_list: Vec<String>,
    not_equals: Option<String>,
    not_like: Option<LikePattern>,
    not_in: Vec<String>,
}

impl ExcludeRule {
    pub fn from_def(def: &ExcludeDef, column: &str) -> Result<Self, regex::Error> {
        let render = |items: &[Scalar]| items.iter().map(Scalar::to_string).collect::<Vec<_>>();
        Ok(Self {
            column: column.to_string(),
            equals: def.equals.as_ref().map(Scalar::to_string),
            like: def.like.as_deref().map(LikePattern::new).transpose()?,
            null: def.null,
            in_list: render(&def.in_list),
            not_equals: def.not_equals.as_ref().map(Scalar::to_string),
            not_like: def.not_like.as_deref().map(LikePattern::new).transpose()?,
            not_in: render(&def.not_in),
        })
    }

    pub fn has_inclusions(&self) -> bool {
        self.not_equals.is_some() || self.not_like.is_some() || !self.not_in.is_empty()
    }

    /// True when one of `equals`, `like`, `null` or `in` matches.
    pub fn matches_exclusion(&self, value: &Value) -> bool {
        let Some(text) = value.as_text() else {
            return self.null;
        };
        self.equals.as_deref() == Some(text.as_str())
            || self.like.as_ref().is_some_and(|like| like.is_match(&text))
            || self.in_list.contains(&text)
    }

    /// True when one of `not_equals`, `not_like` or `not_in` holds.
    pub fn matches_inclusion(&self, value: &Value) -> bool {
        let Some(text) = value.as_text() else {
            return false;
        };
        self.not_equals
            .as_deref()
            .is_some_and(|not_equals| not_equals != text)
            || self.not_like.as_ref().is_some_and(|like| !like.is_match(&text))
            || (!self.not_in.is_empty() && !self.not_in.contains(&text))
    }
}

/// Exclude entries of one rule list (a table or a column).
///
/// A row is excluded when any exclusion condition matches. When the list has
/// `not_*` conditions, the row is also excluded unless at least one of them
/// holds; they are OR'd across entries, including entries on other columns.
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    rules: Vec<ExcludeRule>,
}

impl ExcludeRules {
    /// Bind `defs` to their columns. Entries without a `name` read
    /// `default_column`; table-level lists pass `None` and require names.
    pub fn from_defs(
        table: &str,
        defs: &[ExcludeDef],
        default_column: Option<&str>,
    ) -> Result<Self, AnonymizeError> {
        let mut rules = Vec::with_capacity(defs.len());
        for def in defs {
            let column = def
                .name
                .as_deref()
                .or(default_column)
                .ok_or_else(|| AnonymizeError::InvalidExclude {
                    table: table.to_string(),
                    message: "table-level exclude must name its column".to_string(),
                })?;
            let rule =
                ExcludeRule::from_def(def, column).map_err(|err| AnonymizeError::InvalidExclude {
                    table: table.to_string(),
                    message: format!("invalid like pattern on '{column}': {err}"),
                })?;
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[ExcludeRule] {
        &self.rules
    }

    /// Columns read by the rules, deduplicated ignoring ASCII case.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !columns
                .iter()
                .any(|seen| seen.eq_ignore_ascii_case(&rule.column))
            {
                columns.push(&rule.column);
            }
        }
        columns
    }

    /// Evaluate the list against a row; columns missing from the row read NULL.
    pub fn excludes<'v>(&self, lookup: impl Fn(&str) -> Option<&'v Value>) -> bool {
        let value = |column: &str| lookup(column).unwrap_or(&NULL);
        if self
            .rules
            .iter()
            .any(|rule| rule.matches_exclusion(value(&rule.column)))
        {
            return true;
        }
        let mut inclusions = self.rules.iter().filter(|rule| rule.has_inclusions()).peekable();
        if inclusions.peek().is_none() {
            return false;
        }
        !inclusions.any(|rule| rule.matches_inclusion(value(&rule.column)))
    }

    /// Predicate keeping the rows this list does not exclude, with comparison
    /// literals appended to `params`. `quote` renders a column reference.
    pub fn sql_predicate(
        &self,
        dialect: Dialect,
        quote: impl Fn(&str) -> String,
        params: &mut Vec<Value>,
    ) -> Option<String> {
        let bind = |params: &mut Vec<Value>, text: &str| {
            params.push(Value::from(text));
            dialect.placeholder(params.len())
        };

        let mut exclusions = Vec::new();
        let mut inclusions = Vec::new();
        for rule in &self.rules {
            let column = quote(&rule.column);
            let cast = dialect.text_cast(&column);
            if let Some(equals) = &rule.equals {
                exclusions.push(format!("{cast} = {}", bind(params, equals)));
            }
            if let Some(like) = &rule.like {
                exclusions.push(format!("{cast} LIKE {}", bind(params, like.as_str())));
            }
            if rule.null {
                exclusions.push(format!("{column} IS NULL"));
            }
            if !rule.in_list.is_empty() {
                let items: Vec<String> = rule.in_list.iter().map(|item| bind(params, item)).collect();
                exclusions.push(format!("{cast} IN ({})", items.join(", ")));
            }
            if let Some(not_equals) = &rule.not_equals {
                inclusions.push(format!("{cast} <> {}", bind(params, not_equals)));
            }
            if let Some(not_like) = &rule.not_like {
                inclusions.push(format!("{cast} NOT LIKE {}", bind(params, not_like.as_str())));
            }
            if !rule.not_in.is_empty() {
                let items: Vec<String> = rule.not_in.iter().map(|item| bind(params, item)).collect();
                inclusions.push(format!("{cast} NOT IN ({})", items.join(", ")));
            }
        }

        // COALESCE folds NULL comparisons to false so they never match.
        let mut parts = Vec::new();
        if !exclusions.is_empty() {
            parts.push(format!("NOT COALESCE(({}), FALSE)", exclusions.join(" OR ")));
        }
        if !inclusions.is_empty() {
            parts.push(format!("COALESCE(({}), FALSE)", inclusions.join(" OR ")));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}

/// `ignore_empty` shorthand: NULL or empty text.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rules(defs: &[ExcludeDef]) -> ExcludeRules {
        ExcludeRules::from_defs("users", defs, Some("first_name")).expect("rules")
    }

    fn row(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn excluded(rules: &ExcludeRules, row: &HashMap<String, Value>) -> bool {
        rules.excludes(|column| row.get(column))
    }

    #[test]
    fn like_patterns_follow_sql_syntax() {
        let pattern = LikePattern::new("J_n%").expect("pattern");
        assert!(pattern.is_match("Jane"));
        assert!(pattern.is_match("Jon"));
        assert!(!pattern.is_match("jane"));
        assert!(!pattern.is_match("xJane"));

        let escaped = LikePattern::new(r"100\%").expect("pattern");
        assert!(escaped.is_match("100%"));
        assert!(!escaped.is_match("1000"));
    }

    #[test]
    fn exclusions_match_text_rendering() {
        let list = rules(&[
            ExcludeDef {
                name: Some("age".to_string()),
                equals: Some(Scalar::Int(42)),
                ..ExcludeDef::default()
            },
            ExcludeDef {
                in_list: vec!["root".into(), "admin".into()],
                ..ExcludeDef::default()
            },
        ]);

        assert!(excluded(&list, &row(&[("age", Value::Int(42))])));
        assert!(excluded(&list, &row(&[("first_name", Value::from("admin"))])));
        assert!(!excluded(
            &list,
            &row(&[("age", Value::Int(7)), ("first_name", Value::from("Ana"))])
        ));
    }

    #[test]
    fn null_only_matches_null_condition() {
        let equals = rules(&[ExcludeDef {
            equals: Some("".into()),
            ..ExcludeDef::default()
        }]);
        assert!(!excluded(&equals, &row(&[("first_name", Value::Null)])));

        let null = rules(&[ExcludeDef {
            null: true,
            ..ExcludeDef::default()
        }]);
        assert!(excluded(&null, &row(&[("first_name", Value::Null)])));
        assert!(!excluded(&null, &row(&[("first_name", Value::from(""))])));
    }

    #[test]
    fn not_conditions_are_ored_across_columns() {
        let list = rules(&[
            ExcludeDef {
                name: Some("country".to_string()),
                not_equals: Some("PT".into()),
                ..ExcludeDef::default()
            },
            ExcludeDef {
                name: Some("email".to_string()),
                not_like: Some("%@corp.example".to_string()),
                ..ExcludeDef::default()
            },
        ]);

        // both inclusions fail: excluded
        assert!(excluded(
            &list,
            &row(&[
                ("country", Value::from("PT")),
                ("email", Value::from("ana@corp.example")),
            ])
        ));
        // one holds: anonymized
        assert!(!excluded(
            &list,
            &row(&[
                ("country", Value::from("ES")),
                ("email", Value::from("ana@corp.example")),
            ])
        ));
        // NULL satisfies no inclusion
        assert!(excluded(
            &list,
            &row(&[("country", Value::Null), ("email", Value::Null)])
        ));
    }

    #[test]
    fn exclusion_wins_over_inclusion() {
        let list = rules(&[ExcludeDef {
            equals: Some("x".into()),
            not_in: vec!["y".into()],
            ..ExcludeDef::default()
        }]);
        assert!(excluded(&list, &row(&[("first_name", Value::from("x"))])));
        assert!(!excluded(&list, &row(&[("first_name", Value::from("z"))])));
        assert!(excluded(&list, &row(&[("first_name", Value::from("y"))])));
    }

    #[test]
    fn table_level_excludes_need_a_column() {
        let err = ExcludeRules::from_defs(
            "users",
            &[ExcludeDef {
                equals: Some("x".into()),
                ..ExcludeDef::default()
            }],
            None,
        )
        .expect_err("missing name");
        assert!(matches!(err, AnonymizeError::InvalidExclude { .. }));
    }

    #[test]
    fn sql_predicate_binds_literals() {
        let list = ExcludeRules::from_defs(
            "users",
            &[
                ExcludeDef {
                    name: Some("role".to_string()),
                    in_list: vec!["admin".into(), "service".into()],
                    null: true,
                    ..ExcludeDef::default()
                },
                ExcludeDef {
                    name: Some("email".to_string()),
                    not_like: Some("%@corp.example".to_string()),
                    ..ExcludeDef::default()
                },
            ],
            None,
        )
        .expect("rules");

        let mut params = vec![Value::from("earlier")];
        let sql = list
            .sql_predicate(Dialect::Postgres, |column| format!("\"{column}\""), &mut params)
            .expect("predicate");
        assert_eq!(
            sql,
            "NOT COALESCE((\"role\" IS NULL OR CAST(\"role\" AS TEXT) IN ($2, $3)), FALSE) \
             AND COALESCE((CAST(\"email\" AS TEXT) NOT LIKE $4), FALSE)"
        );
        assert_eq!(
            params,
            vec![
                Value::from("earlier"),
                Value::from("admin"),
                Value::from("service"),
                Value::from("%@corp.example"),
            ]
        );
        assert!(ExcludeRules::default()
            .sql_predicate(Dialect::Postgres, str::to_string, &mut params)
            .is_none());
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&Value::from("")));
        assert!(!is_empty_value(&Value::from(" ")));
        assert!(!is_empty_value(&Value::Int(0)));
    }
}
