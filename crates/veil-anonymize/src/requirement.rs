//! Policy documents resolved against the function catalog.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};
use veil_core::{Value, ValueType};
use veil_functions::{FunctionCatalog, FunctionError, ResolvedPlan, SampleRequest};
use veil_policy::{ColumnDef, PlanDef, Requirement, TableDef};

use crate::errors::AnonymizeError;
use crate::exclude::{ExcludeRules, is_empty_value};

/// Column with its plan resolved and its excludes bound.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub name: String,
    pub value_type: ValueType,
    pub ignore_empty: bool,
    pub plan: Arc<ResolvedPlan>,
    pub excludes: ExcludeRules,
}

impl ResolvedColumn {
    /// Whether the current row keeps its value for this column.
    pub fn is_excluded<'v>(
        &self,
        current: &Value,
        lookup: impl Fn(&str) -> Option<&'v Value>,
    ) -> bool {
        (self.ignore_empty && is_empty_value(current)) || self.excludes.excludes(lookup)
    }
}

/// Table ready for preflight: keys still unverified against metadata.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub name: String,
    pub filter: Option<String>,
    pub declared_keys: Vec<String>,
    pub columns: Vec<ResolvedColumn>,
    pub excludes: ExcludeRules,
}

impl ResolvedTable {
    /// Columns read only to evaluate column-level excludes.
    pub fn extra_columns(&self) -> Vec<&str> {
        let mut extras: Vec<&str> = Vec::new();
        for column in &self.columns {
            for name in column.excludes.columns() {
                let known = self
                    .columns
                    .iter()
                    .map(|column| column.name.as_str())
                    .chain(self.declared_keys.iter().map(String::as_str))
                    .chain(extras.iter().copied())
                    .any(|seen| seen.eq_ignore_ascii_case(name));
                if !known {
                    extras.push(name);
                }
            }
        }
        extras
    }

    /// Columns sampled by the plans of this table.
    pub fn sample_requests(&self) -> impl Iterator<Item = SampleRequest> + '_ {
        self.columns
            .iter()
            .flat_map(|column| column.plan.sample_requests())
    }

    pub fn matches(&self, filter: &str) -> bool {
        self.name.eq_ignore_ascii_case(filter)
            || self
                .name
                .rsplit_once('.')
                .is_some_and(|(_, bare)| bare.eq_ignore_ascii_case(filter))
    }
}

/// Every table of a document with plans resolved once.
#[derive(Debug, Clone)]
pub struct ResolvedRequirement {
    pub project: String,
    pub seed: Option<u64>,
    pub tables: Vec<ResolvedTable>,
}

impl ResolvedRequirement {
    /// Resolve every plan and exclude of `requirement`.
    ///
    /// Global plans are resolved once per column type they are used with and
    /// shared between columns.
    pub fn resolve(
        requirement: &Requirement,
        catalog: &FunctionCatalog,
    ) -> Result<Self, AnonymizeError> {
        let index = requirement.plan_index();
        let mut shared: HashMap<(String, ValueType), Arc<ResolvedPlan>> = HashMap::new();
        let mut tables = Vec::with_capacity(requirement.tables.len());

        for table in &requirement.tables {
            tables.push(resolve_table(table, catalog, &index, &mut shared)?);
        }

        debug!(
            project = %requirement.project,
            tables = tables.len(),
            shared_plans = shared.len(),
            "requirement resolved"
        );
        Ok(Self {
            project: requirement.project.clone(),
            seed: requirement.seed,
            tables,
        })
    }
}

fn resolve_table(
    table: &TableDef,
    catalog: &FunctionCatalog,
    index: &BTreeMap<&str, &PlanDef>,
    shared: &mut HashMap<(String, ValueType), Arc<ResolvedPlan>>,
) -> Result<ResolvedTable, AnonymizeError> {
    let mut columns: Vec<ResolvedColumn> = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        if columns
            .iter()
            .any(|seen| seen.name.eq_ignore_ascii_case(&column.name))
        {
            warn!(
                table = %table.name,
                column = %column.name,
                "duplicate column ignored"
            );
            continue;
        }
        let plan = resolve_column_plan(table, column, catalog, index, shared)?;
        columns.push(ResolvedColumn {
            name: column.name.clone(),
            value_type: column.value_type.clone(),
            ignore_empty: column.ignore_empty,
            plan,
            excludes: ExcludeRules::from_defs(&table.name, &column.excludes, Some(&column.name))?,
        });
    }

    Ok(ResolvedTable {
        name: table.name.clone(),
        filter: table
            .filter
            .as_ref()
            .map(|filter| filter.trim().to_string())
            .filter(|filter| !filter.is_empty()),
        declared_keys: table.declared_keys(),
        columns,
        excludes: ExcludeRules::from_defs(&table.name, &table.excludes, None)?,
    })
}

fn resolve_column_plan(
    table: &TableDef,
    column: &ColumnDef,
    catalog: &FunctionCatalog,
    index: &BTreeMap<&str, &PlanDef>,
    shared: &mut HashMap<(String, ValueType), Arc<ResolvedPlan>>,
) -> Result<Arc<ResolvedPlan>, AnonymizeError> {
    let plan_error = |source: FunctionError| AnonymizeError::Plan {
        table: table.name.clone(),
        column: column.name.clone(),
        source,
    };
    let ty = &column.value_type;

    match (&column.plan, &column.plan_ref) {
        (Some(plan), None) => ResolvedPlan::resolve(plan, catalog, ty, ty)
            .map(Arc::new)
            .map_err(plan_error),
        (None, Some(plan_ref)) => {
            let key = (plan_ref.clone(), ty.clone());
            if let Some(plan) = shared.get(&key) {
                return Ok(Arc::clone(plan));
            }
            let def = index
                .get(plan_ref.as_str())
                .ok_or_else(|| AnonymizeError::UnknownPlan {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    plan_ref: plan_ref.clone(),
                })?;
            let plan = Arc::new(ResolvedPlan::resolve(def, catalog, ty, ty).map_err(plan_error)?);
            shared.insert(key, Arc::clone(&plan));
            Ok(plan)
        }
        _ => Err(AnonymizeError::Plan {
            table: table.name.clone(),
            column: column.name.clone(),
            source: FunctionError::InvalidPlan(
                "declare exactly one of plan or plan_ref".to_string(),
            ),
        }),
    }
}
