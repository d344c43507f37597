//! Resolved plans: a chain of functions optionally merged by a combiner.

use veil_core::{Value, ValueType, convert, is_convertible};
use veil_policy::PlanDef;

use crate::catalog::{CallContext, FunctionCatalog};
use crate::errors::FunctionError;
use crate::function_ref::{ResolveRequest, ResolvedFunction, resolve};
use crate::samples::SampleRequest;

#[derive(Debug, Clone)]
struct PlanStep {
    function: ResolvedFunction,
    glue: Option<Value>,
}

/// Plan whose references were all bound to catalog overloads.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    steps: Vec<PlanStep>,
    combiner: Option<ResolvedFunction>,
    output: ValueType,
}

/// Fold accumulator threaded through the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    /// Output of the latest step, fed into the next one.
    pub running: Value,
    /// Combiner result so far; equals `running` after the first step.
    pub combined: Value,
    /// Glue merged before the next step's output.
    pub pending_glue: Option<Value>,
}

impl ResolvedPlan {
    /// Resolve every reference of `plan` for a column of type `input`
    /// producing `output`.
    pub fn resolve(
        plan: &PlanDef,
        catalog: &FunctionCatalog,
        input: &ValueType,
        output: &ValueType,
    ) -> Result<Self, FunctionError> {
        if plan.functions.is_empty() {
            return Err(FunctionError::InvalidPlan(
                "plan requires at least one function".to_string(),
            ));
        }

        let last = plan.functions.len() - 1;
        let mut running = input.clone();
        let mut steps = Vec::with_capacity(plan.functions.len());
        for (idx, function) in plan.functions.iter().enumerate() {
            let returns = if idx == last && plan.combiner.is_none() {
                output.clone()
            } else {
                ValueType::Any
            };
            let request =
                ResolveRequest::step(&function.name, &function.arguments, running.clone(), returns);
            let resolved = resolve(catalog, &request)?;
            running = resolved.returns().clone();
            steps.push(PlanStep {
                function: resolved,
                glue: function
                    .glue
                    .as_ref()
                    .or(plan.glue.as_ref())
                    .map(Value::from_json)
                    .filter(|glue| !glue.is_null()),
            });
        }

        let combiner = match &plan.combiner {
            Some(def) => Some(resolve_combiner(def, &steps, catalog, output)?),
            None => None,
        };

        Ok(Self {
            steps,
            combiner,
            output: output.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Columns sampled by any step of the plan.
    pub fn sample_requests(&self) -> Vec<SampleRequest> {
        self.steps
            .iter()
            .filter_map(|step| step.function.sample_request())
            .collect()
    }

    /// Run the chain on `seed` and convert the result to the output type.
    pub fn invoke(&self, ctx: &mut CallContext<'_>, seed: &Value) -> Result<Value, FunctionError> {
        let mut state = ChainState {
            running: seed.clone(),
            combined: Value::Null,
            pending_glue: None,
        };
        for (idx, step) in self.steps.iter().enumerate() {
            state = self.advance(ctx, state, idx, step)?;
        }

        let result = if self.combiner.is_some() {
            state.combined
        } else {
            state.running
        };
        convert(result, &self.output).map_err(|source| FunctionError::Conversion {
            reference: "plan output".to_string(),
            source,
        })
    }

    fn advance(
        &self,
        ctx: &mut CallContext<'_>,
        state: ChainState,
        idx: usize,
        step: &PlanStep,
    ) -> Result<ChainState, FunctionError> {
        let out = step.function.invoke(ctx, &state.running)?;
        let combined = match &self.combiner {
            _ if idx == 0 => out.clone(),
            None => Value::Null,
            Some(combiner) => {
                let mut combined = state.combined;
                if let Some(glue) = state.pending_glue {
                    combined = combiner.combine(ctx, combined, glue)?;
                }
                combiner.combine(ctx, combined, out.clone())?
            }
        };
        Ok(ChainState {
            running: out,
            combined,
            pending_glue: step.glue.clone(),
        })
    }
}

fn resolve_combiner(
    def: &veil_policy::FunctionDef,
    steps: &[PlanStep],
    catalog: &FunctionCatalog,
    output: &ValueType,
) -> Result<ResolvedFunction, FunctionError> {
    if !def.arguments.is_empty() {
        return Err(FunctionError::InvalidPlan(format!(
            "combiner '{}' must not declare arguments",
            def.name
        )));
    }

    let first = steps[0].function.returns().clone();
    let second = steps
        .get(1)
        .map(|step| step.function.returns().clone())
        .unwrap_or_else(|| first.clone());
    let combiner = resolve(
        catalog,
        &ResolveRequest::combiner(&def.name, first, second, output.clone()),
    )?;

    let right = combiner.right_type();
    for step in steps.iter().skip(2) {
        if !is_convertible(step.function.returns(), right) {
            return Err(FunctionError::InvalidPlan(format!(
                "combiner '{}' cannot merge {} returned by '{}'",
                def.name,
                step.function.returns(),
                step.function.reference()
            )));
        }
    }
    for glue in steps.iter().filter_map(|step| step.glue.as_ref()) {
        if !is_convertible(&glue.value_type(), right) {
            return Err(FunctionError::InvalidPlan(format!(
                "combiner '{}' cannot merge glue of type {}",
                def.name,
                glue.value_type()
            )));
        }
    }
    if !is_convertible(combiner.returns(), combiner.left_type()) {
        return Err(FunctionError::InvalidPlan(format!(
            "combiner '{}' returns {} which it cannot accept back as {}",
            def.name,
            combiner.returns(),
            combiner.left_type()
        )));
    }
    Ok(combiner)
}
