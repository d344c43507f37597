//! Binding a `Type#member` reference and its declared arguments to one
//! catalog overload.
//!
//! Candidates are filtered by arity, then by whether the running value, every
//! bound argument and the return type convert to what the overload declares.
//! The survivor with the lowest summed conversion distance wins; ties keep the
//! overload registered first.

use std::sync::Arc;

use tracing::debug;
use veil_core::{Value, ValueType, conversion_distance, convert, is_convertible};
use veil_policy::{ArgumentDef, ArgumentKind};

use crate::catalog::{Args, CallContext, FunctionCatalog, FunctionDescriptor};
use crate::errors::FunctionError;
use crate::samples::SampleRequest;

static ANY: ValueType = ValueType::Any;

/// Role of the reference inside a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Chain step fed by the running value.
    Step,
    /// Binary function merging two chain values.
    Combiner,
}

/// What the caller needs the reference to accept and produce.
#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    pub reference: &'a str,
    pub arguments: &'a [ArgumentDef],
    /// Type of the running value; for combiners, the left operand.
    pub input: ValueType,
    /// Right operand type, combiners only.
    pub operand: Option<ValueType>,
    pub returns: ValueType,
    pub mode: ResolveMode,
}

impl<'a> ResolveRequest<'a> {
    pub fn step(
        reference: &'a str,
        arguments: &'a [ArgumentDef],
        input: ValueType,
        returns: ValueType,
    ) -> Self {
        Self {
            reference,
            arguments,
            input,
            operand: None,
            returns,
            mode: ResolveMode::Step,
        }
    }

    pub fn combiner(reference: &'a str, left: ValueType, right: ValueType, returns: ValueType) -> Self {
        Self {
            reference,
            arguments: &[],
            input: left,
            operand: Some(right),
            returns,
            mode: ResolveMode::Combiner,
        }
    }

    fn describe(&self) -> String {
        match self.mode {
            ResolveMode::Step => format!(
                "input {} with {} argument(s) returning {}",
                self.input,
                self.arguments.len(),
                self.returns
            ),
            ResolveMode::Combiner => format!(
                "operands ({}, {}) returning {}",
                self.input,
                self.operand.as_ref().unwrap_or(&self.input),
                self.returns
            ),
        }
    }
}

/// Source of one parameter value at invocation time.
#[derive(Debug, Clone, PartialEq)]
enum Binding {
    /// Literal converted to the parameter type during resolution.
    Fixed(Value),
    /// The running value, converted at invocation.
    Running,
}

/// Declared argument reduced to a value source and its static type.
struct Bound {
    binding: Binding,
    ty: ValueType,
}

/// Reference bound to a single overload with its arguments.
#[derive(Debug, Clone)]
pub struct ResolvedFunction {
    reference: String,
    descriptor: Arc<FunctionDescriptor>,
    bindings: Vec<Binding>,
    distance: u32,
}

impl ResolvedFunction {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn returns(&self) -> &ValueType {
        &self.descriptor.returns
    }

    /// Summed conversion distance of the selected overload.
    pub fn distance(&self) -> u32 {
        self.distance
    }

    /// Parameter type receiving the left operand of a combiner.
    pub fn left_type(&self) -> &ValueType {
        match &self.descriptor.receiver {
            Some(receiver) => receiver,
            None => self
                .descriptor
                .params
                .first()
                .map(|param| &param.ty)
                .unwrap_or(&ANY),
        }
    }

    /// Parameter type receiving the right operand of a combiner.
    pub fn right_type(&self) -> &ValueType {
        let index = if self.descriptor.is_instance() { 0 } else { 1 };
        self.descriptor
            .params
            .get(index)
            .map(|param| &param.ty)
            .unwrap_or(&ANY)
    }

    /// Table/column pairs read by a sampling function.
    pub fn sample_request(&self) -> Option<SampleRequest> {
        if !self.descriptor.sampling {
            return None;
        }
        let fixed_text = |name: &str| {
            let index = self.descriptor.param_index(name)?;
            match self.bindings.get(index)? {
                Binding::Fixed(Value::Text(text)) => Some(text.clone()),
                _ => None,
            }
        };
        Some(SampleRequest::new(fixed_text("table")?, fixed_text("column")?))
    }

    /// Invoke as a chain step with the running value.
    pub fn invoke(&self, ctx: &mut CallContext<'_>, running: &Value) -> Result<Value, FunctionError> {
        let receiver = match &self.descriptor.receiver {
            Some(ty) => Some(self.convert(running.clone(), ty)?),
            None => None,
        };
        let mut values = Vec::with_capacity(self.bindings.len());
        for (binding, param) in self.bindings.iter().zip(&self.descriptor.params) {
            let value = match binding {
                Binding::Fixed(value) => value.clone(),
                Binding::Running => self.convert(running.clone(), &param.ty)?,
            };
            values.push(value);
        }
        self.call(ctx, Args::new(receiver, values))
    }

    /// Invoke as a combiner merging `left` and `right`.
    pub fn combine(
        &self,
        ctx: &mut CallContext<'_>,
        left: Value,
        right: Value,
    ) -> Result<Value, FunctionError> {
        let left = self.convert(left, &self.left_type().clone())?;
        let right = self.convert(right, &self.right_type().clone())?;
        let args = if self.descriptor.is_instance() {
            Args::new(Some(left), vec![right])
        } else {
            Args::new(None, vec![left, right])
        };
        self.call(ctx, args)
    }

    fn call(&self, ctx: &mut CallContext<'_>, args: Args) -> Result<Value, FunctionError> {
        self.descriptor
            .call(ctx, &args)
            .map_err(|source| FunctionError::Invocation {
                reference: self.reference.clone(),
                source,
            })
    }

    fn convert(&self, value: Value, ty: &ValueType) -> Result<Value, FunctionError> {
        convert(value, ty).map_err(|source| FunctionError::Conversion {
            reference: self.reference.clone(),
            source,
        })
    }
}

/// Split `Type#member`.
pub fn parse_reference(reference: &str) -> Result<(&str, &str), FunctionError> {
    match reference.split_once('#') {
        Some((type_name, member))
            if !type_name.trim().is_empty() && !member.trim().is_empty() && !member.contains('#') =>
        {
            Ok((type_name.trim(), member.trim()))
        }
        _ => Err(FunctionError::InvalidReference(reference.to_string())),
    }
}

/// Resolve a reference against the catalog.
pub fn resolve(
    catalog: &FunctionCatalog,
    request: &ResolveRequest<'_>,
) -> Result<ResolvedFunction, FunctionError> {
    let (type_name, member) = parse_reference(request.reference)?;
    let arguments = prepare_arguments(request)?;
    let overloads = catalog.candidates(type_name, member);

    let mut best: Option<(u32, ResolvedFunction)> = None;
    for descriptor in overloads {
        let Some(candidate) = bind_candidate(request, descriptor, &arguments) else {
            continue;
        };
        // strictly lower only: earlier registrations win ties
        if best
            .as_ref()
            .is_none_or(|(distance, _)| candidate.distance < *distance)
        {
            best = Some((candidate.distance, candidate));
        }
    }

    match best {
        Some((_, resolved)) => {
            debug!(
                reference = request.reference,
                signature = %resolved.descriptor.signature(),
                distance = resolved.distance,
                "function resolved"
            );
            Ok(resolved)
        }
        None => Err(FunctionError::NotFound {
            reference: request.reference.to_string(),
            request: request.describe(),
            considered: overloads
                .iter()
                .map(|descriptor| descriptor.signature().to_string())
                .collect(),
        }),
    }
}

/// Declared argument with its literal normalized and its binding target.
struct PreparedArgument {
    name: Option<String>,
    index: Option<usize>,
    kind: ArgumentKind,
    ty: Option<ValueType>,
}

fn prepare_arguments(request: &ResolveRequest<'_>) -> Result<Vec<PreparedArgument>, FunctionError> {
    let invalid = |message: String| FunctionError::InvalidArgument {
        reference: request.reference.to_string(),
        message,
    };

    request
        .arguments
        .iter()
        .enumerate()
        .map(|(position, argument)| {
            let kind = argument.kind().ok_or_else(|| {
                invalid(format!(
                    "argument {position} must set exactly one of value, values or dynamic"
                ))
            })?;
            // a declared type is applied to the literal before overloads are compared
            let (kind, ty) = match (kind, &argument.value_type) {
                (ArgumentKind::Literal(value), Some(ty)) => {
                    let value = convert(value, ty).map_err(|err| {
                        invalid(format!("argument {position} is not a valid {ty}: {err}"))
                    })?;
                    (ArgumentKind::Literal(value), Some(ty.clone()))
                }
                (ArgumentKind::Array(values), Some(ty)) => {
                    let element = ty.element().cloned().unwrap_or_else(|| ty.clone());
                    let values = values
                        .into_iter()
                        .map(|value| convert(value, &element))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|err| {
                            invalid(format!("argument {position} is not a valid {ty}: {err}"))
                        })?;
                    (ArgumentKind::Array(values), Some(ValueType::list_of(element)))
                }
                (kind, _) => (kind, None),
            };
            Ok(PreparedArgument {
                name: argument.name.clone(),
                index: argument.index,
                kind,
                ty,
            })
        })
        .collect()
}

fn bind_candidate(
    request: &ResolveRequest<'_>,
    descriptor: &Arc<FunctionDescriptor>,
    arguments: &[PreparedArgument],
) -> Option<ResolvedFunction> {
    if !is_convertible(&descriptor.returns, &request.returns) {
        return None;
    }

    let mut distance = 0;
    let bindings = match request.mode {
        ResolveMode::Combiner => {
            let right = request.operand.as_ref().unwrap_or(&request.input);
            let (left_ty, right_ty) = match (&descriptor.receiver, descriptor.params.as_slice()) {
                (Some(receiver), [param]) => (receiver, &param.ty),
                (None, [first, second]) => (&first.ty, &second.ty),
                _ => return None,
            };
            distance += conversion_distance(&request.input, left_ty)?;
            distance += conversion_distance(right, right_ty)?;
            Vec::new()
        }
        ResolveMode::Step => {
            if descriptor.params.len() != arguments.len() {
                return None;
            }
            if let Some(receiver) = &descriptor.receiver {
                distance += conversion_distance(&request.input, receiver)?;
            }
            let slots = assign_slots(descriptor, arguments)?;
            let mut bindings = Vec::with_capacity(slots.len());
            for (argument, param) in slots.into_iter().zip(&descriptor.params) {
                let bound = bound_argument(argument, &request.input)?;
                distance += conversion_distance(&bound.ty, &param.ty)?;
                let binding = match bound.binding {
                    Binding::Fixed(value) => Binding::Fixed(convert(value, &param.ty).ok()?),
                    Binding::Running => Binding::Running,
                };
                bindings.push(binding);
            }
            bindings
        }
    };

    Some(ResolvedFunction {
        reference: request.reference.to_string(),
        descriptor: Arc::clone(descriptor),
        bindings,
        distance,
    })
}

/// Place arguments on parameters: by name, then explicit index, then next free slot.
fn assign_slots<'a>(
    descriptor: &FunctionDescriptor,
    arguments: &'a [PreparedArgument],
) -> Option<Vec<&'a PreparedArgument>> {
    let mut slots: Vec<Option<&PreparedArgument>> = vec![None; descriptor.params.len()];

    for argument in arguments {
        if let Some(name) = &argument.name {
            place(&mut slots, descriptor.param_index(name)?, argument)?;
        }
    }
    for argument in arguments.iter().filter(|argument| argument.name.is_none()) {
        if let Some(index) = argument.index {
            place(&mut slots, index, argument)?;
        }
    }
    for argument in arguments
        .iter()
        .filter(|argument| argument.name.is_none() && argument.index.is_none())
    {
        let free = slots.iter().position(Option::is_none)?;
        place(&mut slots, free, argument)?;
    }

    slots.into_iter().collect()
}

fn place<'a>(
    slots: &mut [Option<&'a PreparedArgument>],
    slot: usize,
    argument: &'a PreparedArgument,
) -> Option<()> {
    let entry = slots.get_mut(slot)?;
    if entry.is_some() {
        return None;
    }
    *entry = Some(argument);
    Some(())
}

fn bound_argument(argument: &PreparedArgument, running: &ValueType) -> Option<Bound> {
    match &argument.kind {
        ArgumentKind::Dynamic => Some(Bound {
            binding: Binding::Running,
            ty: running.clone(),
        }),
        ArgumentKind::Literal(value) => Some(Bound {
            ty: argument.ty.clone().unwrap_or_else(|| value.value_type()),
            binding: Binding::Fixed(value.clone()),
        }),
        ArgumentKind::Array(values) => {
            let value = Value::List(values.clone());
            Some(Bound {
                ty: argument.ty.clone().unwrap_or_else(|| value.value_type()),
                binding: Binding::Fixed(value),
            })
        }
    }
}
