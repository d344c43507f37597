use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use veil_core::{Value, ValueType};

use crate::builtins;
use crate::errors::CallError;
use crate::samples::SampleStore;

/// State handed to every function body.
pub struct CallContext<'a> {
    pub rng: &'a mut ChaCha8Rng,
    pub samples: &'a SampleStore,
}

impl<'a> CallContext<'a> {
    pub fn new(rng: &'a mut ChaCha8Rng, samples: &'a SampleStore) -> Self {
        Self { rng, samples }
    }
}

static NULL: Value = Value::Null;

/// Arguments already converted to the declared parameter types.
#[derive(Debug, Clone, Default)]
pub struct Args {
    receiver: Option<Value>,
    values: Vec<Value>,
}

impl Args {
    pub fn new(receiver: Option<Value>, values: Vec<Value>) -> Self {
        Self { receiver, values }
    }

    /// Receiver of an instance member; `Null` for static members.
    pub fn receiver(&self) -> &Value {
        self.receiver.as_ref().unwrap_or(&NULL)
    }

    pub fn get(&self, index: usize) -> &Value {
        self.values.get(index).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn int(&self, index: usize) -> Result<i64, CallError> {
        self.get(index)
            .as_i64()
            .ok_or_else(|| CallError::new(format!("argument {index} must be an integer")))
    }

    pub fn float(&self, index: usize) -> Result<f64, CallError> {
        self.get(index)
            .as_f64()
            .ok_or_else(|| CallError::new(format!("argument {index} must be a number")))
    }

    pub fn text(&self, index: usize) -> Result<&str, CallError> {
        self.get(index)
            .as_str()
            .ok_or_else(|| CallError::new(format!("argument {index} must be text")))
    }
}

/// Boxed function body.
pub type Invoker =
    Arc<dyn Fn(&mut CallContext<'_>, &Args) -> Result<Value, CallError> + Send + Sync>;

/// Named, typed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

/// Callable registered under `type_name#member`.
#[derive(Clone)]
pub struct FunctionDescriptor {
    pub type_name: String,
    pub member: String,
    /// Receiver type for instance members, bound to the running value.
    pub receiver: Option<ValueType>,
    pub params: Vec<Param>,
    pub returns: ValueType,
    /// Draws from values already stored in the database.
    pub sampling: bool,
    invoker: Invoker,
}

impl FunctionDescriptor {
    pub fn builder(
        type_name: impl Into<String>,
        member: impl Into<String>,
        returns: ValueType,
    ) -> DescriptorBuilder {
        DescriptorBuilder {
            type_name: type_name.into(),
            member: member.into(),
            receiver: None,
            params: Vec::new(),
            returns,
            sampling: false,
        }
    }

    pub fn reference(&self) -> String {
        format!("{}#{}", self.type_name, self.member)
    }

    pub fn is_instance(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|param| param.name == name)
    }

    pub fn call(&self, ctx: &mut CallContext<'_>, args: &Args) -> Result<Value, CallError> {
        (self.invoker)(ctx, args)
    }

    pub fn signature(&self) -> Signature {
        Signature {
            reference: self.reference(),
            receiver: self.receiver.clone(),
            params: self.params.clone(),
            returns: self.returns.clone(),
            sampling: self.sampling,
        }
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("signature", &self.signature().to_string())
            .finish()
    }
}

/// Builder for [`FunctionDescriptor`].
pub struct DescriptorBuilder {
    type_name: String,
    member: String,
    receiver: Option<ValueType>,
    params: Vec<Param>,
    returns: ValueType,
    sampling: bool,
}

impl DescriptorBuilder {
    pub fn receiver(mut self, ty: ValueType) -> Self {
        self.receiver = Some(ty);
        self
    }

    pub fn param(mut self, name: &str, ty: ValueType) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty,
        });
        self
    }

    pub fn sampling(mut self) -> Self {
        self.sampling = true;
        self
    }

    pub fn invoke<F>(self, invoker: F) -> FunctionDescriptor
    where
        F: Fn(&mut CallContext<'_>, &Args) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        FunctionDescriptor {
            type_name: self.type_name,
            member: self.member,
            receiver: self.receiver,
            params: self.params,
            returns: self.returns,
            sampling: self.sampling,
            invoker: Arc::new(invoker),
        }
    }
}

/// Printable function signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ValueType>,
    pub params: Vec<Param>,
    pub returns: ValueType,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sampling: bool,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.reference)?;
        let mut first = true;
        if let Some(receiver) = &self.receiver {
            write!(f, "self: {receiver}")?;
            first = false;
        }
        for param in &self.params {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
            first = false;
        }
        write!(f, ") -> {}", self.returns)
    }
}

/// Registry of callable functions keyed by `(type, member)`.
///
/// Overloads keep registration order, which breaks ties during resolution.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    entries: BTreeMap<(String, String), Vec<Arc<FunctionDescriptor>>>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every built-in module registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        builtins::register_all(&mut catalog);
        catalog
    }

    pub fn register(&mut self, descriptor: FunctionDescriptor) {
        let key = (descriptor.type_name.clone(), descriptor.member.clone());
        self.entries
            .entry(key)
            .or_default()
            .push(Arc::new(descriptor));
    }

    /// Overloads of `type_name#member` in registration order.
    pub fn candidates(&self, type_name: &str, member: &str) -> &[Arc<FunctionDescriptor>] {
        self.entries
            .get(&(type_name.to_string(), member.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every registered signature, sorted by reference.
    pub fn signatures(&self) -> Vec<Signature> {
        self.entries
            .values()
            .flat_map(|overloads| overloads.iter().map(|descriptor| descriptor.signature()))
            .collect()
    }
}
