//! Function catalog, reference resolution and plan execution.
//!
//! Plans name functions as `Type#member`. Every reference is resolved once,
//! before any row is read, to the overload whose parameters the declared
//! arguments convert into most cheaply.

mod builtins;
pub mod catalog;
pub mod errors;
pub mod function_ref;
pub mod plan;
pub mod samples;

pub use catalog::{
    Args, CallContext, DescriptorBuilder, FunctionCatalog, FunctionDescriptor, Param, Signature,
};
pub use errors::{CallError, FunctionError};
pub use function_ref::{ResolveMode, ResolveRequest, ResolvedFunction, parse_reference, resolve};
pub use plan::{ChainState, ResolvedPlan};
pub use samples::{SampleRequest, SampleStore};
