//! Tool registry and adapter.
//!
//! Every capability the reasoning loops can invoke is a [`ToolDescriptor`]:
//! a name, a [`ToolSchema`] generated from a typed [`ToolParams`] struct and
//! a [`ToolHandler`]. [`ToolRegistry::dispatch`]
//! is the single place where malformed arguments are absorbed into a failed
//! [`Observation`].

mod observation;
mod registry;
mod schema;

pub use observation::{ErrorKind, Observation};
pub use registry::{ToolDescriptor, ToolHandler, ToolRegistry};
pub use schema::{
    check_min, check_not_blank, check_ordered, check_range, input_schema, parse_arguments, text,
    NoParams, ToolArguments, ToolParams, ToolSchema,
};
