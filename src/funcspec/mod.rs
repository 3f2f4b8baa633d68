//! Function specifications: describing a function on one side of the
//! boundary so it can be called from the other.
//!
//! The provider builds a [`FuncSpec`] with [`spec()`]; the caller turns the
//! spec back into a local [`Func`](crate::argmapper::Func) with [`func()`];
//! the values that wrapper collects travel as [`Args`].

pub mod args;
pub mod func;
pub mod spec;

use thiserror::Error;

use crate::argmapper::ValueError;

pub use args::{Arg, Args};
pub use func::{func, CANCEL_ARG};
pub use spec::{spec, ArgSource, FuncSpec, SpecArg};

/// Errors building or using a function specification.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("function `{func}` declares argument `{arg}` more than once")]
    DuplicateArg { func: String, arg: String },

    #[error("caller argument `{0}` has no value")]
    MissingArg(String),

    #[error("caller argument `{arg}` cannot be encoded: {source}")]
    Encode { arg: String, source: ValueError },
}
