//! The serializable description of what a function needs.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::SpecError;
use crate::argmapper::{satisfiable, Func, Param, ValueSet};

/// Where an argument's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSource {
    /// Injected on the provider side from its own values and converters.
    Context,
    /// Must arrive in the call payload.
    Caller,
}

/// One argument of a [`FuncSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecArg {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub source: ArgSource,
}

impl SpecArg {
    pub fn param(&self) -> Param {
        Param::new(&self.name, &self.type_name)
    }
}

/// Description of a function's inputs and results, independent of any call.
///
/// Argument names are unique; [`FuncSpec::new`] and deserialization through
/// [`FuncSpec::validate`] reject duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncSpec {
    pub name: String,
    pub args: Vec<SpecArg>,
    #[serde(default)]
    pub results: Vec<Param>,
}

impl FuncSpec {
    pub fn new(
        name: impl Into<String>,
        args: Vec<SpecArg>,
        results: Vec<Param>,
    ) -> Result<Self, SpecError> {
        let spec = Self {
            name: name.into(),
            args,
            results,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the argument-name uniqueness invariant.
    pub fn validate(&self) -> Result<(), SpecError> {
        let mut seen = HashSet::new();
        for arg in &self.args {
            if !seen.insert(arg.name.as_str()) {
                return Err(SpecError::DuplicateArg {
                    func: self.name.clone(),
                    arg: arg.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Arguments the caller must put in the call payload.
    pub fn caller_args(&self) -> impl Iterator<Item = &SpecArg> {
        self.args.iter().filter(|a| a.source == ArgSource::Caller)
    }

    /// Arguments the provider injects itself.
    pub fn context_args(&self) -> impl Iterator<Item = &SpecArg> {
        self.args.iter().filter(|a| a.source == ArgSource::Context)
    }
}

impl fmt::Display for FuncSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let marker = match arg.source {
                ArgSource::Context => "ctx ",
                ArgSource::Caller => "",
            };
            write!(f, "{}{}: {}", marker, arg.name, arg.type_name)?;
        }
        write!(f, ")")
    }
}

/// Introspect `func` against the values and converters available locally.
///
/// An input the provider can satisfy by itself becomes a
/// [`ArgSource::Context`] argument; everything else must come from the caller.
pub fn spec(func: &Func, converters: &[Func], context: &ValueSet) -> Result<FuncSpec, SpecError> {
    let args = func
        .inputs()
        .iter()
        .map(|input| SpecArg {
            name: input.name.clone(),
            type_name: input.type_name.clone(),
            source: if satisfiable(input, context, converters) {
                ArgSource::Context
            } else {
                ArgSource::Caller
            },
        })
        .collect();

    FuncSpec::new(func.name(), args, func.outputs().to_vec())
}
