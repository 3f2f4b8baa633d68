//! Caller-supplied argument values as they travel in a call request.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::spec::FuncSpec;
use super::SpecError;
use crate::argmapper::{Arguments, ResolveError, Value, ValueSet};

/// One encoded argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: JsonValue,
}

/// The payload of a call: the caller-supplied arguments of a [`FuncSpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Args {
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Encode the caller arguments of `spec` from resolved `arguments`.
    pub fn from_arguments(spec: &FuncSpec, arguments: &Arguments) -> Result<Self, SpecError> {
        let mut args = Vec::new();
        for spec_arg in spec.caller_args() {
            let value = arguments
                .value(&spec_arg.name)
                .ok_or_else(|| SpecError::MissingArg(spec_arg.name.clone()))?;
            let json = value.encode().map_err(|source| SpecError::Encode {
                arg: spec_arg.name.clone(),
                source,
            })?;
            args.push(Arg {
                name: spec_arg.name.clone(),
                type_name: spec_arg.type_name.clone(),
                value: json,
            });
        }
        Ok(Self { args })
    }

    /// Check that every entry is a caller argument of `spec`, by name and type.
    ///
    /// Anything else would shadow a value the provider supplies itself.
    pub fn check_caller_args(&self, spec: &FuncSpec) -> Result<(), ResolveError> {
        for arg in &self.args {
            let expected = spec
                .caller_args()
                .any(|a| a.name == arg.name && a.type_name == arg.type_name);
            if !expected {
                return Err(ResolveError::UnexpectedArg {
                    name: arg.name.clone(),
                    type_name: arg.type_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Turn the payload into values, each tagged with its argument name.
    pub fn into_values(self) -> ValueSet {
        self.args
            .into_iter()
            .map(|arg| Value::wire(arg.type_name, arg.value).named(arg.name))
            .collect()
    }
}
