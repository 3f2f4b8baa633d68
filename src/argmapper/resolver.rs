//! Argument resolution: match typed values and converters to a function's
//! declared inputs.
//!
//! Resolution runs in two phases. [`plan`] is pure: it decides, for every
//! input that has no direct value, which converters to run and in what
//! order. [`resolve`] then executes that plan, feeding each converter's
//! outputs back into the value set, and binds the final arguments. Nothing
//! runs when the plan cannot be built.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::func::{Arguments, Func, Param};
use super::invoke::{invoke, InvokeError};
use super::value::{Value, ValueSet};
use crate::pluginargs::Cleanup;

/// Why a function's arguments could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No direct value and no converter path for this argument.
    #[error(
        "argument `{name}` of type `{type_name}` cannot be satisfied: \
         no value or converter provides it"
    )]
    MissingInput { name: String, type_name: String },

    /// A call payload carried a value the function does not take from the caller.
    #[error("argument `{name}` of type `{type_name}` is not a caller argument")]
    UnexpectedArg { name: String, type_name: String },

    /// A converter chosen by the plan returned an error.
    #[error("converter `{converter}` failed: {error:#}")]
    Converter {
        converter: String,
        error: anyhow::Error,
    },

    /// A converter finished without producing a value it declared.
    #[error("converter `{converter}` did not produce its declared `{type_name}` output")]
    ConverterOutput {
        converter: String,
        type_name: String,
    },

    /// The call was cancelled while converters were running.
    #[error("resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    /// The type identifier that could not be satisfied, if that is the failure.
    pub fn missing_type(&self) -> Option<&str> {
        match self {
            ResolveError::MissingInput { type_name, .. } => Some(type_name),
            _ => None,
        }
    }
}

/// Converters to run, by index into the converter list, in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<usize>,
}

impl Plan {
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Converter names in execution order.
    pub fn names<'a>(&self, converters: &'a [Func]) -> Vec<&'a str> {
        self.steps.iter().map(|&i| converters[i].name()).collect()
    }

    fn push_chain(&mut self, chain: &[usize]) {
        for &step in chain {
            if !self.steps.contains(&step) {
                self.steps.push(step);
            }
        }
    }
}

/// Depth-first search for converter chains, memoized per output type.
struct Planner<'a> {
    values: &'a ValueSet,
    converters: &'a [Func],
    /// Chains known to produce a type, or known to be impossible.
    memo: HashMap<String, Option<Vec<usize>>>,
    /// Converters on the current search path.
    visiting: HashSet<usize>,
}

impl<'a> Planner<'a> {
    fn new(values: &'a ValueSet, converters: &'a [Func]) -> Self {
        Self {
            values,
            converters,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// Chain of converters needed for `param`; empty when a value is present.
    fn satisfy(&mut self, param: &Param) -> Option<Vec<usize>> {
        if self.values.find(&param.name, &param.type_name).is_some() {
            return Some(Vec::new());
        }
        self.produce(&param.type_name).0
    }

    /// Returns the chain producing `type_name`, and whether the answer was
    /// shaped by the current search path (and so must not be memoized).
    fn produce(&mut self, type_name: &str) -> (Option<Vec<usize>>, bool) {
        if let Some(known) = self.memo.get(type_name) {
            return (known.clone(), false);
        }

        let mut path_dependent = false;
        for index in 0..self.converters.len() {
            let converter = &self.converters[index];
            if !converter.produces(type_name) {
                continue;
            }
            if self.visiting.contains(&index) {
                path_dependent = true;
                continue;
            }

            self.visiting.insert(index);
            let mut chain = Vec::new();
            let mut viable = true;
            for input in converter.inputs() {
                if self.values.find(&input.name, &input.type_name).is_some() {
                    continue;
                }
                let (sub, dependent) = self.produce(&input.type_name);
                path_dependent |= dependent;
                match sub {
                    Some(sub) => {
                        for step in sub {
                            if !chain.contains(&step) {
                                chain.push(step);
                            }
                        }
                    }
                    None => {
                        viable = false;
                        break;
                    }
                }
            }
            self.visiting.remove(&index);

            if viable {
                chain.push(index);
                if !path_dependent {
                    self.memo.insert(type_name.to_string(), Some(chain.clone()));
                }
                return (Some(chain), path_dependent);
            }
        }

        if !path_dependent {
            self.memo.insert(type_name.to_string(), None);
        }
        (None, path_dependent)
    }
}

/// Build a resolution plan for `inputs` without running anything.
///
/// Inputs are taken in declaration order and converters are tried in
/// declaration order, so the same inputs always give the same plan.
pub fn plan(
    inputs: &[Param],
    values: &ValueSet,
    converters: &[Func],
) -> Result<Plan, ResolveError> {
    let mut planner = Planner::new(values, converters);
    let mut plan = Plan::default();

    for input in inputs {
        match planner.satisfy(input) {
            Some(chain) => plan.push_chain(&chain),
            None => {
                return Err(ResolveError::MissingInput {
                    name: input.name.clone(),
                    type_name: input.type_name.clone(),
                })
            }
        }
    }

    Ok(plan)
}

/// Whether `param` can be satisfied from `values`, directly or through converters.
pub fn satisfiable(param: &Param, values: &ValueSet, converters: &[Func]) -> bool {
    Planner::new(values, converters).satisfy(param).is_some()
}

/// Resolve the arguments of `func`.
///
/// Converters chosen by the plan run in order; their outputs are added to
/// `values` without name tags, since the plan chose them by type. Release
/// actions they defer go to `cleanup` and stay there even if a later
/// converter fails.
pub async fn resolve(
    func: &Func,
    values: &mut ValueSet,
    converters: &[Func],
    cleanup: &Cleanup,
    cancel: &CancellationToken,
) -> Result<Arguments, ResolveError> {
    let plan = plan(func.inputs(), values, converters)?;
    if !plan.is_empty() {
        log::debug!(
            "resolving `{}` through converters {:?}",
            func.name(),
            plan.names(converters)
        );
    }

    for &step in plan.steps() {
        let converter = &converters[step];
        let args = bind(converter, values, cleanup)?;

        let outputs = invoke(converter, args, cancel)
            .await
            .map_err(|e| match e {
                InvokeError::Cancelled => ResolveError::Cancelled,
                InvokeError::Failed(error) => ResolveError::Converter {
                    converter: converter.name().to_string(),
                    error,
                },
            })?;

        for declared in converter.outputs() {
            if !outputs.iter().any(|v| v.type_name() == declared.type_name) {
                return Err(ResolveError::ConverterOutput {
                    converter: converter.name().to_string(),
                    type_name: declared.type_name.clone(),
                });
            }
        }
        values.extend(outputs.into_iter().map(Value::unnamed));
    }

    bind(func, values, cleanup)
}

/// Bind each declared input of `func` to its value.
fn bind(func: &Func, values: &ValueSet, cleanup: &Cleanup) -> Result<Arguments, ResolveError> {
    let mut entries = Vec::with_capacity(func.inputs().len());
    for input in func.inputs() {
        let value = values
            .find(&input.name, &input.type_name)
            .ok_or_else(|| ResolveError::MissingInput {
                name: input.name.clone(),
                type_name: input.type_name.clone(),
            })?;
        entries.push((input.clone(), value.clone()));
    }
    Ok(Arguments::new(entries, cleanup.clone()))
}
