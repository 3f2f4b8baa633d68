//! Functions with runtime-described signatures.
//!
//! A [`Func`] is an ordered list of parameter descriptors plus one generic
//! entry point taking the assembled [`Arguments`]. Converters are plain
//! `Func`s whose declared outputs feed the resolver.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::{Typed, Value};
use crate::pluginargs::Cleanup;

/// One declared input or output of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Param {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// A parameter of a [`Typed`] type.
    pub fn of<T: Typed>(name: impl Into<String>) -> Self {
        Self::new(name, T::TYPE)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.type_name)
    }
}

/// Errors raised while declaring a function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FuncError {
    #[error("function `{func}` declares parameter `{param}` more than once")]
    DuplicateParam { func: String, param: String },

    #[error("converter `{0}` declares no outputs")]
    NoOutputs(String),
}

/// The generic entry point of a [`Func`].
pub type FuncBody =
    Arc<dyn Fn(Arguments) -> BoxFuture<'static, anyhow::Result<Vec<Value>>> + Send + Sync>;

/// A callable with a signature known only at runtime.
#[derive(Clone)]
pub struct Func {
    name: String,
    inputs: Vec<Param>,
    outputs: Vec<Param>,
    watches_cancel: bool,
    body: FuncBody,
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("watches_cancel", &self.watches_cancel)
            .finish()
    }
}

impl Func {
    /// Start declaring a function.
    pub fn builder(name: impl Into<String>) -> FuncBuilder {
        FuncBuilder {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            watches_cancel: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Param] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Param] {
        &self.outputs
    }

    /// Whether the body handles the cancellation token itself.
    pub fn watches_cancel(&self) -> bool {
        self.watches_cancel
    }

    /// Whether this function produces a value of `type_name`.
    pub fn produces(&self, type_name: &str) -> bool {
        self.outputs.iter().any(|p| p.type_name == type_name)
    }

    /// Run the body. Callers normally go through [`invoke`](super::invoke).
    pub(crate) fn run(&self, args: Arguments) -> BoxFuture<'static, anyhow::Result<Vec<Value>>> {
        (self.body)(args)
    }
}

/// Builder for [`Func`].
#[derive(Debug)]
pub struct FuncBuilder {
    name: String,
    inputs: Vec<Param>,
    outputs: Vec<Param>,
    watches_cancel: bool,
}

impl FuncBuilder {
    /// Declare an input of a [`Typed`] type.
    pub fn input<T: Typed>(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(Param::of::<T>(name));
        self
    }

    /// Declare an input by type identifier.
    pub fn input_type(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.inputs.push(Param::new(name, type_name));
        self
    }

    /// Declare an input from a ready-made descriptor.
    pub fn param(mut self, param: Param) -> Self {
        self.inputs.push(param);
        self
    }

    /// Declare an output of a [`Typed`] type.
    pub fn output<T: Typed>(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(Param::of::<T>(name));
        self
    }

    /// Declare an output by type identifier.
    pub fn output_type(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.outputs.push(Param::new(name, type_name));
        self
    }

    /// Mark the body as watching the cancellation token on its own.
    ///
    /// [`invoke`](super::invoke) then awaits the body to completion instead
    /// of dropping it when the token fires.
    pub fn watches_cancel(mut self) -> Self {
        self.watches_cancel = true;
        self
    }

    /// Finish with a body that returns values (or an error).
    pub fn build<F, Fut>(self, body: F) -> Result<Func, FuncError>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<Value>>> + Send + 'static,
    {
        self.check_unique()?;
        Ok(Func {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            watches_cancel: self.watches_cancel,
            body: Arc::new(move |args| body(args).boxed()),
        })
    }

    /// Finish with a body that only reports an error outcome.
    pub fn build_unit<F, Fut>(self, body: F) -> Result<Func, FuncError>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body = Arc::new(body);
        self.build(move |args| {
            let body = body.clone();
            async move { body(args).await.map(|()| Vec::new()) }
        })
    }

    /// Finish a converter: like [`build`](Self::build) but at least one
    /// output must be declared.
    pub fn converter<F, Fut>(self, body: F) -> Result<Func, FuncError>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<Value>>> + Send + 'static,
    {
        if self.outputs.is_empty() {
            return Err(FuncError::NoOutputs(self.name));
        }
        self.build(body)
    }

    fn check_unique(&self) -> Result<(), FuncError> {
        let mut seen = HashSet::new();
        for param in &self.inputs {
            if !seen.insert(param.name.as_str()) {
                return Err(FuncError::DuplicateParam {
                    func: self.name.clone(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The resolved arguments handed to a function body.
#[derive(Debug, Clone)]
pub struct Arguments {
    entries: Vec<(Param, Value)>,
    cleanup: Cleanup,
}

impl Arguments {
    pub(crate) fn new(entries: Vec<(Param, Value)>, cleanup: Cleanup) -> Self {
        Self { entries, cleanup }
    }

    /// The raw value bound to parameter `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(p, _)| p.name == name)
            .map(|(_, v)| v)
    }

    /// Clone out the value bound to `name`.
    pub fn get<T: std::any::Any + Clone>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| anyhow::anyhow!("no argument named `{}`", name))?;
        Ok(value.get::<T>()?)
    }

    /// Read the value bound to `name`, decoding it if it came over the wire.
    pub fn decode<T: std::any::Any + Clone + DeserializeOwned>(
        &self,
        name: &str,
    ) -> anyhow::Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| anyhow::anyhow!("no argument named `{}`", name))?;
        Ok(value.decode::<T>()?)
    }

    /// Parameters and their bound values, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Param, &Value)> {
        self.entries.iter().map(|(p, v)| (p, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The ledger of the call these arguments belong to.
    pub fn cleanup(&self) -> &Cleanup {
        &self.cleanup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_param_names_are_rejected() {
        let err = Func::builder("dup")
            .input_type("x", "a")
            .input_type("x", "b")
            .build_unit(|_| async { Ok(()) })
            .unwrap_err();
        assert_eq!(
            err,
            FuncError::DuplicateParam {
                func: "dup".into(),
                param: "x".into()
            }
        );
    }

    #[test]
    fn test_converter_requires_output() {
        let err = Func::builder("nothing")
            .converter(|_| async { Ok(Vec::new()) })
            .unwrap_err();
        assert_eq!(err, FuncError::NoOutputs("nothing".into()));
    }

    #[tokio::test]
    async fn test_unit_body_yields_no_values() {
        let func = Func::builder("noop").build_unit(|_| async { Ok(()) }).unwrap();
        let out = func
            .run(Arguments::new(Vec::new(), Cleanup::new()))
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(!func.produces("anything"));
    }
}
