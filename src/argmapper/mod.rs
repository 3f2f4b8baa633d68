//! Typed-value argument mapping.
//!
//! The engine behind every bridge call: functions declare their inputs as
//! `(name, type identifier)` pairs, callers provide a [`ValueSet`] and a list
//! of converter [`Func`]s, and the resolver works out which converters to run
//! so every input has a value.
//!
//! ```text
//! ValueSet + converters
//!   ↓  resolver::plan()      (pure: which converters, in which order)
//!   ↓  resolver::resolve()   (run converters, bind arguments)
//!   ↓  invoke::invoke()      (one call, raced against cancellation)
//! results | error
//! ```
//!
//! The engine never looks at what a type identifier means. Context values
//! (loggers, tokens, ledgers) are matched exactly like user values.

pub mod func;
pub mod invoke;
pub mod resolver;
pub mod value;

pub use func::{Arguments, Func, FuncBody, FuncBuilder, FuncError, Param};
pub use invoke::{call, invoke, InvokeError};
pub use resolver::{plan, resolve, satisfiable, Plan, ResolveError};
pub use value::{Typed, Value, ValueError, ValueSet};
