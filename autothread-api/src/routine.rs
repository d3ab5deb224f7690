//! # Routines
//!
//! Routines are the user-supplied functions a worker runs. Each one receives
//! the `data` field of a [`Command`](crate::task::Command) and answers with an
//! [`Outcome`]. Returning `Err` (or panicking) counts as the routine
//! throwing; the worker entry converts it into an `Outcome::Fail`.
//!
//! ## Usage Example
//!
//! ```rust
//! use autothread_api::{Outcome, RoutineTable, Value};
//!
//! let routines = RoutineTable::new()
//!     .with("echo", |data: Value| async move { Ok(Outcome::Ok(data)) })
//!     .unwrap();
//! assert!(routines.contains("echo"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::outcome::Outcome;
use crate::task::RESERVED_KINDS;
use crate::value::Value;

/// A routine callable from inside a worker.
#[async_trait]
pub trait Routine: Send + Sync {
    async fn call(&self, data: Value) -> anyhow::Result<Outcome<Value>>;
}

#[async_trait]
impl<F, Fut> Routine for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Outcome<Value>>> + Send + 'static,
{
    async fn call(&self, data: Value) -> anyhow::Result<Outcome<Value>> {
        (self)(data).await
    }
}

/// Named set of routines a worker entry dispatches to.
#[derive(Clone, Default)]
pub struct RoutineTable {
    routines: HashMap<String, Arc<dyn Routine>>,
}

impl RoutineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine. Reserved command kinds cannot be used as names.
    pub fn register(&mut self, name: impl Into<String>, routine: impl Routine + 'static) -> anyhow::Result<()> {
        let name = name.into();
        if RESERVED_KINDS.contains(&name.as_str()) {
            anyhow::bail!("routine name '{name}' is reserved");
        }
        self.routines.insert(name, Arc::new(routine));
        Ok(())
    }

    /// Builder-style variant of [`RoutineTable::register`].
    pub fn with(mut self, name: impl Into<String>, routine: impl Routine + 'static) -> anyhow::Result<Self> {
        self.register(name, routine)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Routine>> {
        self.routines.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routines.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

impl fmt::Debug for RoutineTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.routines.keys().collect();
        names.sort();
        f.debug_struct("RoutineTable").field("routines", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_routine() {
        let table = RoutineTable::new()
            .with("double", |data: Value| async move {
                let n = data.as_f64().unwrap_or_default();
                Ok(Outcome::Ok(Value::from(n * 2.0)))
            })
            .unwrap();

        let routine = table.get("double").unwrap();
        let outcome = routine.call(Value::from(21)).await.unwrap();
        assert_eq!(outcome, Outcome::Ok(Value::from(42.0)));
    }

    #[test]
    fn test_reserved_name_refused() {
        let mut table = RoutineTable::new();
        let err = table
            .register("abort", |_: Value| async move { Ok(Outcome::Ok(Value::Null)) })
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));
        assert!(table.is_empty());
    }
}
