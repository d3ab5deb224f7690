//! # Executable Units
//!
//! An executable unit is an isolated execution context (an OS thread, a
//! process, or anything else that only talks through messages). The pool
//! never reaches into a unit: it posts [`Value`]s, listens for events and
//! eventually terminates it.
//!
//! Units are created by a [`UnitFactory`], which plays the role of the entry
//! point reference: every unit it spawns runs the same worker entry.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::UnitError;
use crate::value::Value;

/// Identifier of a worker inside a pool.
pub type WorkerId = u64;

/// Event types a unit can deliver to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Error,
}

/// Event delivered by a unit to the coordinating context.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitEvent {
    /// A message posted by the worker.
    Message(Value),
    /// An error raised inside the worker.
    Error(String),
}

impl UnitEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UnitEvent::Message(_) => EventKind::Message,
            UnitEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Listener invoked for every event of the kind it was registered for.
pub type EventHandler = Arc<dyn Fn(UnitEvent) + Send + Sync>;

/// One isolated execution context. Messaging is one-way and asynchronous.
pub trait ExecutableUnit: Send + Sync + Debug {
    /// Post a message to the unit.
    fn post(&self, message: Value) -> Result<(), UnitError>;

    /// Register a listener for one kind of event.
    fn listen(&self, kind: EventKind, handler: EventHandler);

    /// Terminate the unit synchronously. In-flight work is abandoned.
    fn terminate(&self) -> Result<(), UnitError>;
}

/// Spawns executable units that all run the same worker entry.
#[async_trait]
pub trait UnitFactory: Send + Sync + Debug {
    /// Spawn a unit for the worker with the given id.
    async fn spawn(&self, worker_id: WorkerId) -> Result<Arc<dyn ExecutableUnit>, UnitError>;
}
