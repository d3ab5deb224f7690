//! # Commands, Tasks and Worker Messages
//!
//! A `Command` names a routine and carries its argument. The registry turns
//! a command into a `Task` by assigning it a unique id; the task is what
//! gets posted to a worker. The worker answers with a `WorkerMessage`
//! carrying the task back together with an `Outcome`.
//!
//! Both directions travel as plain [`Value`]s. Decoding a `Value` back into
//! a typed message validates its shape; anything that does not match is a
//! [`ProtocolError::MalformedMessage`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::errors::ProtocolError;
use crate::outcome::Outcome;
use crate::value::Value;

/// Unique, monotonically increasing task identifier.
pub type TaskId = u64;

/// Kind of the reserved teardown command.
pub const ABORT_KIND: &str = "abort";

/// Sentinel value the teardown command resolves with.
pub const ABORT_SENTINEL: &str = "abort";

/// Command kinds that never reach user routines.
pub const RESERVED_KINDS: &[&str] = &[ABORT_KIND];

/// A routine invocation: which routine, with which argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: String,
    pub data: Value,
}

impl Command {
    pub fn new(kind: impl Into<String>, data: impl Into<Value>) -> Self {
        Self { kind: kind.into(), data: data.into() }
    }

    /// Teardown command: terminates the worker without invoking user code.
    pub fn abort() -> Self {
        Self::new(ABORT_KIND, Value::Object(BTreeMap::new()))
    }

    pub fn is_abort(&self) -> bool {
        self.kind == ABORT_KIND
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_KINDS.contains(&self.kind.as_str())
    }
}

/// A registered unit of work. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub command: Command,
}

/// Reply posted by a worker for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerMessage {
    pub task: Task,
    pub result: Outcome<Value>,
}

/// Value of a completed task along with its processing latency.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedTask {
    pub value: Value,
    /// Wall-clock time between registration and resolution.
    pub overhead: Duration,
}

impl FinalizedTask {
    /// Decode the value into a typed result.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        self.value.deserialize_into()
    }
}

// --- Encoding ---

impl From<Command> for Value {
    fn from(command: Command) -> Self {
        Value::object([("kind", Value::String(command.kind)), ("data", command.data)])
    }
}

impl From<Task> for Value {
    fn from(task: Task) -> Self {
        Value::object([("id", Value::from(task.id)), ("command", Value::from(task.command))])
    }
}

impl From<WorkerMessage> for Value {
    fn from(message: WorkerMessage) -> Self {
        Value::object([("task", Value::from(message.task)), ("result", Value::from(message.result))])
    }
}

// --- Decoding ---

fn field<'a>(value: &'a Value, key: &str, what: &str) -> Result<&'a Value, ProtocolError> {
    let map = value
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedMessage(format!("{what} must be an object, got {}", value.type_name())))?;
    map.get(key)
        .ok_or_else(|| ProtocolError::MalformedMessage(format!("{what} is missing '{key}'")))
}

impl TryFrom<&Value> for Command {
    type Error = ProtocolError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let kind = field(value, "kind", "command")?
            .as_str()
            .ok_or_else(|| ProtocolError::MalformedMessage("command kind must be a string".into()))?;
        let data = field(value, "data", "command")?;
        Ok(Command { kind: kind.to_string(), data: data.clone() })
    }
}

impl TryFrom<&Value> for Task {
    type Error = ProtocolError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let id = field(value, "id", "task")?
            .as_u64()
            .ok_or_else(|| ProtocolError::MalformedMessage("task id must be a non-negative integer".into()))?;
        let command = Command::try_from(field(value, "command", "task")?)?;
        Ok(Task { id, command })
    }
}

impl TryFrom<&Value> for Outcome<Value> {
    type Error = ProtocolError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let ok = field(value, "ok", "result")?
            .as_bool()
            .ok_or_else(|| ProtocolError::MalformedMessage("result 'ok' must be a boolean".into()))?;
        if ok {
            Ok(Outcome::Ok(field(value, "value", "result")?.clone()))
        } else {
            let error = field(value, "error", "result")?
                .as_str()
                .ok_or_else(|| ProtocolError::MalformedMessage("result error must be a string".into()))?;
            Ok(Outcome::Fail(error.to_string()))
        }
    }
}

impl TryFrom<&Value> for WorkerMessage {
    type Error = ProtocolError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let task = Task::try_from(field(value, "task", "worker message")?)?;
        let result = Outcome::try_from(field(value, "result", "worker message")?)?;
        Ok(WorkerMessage { task, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_reserved() {
        assert!(Command::abort().is_abort());
        assert!(Command::abort().is_reserved());
        assert!(!Command::new("transcribe", Value::Null).is_reserved());
    }

    #[test]
    fn test_task_missing_command() {
        let value = Value::object([("id", Value::from(1))]);
        let err = Task::try_from(&value).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(msg) if msg.contains("command")));
    }

    #[test]
    fn test_fractional_id_rejected() {
        let value = Value::object([
            ("id", Value::Number(0.5)),
            ("command", Value::from(Command::new("noop", Value::Null))),
        ]);
        assert!(Task::try_from(&value).is_err());
    }
}
