//! Worker-side entry: turns an incoming task into the reply posted back.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use autothread_api::{Outcome, ProtocolError, RoutineTable, Task, UnitEvent, Value, WorkerMessage};

use crate::hooks::panic_message;

/// Run the routine named by `message` and build the event to post back.
///
/// A routine that returns `Err` or panics produces a failed reply. A
/// message that is not a task, or names no known routine, produces an
/// error event instead.
pub(crate) async fn handle_message(routines: &RoutineTable, message: Value) -> UnitEvent {
    let task = match Task::try_from(&message) {
        Ok(task) => task,
        Err(error) => return UnitEvent::Error(error.to_string()),
    };
    let Some(routine) = routines.get(&task.command.kind) else {
        return UnitEvent::Error(ProtocolError::UnknownRoutine(task.command.kind).to_string());
    };

    let data = task.command.data.clone();
    let result = match AssertUnwindSafe(routine.call(data)).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(error)) => Outcome::fail(format!("RoutineException: {error:#}")),
        Err(payload) => Outcome::fail(format!("RoutineException: {}", panic_message(payload.as_ref()))),
    };

    UnitEvent::Message(Value::from(WorkerMessage { task, result }))
}

#[cfg(test)]
mod tests {
    use autothread_api::Command;

    use super::*;

    fn routines() -> RoutineTable {
        RoutineTable::new()
            .with("double", |data: Value| async move {
                let n = data.as_f64().unwrap_or_default();
                Ok(Outcome::ok(Value::from(n * 2.0)))
            })
            .unwrap()
            .with("fails", |_data: Value| async move { anyhow::bail!("boom") })
            .unwrap()
            .with("panics", |_data: Value| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(Outcome::ok(Value::Null))
            })
            .unwrap()
    }

    fn task(kind: &str, data: Value) -> Value {
        Value::from(Task { id: 7, command: Command::new(kind, data) })
    }

    fn reply(event: UnitEvent) -> WorkerMessage {
        match event {
            UnitEvent::Message(value) => WorkerMessage::try_from(&value).unwrap(),
            UnitEvent::Error(error) => panic!("unexpected error event: {error}"),
        }
    }

    #[tokio::test]
    async fn test_routine_result_is_posted_back() {
        let message = reply(handle_message(&routines(), task("double", Value::from(21))).await);
        assert_eq!(message.task.id, 7);
        assert_eq!(message.result, Outcome::ok(Value::from(42.0)));
    }

    #[tokio::test]
    async fn test_routine_error_becomes_failure() {
        let message = reply(handle_message(&routines(), task("fails", Value::Null)).await);
        assert_eq!(message.result, Outcome::fail("RoutineException: boom"));
    }

    #[tokio::test]
    async fn test_routine_panic_becomes_failure() {
        let message = reply(handle_message(&routines(), task("panics", Value::Null)).await);
        assert_eq!(message.result, Outcome::fail("RoutineException: kaboom"));
    }

    #[tokio::test]
    async fn test_unknown_routine_raises_error_event() {
        match handle_message(&routines(), task("missing", Value::Null)).await {
            UnitEvent::Error(error) => assert_eq!(error, "Unknown routine name: 'missing'"),
            UnitEvent::Message(_) => panic!("unknown routine must not reply"),
        }
    }

    #[tokio::test]
    async fn test_non_task_raises_error_event() {
        let event = handle_message(&routines(), Value::from("not a task")).await;
        assert!(matches!(event, UnitEvent::Error(error) if error.starts_with("Malformed message")));
    }
}
