
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use autothread::{
        Command, InspectHooks, Outcome, ProtocolError, RegistryConfig, Task, TaskRegistry, TaskWorker,
        TaskWorkerHooks, UnitEvent, Value, WorkerMessage, ABORT_SENTINEL,
    };

    use super::test_helpers::{reply, MockUnit};

    #[derive(Default)]
    struct RecordingHooks {
        dispatched: AtomicUsize,
        done: AtomicUsize,
        protocol_errors: Mutex<Vec<ProtocolError>>,
        panic_on_done: bool,
    }

    impl TaskWorkerHooks for RecordingHooks {
        fn on_task_dispatched(&self, _task: &Task) -> anyhow::Result<()> {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_task_done(&self, _message: &WorkerMessage) -> anyhow::Result<()> {
            self.done.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_done {
                panic!("done hook exploded");
            }
            Ok(())
        }

        fn on_protocol_error(&self, error: &ProtocolError) -> anyhow::Result<()> {
            self.protocol_errors.lock().unwrap().push(error.clone());
            Ok(())
        }
    }

    fn registry(max: usize) -> Arc<TaskRegistry> {
        Arc::new(TaskRegistry::new(RegistryConfig::with_max_outstanding(max)).with_hooks(Arc::new(InspectHooks)))
    }

    fn worker(unit: Arc<MockUnit>, registry: Arc<TaskRegistry>, hooks: Arc<RecordingHooks>) -> TaskWorker {
        TaskWorker::new(unit.id, unit, registry, Some(hooks))
    }

    fn posted_task(unit: &MockUnit, index: usize) -> Task {
        Task::try_from(&unit.posted()[index]).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_posts_and_reply_resolves() {
        let unit = Arc::new(MockUnit::new(0));
        let hooks = Arc::new(RecordingHooks::default());
        let worker = worker(unit.clone(), registry(8), hooks.clone());

        let pending = match worker.dispatch(Command::new("echo", "hello")).unwrap() {
            Outcome::Ok(pending) => pending,
            Outcome::Fail(error) => panic!("dispatch failed: {error}"),
        };
        assert_eq!(hooks.dispatched.load(Ordering::SeqCst), 1);

        let task = posted_task(&unit, 0);
        assert_eq!(task.command, Command::new("echo", "hello"));
        unit.emit(reply(&task, Outcome::ok(Value::from("HELLO"))));

        assert_eq!(pending.await.unwrap().value, Value::from("HELLO"));
        assert_eq!(hooks.done.load(Ordering::SeqCst), 1);
        assert!(worker.registry().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reply_rejects() {
        let unit = Arc::new(MockUnit::new(0));
        let worker = worker(unit.clone(), registry(8), Arc::default());

        let pending = worker.dispatch(Command::new("echo", 1)).unwrap().into_result().unwrap();
        let task = posted_task(&unit, 0);
        worker.receive(&Value::from(WorkerMessage { task, result: Outcome::fail("RoutineException: nope") })).unwrap();

        assert_eq!(pending.await.unwrap_err().message(), "RoutineException: nope");
    }

    #[test]
    fn test_post_failure_finalizes_task() {
        let unit = Arc::new(MockUnit::new(0).failing_post());
        let hooks = Arc::new(RecordingHooks::default());
        let worker = worker(unit, registry(8), hooks.clone());

        let outcome = worker.dispatch(Command::new("echo", 1)).unwrap();
        assert_eq!(outcome.failure().unwrap(), "DispatchError: Failed to post message: mock post failure");
        assert!(worker.registry().is_empty());
        assert_eq!(hooks.dispatched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_capacity_failure_never_reaches_unit() {
        let unit = Arc::new(MockUnit::new(0));
        let worker = worker(unit.clone(), registry(1), Arc::default());

        assert!(worker.dispatch(Command::new("echo", 1)).unwrap().is_ok());
        let refused = worker.dispatch(Command::new("echo", 2)).unwrap();

        assert!(refused.failure().unwrap().starts_with("CapacityExceeded"));
        assert_eq!(unit.posted().len(), 1);
        assert_eq!(worker.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_abort_terminates_without_posting() {
        let unit = Arc::new(MockUnit::new(0));
        let worker = worker(unit.clone(), registry(8), Arc::default());

        let pending = worker.dispatch(Command::abort()).unwrap().into_result().unwrap();
        assert_eq!(pending.await.unwrap().value, Value::from(ABORT_SENTINEL));
        assert!(unit.is_terminated());
        assert!(unit.posted().is_empty());
        assert!(worker.registry().is_empty());
    }

    #[test]
    fn test_abort_failure_is_reported() {
        let unit = Arc::new(MockUnit::new(3).failing_terminate());
        let worker = worker(unit, registry(8), Arc::default());

        let outcome = worker.dispatch(Command::abort()).unwrap();
        assert!(outcome.failure().unwrap().starts_with("DispatchError: Failed to terminate unit"));
        assert!(worker.registry().is_empty());
    }

    #[test]
    fn test_malformed_reply_is_protocol_error() {
        let unit = Arc::new(MockUnit::new(0));
        let worker = worker(unit, registry(8), Arc::default());

        let err = worker.receive(&Value::from(42)).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(_)));
    }

    #[test]
    fn test_duplicate_reply_is_unregistered() {
        let unit = Arc::new(MockUnit::new(0));
        let worker = worker(unit.clone(), registry(8), Arc::default());

        let _pending = worker.dispatch(Command::new("echo", 1)).unwrap();
        let task = posted_task(&unit, 0);
        let message = Value::from(WorkerMessage { task: task.clone(), result: Outcome::ok(Value::Null) });

        assert!(worker.receive(&message).unwrap().is_ok());
        assert_eq!(worker.receive(&message).unwrap_err(), ProtocolError::UnregisteredTask { id: task.id });
    }

    #[test]
    fn test_malformed_event_isolates_unit() {
        let unit = Arc::new(MockUnit::new(0));
        let hooks = Arc::new(RecordingHooks::default());
        let _worker = worker(unit.clone(), registry(8), hooks.clone());

        unit.emit(UnitEvent::Message(Value::from("garbage")));

        assert!(unit.is_terminated());
        let errors = hooks.protocol_errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ProtocolError::MalformedMessage(_)));
    }

    #[test]
    fn test_error_event_isolates_unit() {
        let unit = Arc::new(MockUnit::new(0));
        let hooks = Arc::new(RecordingHooks::default());
        let _worker = worker(unit.clone(), registry(8), hooks.clone());

        unit.emit(UnitEvent::Error("Unknown routine name: 'missing'".to_string()));

        assert!(unit.is_terminated());
        assert_eq!(
            *hooks.protocol_errors.lock().unwrap(),
            vec![ProtocolError::WorkerError("Unknown routine name: 'missing'".to_string())]
        );
    }

    #[tokio::test]
    async fn test_done_hook_panic_does_not_lose_result() {
        let unit = Arc::new(MockUnit::new(0));
        let hooks = Arc::new(RecordingHooks { panic_on_done: true, ..Default::default() });
        let worker = worker(unit.clone(), registry(8), hooks.clone());

        let pending = worker.dispatch(Command::new("echo", 1)).unwrap().into_result().unwrap();
        let task = posted_task(&unit, 0);

        let outcome = worker.receive(&Value::from(WorkerMessage { task, result: Outcome::ok(Value::from(1)) })).unwrap();
        assert!(outcome.failure().unwrap().contains("done hook exploded"));
        assert_eq!(pending.await.unwrap().value, Value::from(1));
        assert!(!unit.is_terminated());
    }

    #[test]
    fn test_dropped_worker_ignores_events() {
        let unit = Arc::new(MockUnit::new(0));
        let hooks = Arc::new(RecordingHooks::default());
        drop(worker(unit.clone(), registry(8), hooks.clone()));

        unit.emit(UnitEvent::Message(Value::from("garbage")));
        assert!(!unit.is_terminated());
        assert!(hooks.protocol_errors.lock().unwrap().is_empty());
    }
}
