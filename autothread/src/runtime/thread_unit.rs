//! # OS-thread Executable Unit
//!
//! Each [`ThreadUnit`] runs on its own named OS thread with a private
//! current-thread tokio runtime. Coordinator → worker messages travel
//! through a flume inbox; replies travel back through a flume outbox that
//! an event pump task, running on the coordinator's runtime, drains into
//! the registered listeners.
//!
//! Tasks are processed one at a time, so replies leave a unit in the order
//! its tasks were posted.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use async_trait::async_trait;
use flume::{Receiver, Sender};
use tokio::runtime::{Builder, Handle};
use tracing::{debug, error};

use autothread_api::{EventHandler, EventKind, ExecutableUnit, RoutineTable, UnitError, UnitEvent, UnitFactory, Value, WorkerId};

use super::entry;
use crate::config::ThreadUnitConfig;
use crate::hooks::panic_message;

/// Listeners registered on a unit, by event kind.
#[derive(Default)]
struct Listeners {
    handlers: RwLock<Vec<(EventKind, EventHandler)>>,
}

impl Listeners {
    fn add(&self, kind: EventKind, handler: EventHandler) {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).push((kind, handler));
    }

    fn emit(&self, event: UnitEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        if let Some((last, rest)) = handlers.split_last() {
            for handler in rest {
                handler(event.clone());
            }
            last(event);
        }
    }
}

/// An executable unit backed by a dedicated OS thread.
pub struct ThreadUnit {
    id: WorkerId,
    thread_name: String,
    inbox: Mutex<Option<Sender<Value>>>,
    listeners: Arc<Listeners>,
    terminated: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadUnit {
    /// Start the worker thread and its event pump on `handle`.
    pub fn spawn(
        id: WorkerId,
        routines: Arc<RoutineTable>,
        handle: &Handle,
        config: &ThreadUnitConfig,
    ) -> Result<Self, UnitError> {
        let thread_name = format!("{}{}", config.thread_name_prefix, id);
        let (inbox_tx, inbox_rx) = flume::unbounded::<Value>();
        let (outbox_tx, outbox_rx) = flume::unbounded::<UnitEvent>();

        let mut builder = std::thread::Builder::new().name(thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let thread = builder
            .spawn(move || Self::worker_thread_main(routines, inbox_rx, outbox_tx))
            .map_err(|e| UnitError::Spawn(format!("failed to spawn thread '{thread_name}': {e}")))?;

        let listeners = Arc::new(Listeners::default());
        let terminated = Arc::new(AtomicBool::new(false));
        handle.spawn(Self::pump(outbox_rx, Arc::clone(&listeners), Arc::clone(&terminated)));

        debug!(worker = id, thread = %thread_name, "thread unit started");
        Ok(Self {
            id,
            thread_name,
            inbox: Mutex::new(Some(inbox_tx)),
            listeners,
            terminated,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Whether the OS thread has exited.
    pub fn is_thread_finished(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    fn worker_thread_main(routines: Arc<RoutineTable>, inbox: Receiver<Value>, outbox: Sender<UnitEvent>) {
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = outbox.send(UnitEvent::Error(format!("failed to start worker runtime: {e}")));
                return;
            }
        };

        runtime.block_on(async move {
            // Ends once the coordinator drops the inbox sender.
            while let Ok(message) = inbox.recv_async().await {
                let event = entry::handle_message(&routines, message).await;
                if outbox.send(event).is_err() {
                    break;
                }
            }
        });
    }

    async fn pump(outbox: Receiver<UnitEvent>, listeners: Arc<Listeners>, terminated: Arc<AtomicBool>) {
        while let Ok(event) = outbox.recv_async().await {
            if terminated.load(Ordering::SeqCst) {
                break;
            }
            let emitted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listeners.emit(event)));
            if let Err(payload) = emitted {
                error!(panic = %panic_message(payload.as_ref()), "unit listener panicked");
            }
        }
    }
}

impl ExecutableUnit for ThreadUnit {
    fn post(&self, message: Value) -> Result<(), UnitError> {
        if self.is_terminated() {
            return Err(UnitError::Terminated);
        }
        let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        match inbox.as_ref() {
            Some(sender) => sender.send(message).map_err(|e| UnitError::Post(e.to_string())),
            None => Err(UnitError::Terminated),
        }
    }

    fn listen(&self, kind: EventKind, handler: EventHandler) {
        self.listeners.add(kind, handler);
    }

    /// Stop accepting messages and stop delivering events. Tasks already
    /// posted are abandoned.
    fn terminate(&self) -> Result<(), UnitError> {
        self.terminated.store(true, Ordering::SeqCst);
        let dropped = self.inbox.lock().unwrap_or_else(PoisonError::into_inner).take();
        if dropped.is_some() {
            debug!(worker = self.id, thread = %self.thread_name, "thread unit terminated");
        }
        Ok(())
    }
}

impl Drop for ThreadUnit {
    fn drop(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for ThreadUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadUnit")
            .field("id", &self.id)
            .field("thread", &self.thread_name)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Spawns [`ThreadUnit`]s running the routines of a shared table.
#[derive(Debug, Clone)]
pub struct ThreadUnitFactory {
    routines: Arc<RoutineTable>,
    handle: Handle,
    config: ThreadUnitConfig,
}

impl ThreadUnitFactory {
    pub fn new(routines: RoutineTable, handle: Handle) -> Self {
        Self { routines: Arc::new(routines), handle, config: ThreadUnitConfig::default() }
    }

    pub fn with_config(mut self, config: ThreadUnitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn routines(&self) -> &RoutineTable {
        &self.routines
    }
}

#[async_trait]
impl UnitFactory for ThreadUnitFactory {
    async fn spawn(&self, worker_id: WorkerId) -> Result<Arc<dyn ExecutableUnit>, UnitError> {
        let unit = ThreadUnit::spawn(worker_id, Arc::clone(&self.routines), &self.handle, &self.config)?;
        Ok(Arc::new(unit))
    }
}
