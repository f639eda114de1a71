//! Registry of live script instances
//!
//! Each script id maps to at most one slot. A slot is either *pending* (an
//! evaluation for that id is in flight) or *active* (a [`Container`] owns the
//! resources the script acquired). Reserving, committing and removing slots go
//! through the map's entry API, so a lookup never observes a half-registered
//! script.
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tracing::{debug, warn};

use super::compiled::Script;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Script {0} is already running")]
    AlreadyRunning(String),

    #[error("Script {0} is not running")]
    NotRunning(String),

    #[error("Script {0} is still starting")]
    Starting(String),
}

type ReleaseAction = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Cleanup actions registered by a script body while it runs
///
/// Cloning shares the underlying list, so the evaluator can hand a clone to
/// the script and the registry keeps the original.
#[derive(Clone, Default)]
pub struct ResourceScope {
    actions: Arc<Mutex<Vec<(String, ReleaseAction)>>>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action; actions run in registration order
    pub fn defer<F>(&self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.lock().push((label.into(), Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run and drop every registered action
    pub fn release_all(&self, id: &str) -> ReleaseReport {
        let actions = std::mem::take(&mut *self.lock());
        run_actions(id, actions)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, ReleaseAction)>> {
        self.actions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.lock().iter().map(|(l, _)| l.clone()).collect();
        f.debug_struct("ResourceScope").field("actions", &labels).finish()
    }
}

/// A cleanup action that failed or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub label: String,
    pub message: String,
}

/// Outcome of releasing a script's resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub id: String,
    pub released: usize,
    pub failures: Vec<ReleaseFailure>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn run_actions(id: &str, actions: Vec<(String, ReleaseAction)>) -> ReleaseReport {
    let mut report = ReleaseReport {
        id: id.to_string(),
        ..Default::default()
    };

    for (label, action) in actions {
        let message = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => {
                report.released += 1;
                continue;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(script = %id, resource = %label, error = %message, "resource release failed");
        report.failures.push(ReleaseFailure { label, message });
    }

    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

enum Slot {
    Pending,
    Active(Arc<Container>),
}

/// A running script instance and the resources it owns
pub struct Container {
    id: String,
    script: Arc<Script>,
    scope: ResourceScope,
    enabled: AtomicBool,
    slots: Weak<DashMap<String, Slot>>,
}

impl Container {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The compiled script this instance was evaluated from
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn resource_count(&self) -> usize {
        self.scope.len()
    }

    /// Register another cleanup action; runs at once if already released
    pub fn add_resource<F>(&self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        if self.is_enabled() {
            self.scope.defer(label, action);
        } else {
            run_actions(&self.id, vec![(label.into(), Box::new(action))]);
        }
    }

    /// Disable the instance, run every cleanup action and unregister it
    ///
    /// Returns `None` when the container was already released.
    pub fn release(&self) -> Option<ReleaseReport> {
        if self
            .enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let report = self.scope.release_all(&self.id);

        if let Some(slots) = self.slots.upgrade() {
            slots.remove_if(&self.id, |_, slot| {
                matches!(slot, Slot::Active(c) if std::ptr::eq(Arc::as_ptr(c), self))
            });
        }

        debug!(
            script = %self.id,
            released = report.released,
            failed = report.failures.len(),
            "container released"
        );
        Some(report)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .field("resources", &self.scope.len())
            .finish()
    }
}

/// Process-wide map of script id to live instance
#[derive(Clone, Default)]
pub struct Registry {
    slots: Arc<DashMap<String, Slot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an evaluation is in flight or an instance is live
    pub fn is_running(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Container>> {
        self.slots.get(id).and_then(|slot| match slot.value() {
            Slot::Active(container) => Some(Arc::clone(container)),
            Slot::Pending => None,
        })
    }

    /// Claim the id for a new evaluation
    pub fn reserve(&self, id: &str) -> Result<Reservation, RegistryError> {
        match self.slots.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRunning(id.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Pending);
                Ok(Reservation {
                    registry: self.clone(),
                    id: id.to_string(),
                    committed: false,
                })
            }
        }
    }

    /// Reserve and commit in one step
    pub fn register(
        &self,
        id: &str,
        script: Arc<Script>,
        scope: ResourceScope,
    ) -> Result<Arc<Container>, RegistryError> {
        Ok(self.reserve(id)?.commit(script, scope))
    }

    /// Release the live instance for `id`
    pub fn release(&self, id: &str) -> Result<ReleaseReport, RegistryError> {
        let container = match self.slots.get(id).as_deref() {
            Some(Slot::Active(container)) => Arc::clone(container),
            Some(Slot::Pending) => return Err(RegistryError::Starting(id.to_string())),
            None => return Err(RegistryError::NotRunning(id.to_string())),
        };
        container
            .release()
            .ok_or_else(|| RegistryError::NotRunning(id.to_string()))
    }

    /// Ids of live instances, sorted
    pub fn list_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Active(_)))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn containers(&self) -> Vec<Arc<Container>> {
        let mut containers: Vec<Arc<Container>> = self
            .slots
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Active(container) => Some(Arc::clone(container)),
                Slot::Pending => None,
            })
            .collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        containers
    }

    /// Release every live instance
    pub fn shutdown(&self) -> Vec<ReleaseReport> {
        self.containers()
            .into_iter()
            .filter_map(|container| container.release())
            .collect()
    }
}

/// Exclusive claim on a script id; dropping it uncommitted frees the id
pub struct Reservation {
    registry: Registry,
    id: String,
    committed: bool,
}

impl Reservation {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Turn the claim into a live instance owning `scope`
    pub fn commit(mut self, script: Arc<Script>, scope: ResourceScope) -> Arc<Container> {
        let container = Arc::new(Container {
            id: self.id.clone(),
            script,
            scope,
            enabled: AtomicBool::new(true),
            slots: Arc::downgrade(&self.registry.slots),
        });
        self.registry
            .slots
            .insert(self.id.clone(), Slot::Active(Arc::clone(&container)));
        self.committed = true;
        container
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.registry
                .slots
                .remove_if(&self.id, |_, slot| matches!(slot, Slot::Pending));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::service::CompiledArtifact;
    use std::sync::atomic::AtomicUsize;

    fn script(id: &str) -> Arc<Script> {
        Arc::new(Script::new(id, CompiledArtifact::new(vec![1, 2, 3])))
    }

    fn counting_scope(counter: &Arc<AtomicUsize>, n: usize) -> ResourceScope {
        let scope = ResourceScope::new();
        for i in 0..n {
            let counter = Arc::clone(counter);
            scope.defer(format!("r{i}"), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        scope
    }

    #[test]
    fn test_second_registration_is_rejected_until_release() {
        let registry = Registry::new();
        registry.register("b", script("b"), ResourceScope::new()).unwrap();

        assert_eq!(
            registry.reserve("b").err(),
            Some(RegistryError::AlreadyRunning("b".into()))
        );
        assert_eq!(registry.list_active(), vec!["b"]);

        registry.release("b").unwrap();
        assert!(registry.reserve("b").is_ok());
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let container = registry
            .register("a", script("a"), counting_scope(&counter, 3))
            .unwrap();

        let report = container.release().unwrap();
        assert_eq!(report.released, 3);
        assert!(container.release().is_none());
        assert_eq!(
            registry.release("a"),
            Err(RegistryError::NotRunning("a".into()))
        );
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!registry.is_running("a"));
    }

    #[test]
    fn test_failing_cleanup_does_not_stop_the_rest() {
        let registry = Registry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let scope = ResourceScope::new();

        let o = Arc::clone(&order);
        scope.defer("first", move || {
            o.lock().unwrap().push("first");
            Ok(())
        });
        scope.defer("broken", || anyhow::bail!("socket already closed"));
        scope.defer("panics", || panic!("listener gone"));
        let o = Arc::clone(&order);
        scope.defer("last", move || {
            o.lock().unwrap().push("last");
            Ok(())
        });

        registry.register("c", script("c"), scope).unwrap();
        let report = registry.release("c").unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "last"]);
        assert_eq!(report.released, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].label, "broken");
        assert!(report.failures[1].message.contains("listener gone"));
    }

    #[test]
    fn test_dropped_reservation_frees_id() {
        let registry = Registry::new();
        {
            let _reservation = registry.reserve("d").unwrap();
            assert!(registry.is_running("d"));
            assert!(registry.get("d").is_none());
            assert_eq!(
                registry.release("d"),
                Err(RegistryError::Starting("d".into()))
            );
        }
        assert!(!registry.is_running("d"));
    }

    #[test]
    fn test_stale_container_does_not_unregister_successor() {
        let registry = Registry::new();
        let first = registry.register("e", script("e"), ResourceScope::new()).unwrap();
        first.release().unwrap();

        let second = registry.register("e", script("e"), ResourceScope::new()).unwrap();
        assert!(first.release().is_none());
        assert!(second.is_enabled());
        assert_eq!(registry.list_active(), vec!["e"]);
    }

    #[test]
    fn test_late_resource_on_released_container_runs_immediately() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let container = registry.register("f", script("f"), ResourceScope::new()).unwrap();
        container.release().unwrap();

        let c = Arc::clone(&counter);
        container.add_resource("late", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for id in ["x", "y", "z"] {
            registry
                .register(id, script(id), counting_scope(&counter, 2))
                .unwrap();
        }

        let reports = registry.shutdown();
        assert_eq!(reports.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 6);
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_concurrent_reservations_have_one_winner() {
        let registry = Registry::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.reserve("same").map(std::mem::forget).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
