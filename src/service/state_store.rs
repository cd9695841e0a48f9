//! Application state container that reports itself to the bridge.
//!
//! [`InstrumentedStore`] wraps a serializable state value. Updates emit
//! throttled `state` events on the bus, and
//! [`InstrumentedStore::register_commands`] exposes namespaced
//! `<name>.getState`, `<name>.setState` and `<name>.reset` commands.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::domain::{CommandRegistry, EventBus, EventKind, StateRecord};

/// Default minimum spacing between two `state` events of one store.
pub const DEFAULT_STATE_THROTTLE: Duration = Duration::from_millis(200);

type Redactor = Arc<dyn Fn(Value) -> Value + Send + Sync>;

struct StoreInner<T> {
    name: String,
    initial: T,
    state: RwLock<T>,
    bus: EventBus,
    throttle: Duration,
    last_emit: Mutex<Option<Instant>>,
    redact: Option<Redactor>,
}

/// Shared, observable application state.
///
/// Cheap to clone; clones share the same state.
pub struct InstrumentedStore<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for InstrumentedStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for InstrumentedStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedStore")
            .field("name", &self.inner.name)
            .field(
                "state",
                &*self
                    .inner
                    .state
                    .read()
                    .unwrap_or_else(PoisonError::into_inner),
            )
            .field("throttle", &self.inner.throttle)
            .finish_non_exhaustive()
    }
}

impl<T> InstrumentedStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a store named `name` holding `initial`.
    #[must_use]
    pub fn new(name: impl Into<String>, initial: T, bus: EventBus) -> Self {
        Self::build(name.into(), initial, bus, DEFAULT_STATE_THROTTLE, None)
    }

    /// Returns a store with a different emission throttle. Call before
    /// sharing the store.
    #[must_use]
    pub fn with_throttle(self, throttle: Duration) -> Self {
        let (name, initial, bus, redact) = self.parts();
        Self::build(name, initial, bus, throttle, redact)
    }

    /// Returns a store that passes serialized state through `redact` before
    /// it leaves the process. Call before sharing the store.
    #[must_use]
    pub fn with_redact<F>(self, redact: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let throttle = self.inner.throttle;
        let (name, initial, bus, _) = self.parts();
        Self::build(name, initial, bus, throttle, Some(Arc::new(redact)))
    }

    fn build(
        name: String,
        initial: T,
        bus: EventBus,
        throttle: Duration,
        redact: Option<Redactor>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                name,
                state: RwLock::new(initial.clone()),
                initial,
                bus,
                throttle,
                last_emit: Mutex::new(None),
                redact,
            }),
        }
    }

    fn parts(&self) -> (String, T, EventBus, Option<Redactor>) {
        (
            self.inner.name.clone(),
            self.inner.initial.clone(),
            self.inner.bus.clone(),
            self.inner.redact.as_ref().map(Arc::clone),
        )
    }

    /// Store name, used as the command namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns a clone of the current state.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutates the state in place and reports the change.
    pub fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut T),
    {
        {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            mutate(&mut state);
        }
        self.changed();
    }

    /// Replaces the whole state and reports the change.
    pub fn replace(&self, next: T) {
        self.update(|state| *state = next);
    }

    /// Restores the initial state and reports the change.
    pub fn reset(&self) {
        self.replace(self.inner.initial.clone());
    }

    /// Serialized, redacted view of the current state.
    ///
    /// Serialization failures produce an `{"error": ...}` marker instead of
    /// propagating.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let serialized = {
            let state = self
                .inner
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            serde_json::to_value(&*state)
        };
        match serialized {
            Ok(value) => match &self.inner.redact {
                Some(redact) => redact(value),
                None => value,
            },
            Err(err) => {
                tracing::warn!(store = %self.inner.name, error = %err, "failed to serialize state");
                json!({ "error": "State serialization failed" })
            }
        }
    }

    /// Shallow-merges a JSON object into the state.
    ///
    /// # Errors
    ///
    /// Fails if `partial` is not an object, the current state does not
    /// serialize to an object, or the merged value does not deserialize
    /// back into `T`. The state is left untouched on failure.
    pub fn merge(&self, partial: Value) -> anyhow::Result<()> {
        let Value::Object(fields) = partial else {
            anyhow::bail!("{}.setState payload must be an object", self.inner.name);
        };
        let current = serde_json::to_value(self.get())?;
        let Value::Object(mut merged) = current else {
            anyhow::bail!("{} state is not an object", self.inner.name);
        };
        merged.extend(fields);
        let next: T = serde_json::from_value(Value::Object(merged))?;
        self.replace(next);
        Ok(())
    }

    /// Registers `<name>.getState`, `<name>.setState` and `<name>.reset`.
    pub fn register_commands(&self, registry: &CommandRegistry) {
        let name = &self.inner.name;

        let store = self.clone();
        registry.register_sync(
            format!("{name}.getState"),
            format!("Get snapshot of {name} store"),
            move |_| Ok(store.snapshot()),
        );

        let store = self.clone();
        registry.register_sync(
            format!("{name}.setState"),
            format!("Set partial state for {name}"),
            move |payload| {
                store.merge(payload.unwrap_or(Value::Null))?;
                Ok(Value::Null)
            },
        );

        let store = self.clone();
        registry.register_sync(
            format!("{name}.reset"),
            format!("Reset {name} store to initial state"),
            move |_| {
                store.reset();
                Ok(Value::Null)
            },
        );
    }

    fn changed(&self) {
        let now = Instant::now();
        {
            let mut last = self
                .inner
                .last_emit
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|at| now.duration_since(at) < self.inner.throttle) {
                return;
            }
            *last = Some(now);
        }
        self.inner.bus.emit(
            EventKind::State,
            StateRecord {
                name: self.inner.name.clone(),
                data: self.snapshot(),
            },
        );
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventData;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Todos {
        items: Vec<String>,
        theme: String,
    }

    fn todos() -> Todos {
        Todos {
            items: Vec::new(),
            theme: "light".to_string(),
        }
    }

    fn state_events(bus: &EventBus) -> Vec<StateRecord> {
        bus.buffer()
            .into_iter()
            .filter_map(|e| match e.data {
                EventData::State(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn update_emits_state_event() {
        let bus = EventBus::default();
        let store = InstrumentedStore::new("todos", todos(), bus.clone());
        store.update(|s| s.items.push("Buy Milk".to_string()));

        let events = state_events(&bus);
        assert_eq!(events.len(), 1);
        let Some(record) = events.first() else {
            panic!("missing state event");
        };
        assert_eq!(record.name, "todos");
        assert_eq!(record.data, json!({"items": ["Buy Milk"], "theme": "light"}));
    }

    #[test]
    fn rapid_updates_are_throttled() {
        let bus = EventBus::default();
        let store = InstrumentedStore::new("todos", todos(), bus.clone())
            .with_throttle(Duration::from_secs(60));
        store.update(|s| s.items.push("a".to_string()));
        store.update(|s| s.items.push("b".to_string()));
        store.update(|s| s.items.push("c".to_string()));

        assert_eq!(state_events(&bus).len(), 1);
        assert_eq!(store.get().items.len(), 3);
    }

    #[test]
    fn redaction_applies_to_snapshots() {
        let bus = EventBus::default();
        let store = InstrumentedStore::new("todos", todos(), bus).with_redact(|mut v| {
            if let Some(obj) = v.as_object_mut() {
                obj.insert("theme".to_string(), json!("[redacted]"));
            }
            v
        });
        assert_eq!(
            store.snapshot(),
            json!({"items": [], "theme": "[redacted]"})
        );
    }

    #[test]
    fn unserializable_state_yields_marker() {
        let bus = EventBus::default();
        let mut map: HashMap<Vec<u8>, u32> = HashMap::new();
        map.insert(vec![1, 2], 3);
        let store = InstrumentedStore::new("bytes", map, bus.clone());
        assert_eq!(
            store.snapshot(),
            json!({"error": "State serialization failed"})
        );

        store.update(|m| {
            m.insert(vec![4], 5);
        });
        let events = state_events(&bus);
        assert_eq!(
            events.first().map(|r| r.data.clone()),
            Some(json!({"error": "State serialization failed"}))
        );
    }

    #[tokio::test]
    async fn commands_round_trip_through_registry() {
        let bus = EventBus::default();
        let registry = CommandRegistry::new(bus.clone());
        let store = InstrumentedStore::new("todos", todos(), bus);
        store.register_commands(&registry);

        let set = registry
            .execute("todos.setState", Some(json!({"theme": "dark"})))
            .await;
        assert!(set.success, "{set:?}");
        assert_eq!(store.get().theme, "dark");

        let get = registry.execute("todos.getState", None).await;
        assert_eq!(get.result, Some(json!({"items": [], "theme": "dark"})));

        let reset = registry.execute("todos.reset", None).await;
        assert!(reset.success);
        assert_eq!(store.get(), todos());
    }

    #[tokio::test]
    async fn set_state_rejects_bad_payloads() {
        let bus = EventBus::default();
        let registry = CommandRegistry::new(bus.clone());
        let store = InstrumentedStore::new("todos", todos(), bus);
        store.register_commands(&registry);

        let not_object = registry.execute("todos.setState", Some(json!("dark"))).await;
        assert!(!not_object.success);

        let wrong_type = registry
            .execute("todos.setState", Some(json!({"items": 7})))
            .await;
        assert!(!wrong_type.success);
        assert_eq!(store.get(), todos());
    }
}
