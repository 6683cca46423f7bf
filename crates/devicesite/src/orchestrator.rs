//! Event routing for the form.
//!
//! Turns platform events into recomputes, selector steps, the one-way
//! unlock of the selector and device navigation. All state lives on the UI
//! thread; recomputes run as detached local tasks through a [`Spawner`],
//! with their request captured at event time.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::config::FormConfig;
use crate::field_store::FieldStore;
use crate::recompute::RecomputeClient;
use crate::selector::{Key, KeyOutcome, LockState, SteppedSelector};
use crate::transport::Transport;

pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Starts a detached task on the current (UI) thread.
pub trait Spawner {
    fn spawn(&self, task: LocalTask);
}

/// Full page navigation. Nothing computed survives it.
pub trait Navigator {
    fn navigate(&self, url: &str);
}

impl<T: Spawner> Spawner for Rc<T> {
    fn spawn(&self, task: LocalTask) {
        (**self).spawn(task)
    }
}

impl<T: Navigator> Navigator for Rc<T> {
    fn navigate(&self, url: &str) {
        (**self).navigate(url)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormEvent {
    /// Field lost focus.
    Blur(String),
    /// Field value committed (selects fire this on pick).
    Change(String),
    KeyDown { field: String, key: Key },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Blur,
    Change,
    KeyDown,
}

impl EventKind {
    pub fn dom_name(self) -> &'static str {
        match self {
            EventKind::Blur => "blur",
            EventKind::Change => "change",
            EventKind::KeyDown => "keydown",
        }
    }
}

/// A listener the platform has to attach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub field: String,
    pub kind: EventKind,
}

/// What a dispatched event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reaction {
    /// A recompute for this field was spawned.
    Recompute(String),
    /// The selector on this field was unlocked.
    Unlocked(String),
    Focused(String),
    Navigated(String),
    Key(KeyOutcome),
}

pub struct Orchestrator<S, T> {
    config: FormConfig,
    client: Rc<RecomputeClient<S, T>>,
    selector: RefCell<SteppedSelector>,
    lock: Cell<LockState>,
    spawner: Box<dyn Spawner>,
    navigator: Box<dyn Navigator>,
}

impl<S: FieldStore + 'static, T: Transport + 'static> Orchestrator<S, T> {
    /// Initializes the selector (fills its options, selects the initial
    /// value) and starts locked.
    pub fn new(
        config: FormConfig,
        client: RecomputeClient<S, T>,
        spawner: impl Spawner + 'static,
        navigator: impl Navigator + 'static,
    ) -> Self {
        let selector = SteppedSelector::from_config(&config.selector, client.store());
        Self {
            config,
            client: Rc::new(client),
            selector: RefCell::new(selector),
            lock: Cell::new(LockState::Locked),
            spawner: Box::new(spawner),
            navigator: Box::new(navigator),
        }
    }

    pub fn client(&self) -> &Rc<RecomputeClient<S, T>> {
        &self.client
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn lock_state(&self) -> LockState {
        self.lock.get()
    }

    pub fn selector_index(&self) -> usize {
        self.selector.borrow().index()
    }

    pub fn bindings(&self) -> Vec<Binding> {
        let mut bindings: Vec<Binding> = self
            .client
            .graph()
            .sources()
            .map(|field| Binding {
                field: field.to_string(),
                kind: EventKind::Blur,
            })
            .collect();
        if !self.client.graph().is_source(&self.config.gating_field) {
            bindings.push(Binding {
                field: self.config.gating_field.clone(),
                kind: EventKind::Blur,
            });
        }
        bindings.push(Binding {
            field: self.config.device_control.clone(),
            kind: EventKind::Change,
        });
        bindings.push(Binding {
            field: self.config.selector.field.clone(),
            kind: EventKind::KeyDown,
        });
        bindings
    }

    pub fn dispatch(&self, event: &FormEvent) -> Vec<Reaction> {
        match event {
            FormEvent::Blur(field) => self.on_blur(field),
            FormEvent::Change(field) => self.on_change(field),
            FormEvent::KeyDown { field, key } => self.on_key_down(field, key),
        }
    }

    fn on_blur(&self, field: &str) -> Vec<Reaction> {
        let mut reactions = Vec::new();
        if self.client.graph().is_source(field) {
            self.spawn_recompute(field);
            reactions.push(Reaction::Recompute(field.to_string()));
        }
        if field == self.config.gating_field {
            reactions.extend(self.on_gating_blur());
        }
        reactions
    }

    fn on_gating_blur(&self) -> Vec<Reaction> {
        let store = self.client.store();
        let filled = store
            .read(&self.config.gating_field)
            .is_some_and(|value| !value.trim().is_empty());
        if !filled {
            return Vec::new();
        }

        let mut reactions = Vec::new();
        let target = &self.config.selector.field;
        if self.lock.replace(LockState::Unlocked).is_locked() {
            log::debug!("{} filled, unlocking {target}", self.config.gating_field);
            reactions.push(Reaction::Unlocked(target.clone()));
        }
        if store.focus(target) {
            reactions.push(Reaction::Focused(target.clone()));
        }
        reactions
    }

    fn on_change(&self, field: &str) -> Vec<Reaction> {
        if field != self.config.device_control {
            return Vec::new();
        }
        let Some(device) = self.client.store().read(field) else {
            return Vec::new();
        };
        let url = self.config.navigation_url(&device);
        log::debug!("device {device} selected, navigating to {url}");
        self.navigator.navigate(&url);
        vec![Reaction::Navigated(url)]
    }

    fn on_key_down(&self, field: &str, key: &Key) -> Vec<Reaction> {
        if field != self.config.selector.field {
            return Vec::new();
        }
        let outcome = self
            .selector
            .borrow_mut()
            .handle_key(key, self.lock.get(), self.client.store());
        let mut reactions = vec![Reaction::Key(outcome)];
        if outcome.moved_to.is_some() {
            self.spawn_recompute(field);
            reactions.push(Reaction::Recompute(field.to_string()));
        }
        reactions
    }

    /// Values are read now; only the round trip is deferred.
    fn spawn_recompute(&self, field: &str) {
        let client = Rc::clone(&self.client);
        let request = client.request(field);
        self.spawner.spawn(Box::pin(async move {
            let source = request.source().to_string();
            if let Err(error) = client.send(request).await {
                log::warn!("recompute for {source} failed: {error}");
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::field_store::MemoryFieldStore;
    use crate::testing::{QueueSpawner, RecordingNavigator, RecordingTransport};

    struct Harness {
        orchestrator: Orchestrator<Rc<MemoryFieldStore>, Rc<RecordingTransport>>,
        store: Rc<MemoryFieldStore>,
        transport: Rc<RecordingTransport>,
        spawner: Rc<QueueSpawner>,
        navigator: Rc<RecordingNavigator>,
    }

    fn harness() -> Harness {
        let store = Rc::new(
            MemoryFieldStore::new()
                .with_editable("deviceSelect", "1N4148")
                .with_editable("ni", "1e10")
                .with_display("Vbi", "")
                .with_editable("Vapp", "")
                .with_editable("Wn", "")
                .with_display("Wp", "")
                .with_editable("Is", "1e-12")
                .with_display("Id", "")
                .with_editable("Ileak", ""),
        );
        let transport = Rc::new(RecordingTransport::new());
        let spawner = Rc::new(QueueSpawner::new());
        let navigator = Rc::new(RecordingNavigator::new());
        let config = FormConfig::default();
        let client = RecomputeClient::from_config(
            Rc::clone(&store),
            Rc::clone(&transport),
            Credential::new("X-CSRFToken", "tok"),
            &config,
        );
        let orchestrator = Orchestrator::new(config, client, Rc::clone(&spawner), Rc::clone(&navigator));
        Harness {
            orchestrator,
            store,
            transport,
            spawner,
            navigator,
        }
    }

    fn key(name: &str) -> FormEvent {
        FormEvent::KeyDown {
            field: "Vapp".to_string(),
            key: Key::from_name(name),
        }
    }

    #[test]
    fn bindings_cover_form() {
        let h = harness();
        let bindings = h.orchestrator.bindings();

        let blurs: Vec<_> = bindings
            .iter()
            .filter(|b| b.kind == EventKind::Blur)
            .map(|b| b.field.as_str())
            .collect();
        assert_eq!(blurs, ["ni", "Vapp", "Wn", "Is", "Ileak"]);
        assert!(bindings.contains(&Binding { field: "deviceSelect".to_string(), kind: EventKind::Change }));
        assert!(bindings.contains(&Binding { field: "Vapp".to_string(), kind: EventKind::KeyDown }));
    }

    #[test]
    fn blur_on_plain_field_does_nothing() {
        let h = harness();

        assert!(h.orchestrator.dispatch(&FormEvent::Blur("Vbi".to_string())).is_empty());
        assert_eq!(h.spawner.pending(), 0);
    }

    #[tokio::test]
    async fn blur_on_source_spawns_one_recompute() {
        let h = harness();
        h.transport.reply(r#"{"Id": "1.2e-3 A"}"#);

        let reactions = h.orchestrator.dispatch(&FormEvent::Blur("Is".to_string()));
        assert_eq!(reactions, [Reaction::Recompute("Is".to_string())]);
        assert_eq!(h.spawner.pending(), 1);
        assert!(h.transport.requests().is_empty());

        h.spawner.run_all().await;

        assert_eq!(h.transport.requests().len(), 1);
        assert_eq!(h.store.read("Id").as_deref(), Some("1.2e-3 A"));
    }

    #[test]
    fn gating_blur_unlocks_once() {
        let h = harness();

        h.store.write("Ileak", "   ");
        assert!(h.orchestrator.dispatch(&FormEvent::Blur("Ileak".to_string())).is_empty());
        assert_eq!(h.orchestrator.lock_state(), LockState::Locked);

        h.store.write("Ileak", "2.5e-9");
        let reactions = h.orchestrator.dispatch(&FormEvent::Blur("Ileak".to_string()));
        assert_eq!(
            reactions,
            [Reaction::Unlocked("Vapp".to_string()), Reaction::Focused("Vapp".to_string())]
        );

        let again = h.orchestrator.dispatch(&FormEvent::Blur("Ileak".to_string()));
        assert_eq!(again, [Reaction::Focused("Vapp".to_string())]);

        h.store.write("Ileak", "");
        h.orchestrator.dispatch(&FormEvent::Blur("Ileak".to_string()));
        assert_eq!(h.orchestrator.lock_state(), LockState::Unlocked);
        assert_eq!(h.spawner.pending(), 0);
    }

    #[test]
    fn locked_selector_ignores_arrows() {
        let h = harness();

        for name in ["ArrowUp", "ArrowDown", "ArrowUp"] {
            let reactions = h.orchestrator.dispatch(&key(name));
            assert_eq!(
                reactions,
                [Reaction::Key(KeyOutcome { prevent_default: true, moved_to: None })]
            );
        }
        assert_eq!(h.orchestrator.selector_index(), 20);
        assert_eq!(h.spawner.pending(), 0);
    }

    #[tokio::test]
    async fn unlocked_step_recomputes_selector_field() {
        let h = harness();
        h.store.write("Ileak", "1e-9");
        h.orchestrator.dispatch(&FormEvent::Blur("Ileak".to_string()));

        let reactions = h.orchestrator.dispatch(&key("ArrowUp"));
        assert_eq!(reactions[1], Reaction::Recompute("Vapp".to_string()));
        h.spawner.run_all().await;

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].fields[0], ("Vapp".to_string(), "0.05".to_string()));
        assert_eq!(requests[0].fields[1].0, "Wn");
    }

    #[test]
    fn device_change_navigates() {
        let h = harness();
        h.store.write("deviceSelect", "led");

        let reactions = h.orchestrator.dispatch(&FormEvent::Change("deviceSelect".to_string()));

        assert_eq!(reactions, [Reaction::Navigated("/diode/?diode=led".to_string())]);
        assert_eq!(h.navigator.visited(), ["/diode/?diode=led"]);
        assert_eq!(h.spawner.pending(), 0);
        assert!(h.orchestrator.dispatch(&FormEvent::Change("ni".to_string())).is_empty());
    }

    #[tokio::test]
    async fn failed_recompute_is_swallowed() {
        let h = harness();
        h.transport.reply("not json");
        let before = h.store.snapshot();

        h.orchestrator.dispatch(&FormEvent::Blur("ni".to_string()));
        h.spawner.run_all().await;

        assert_eq!(h.store.snapshot(), before);
    }
}
