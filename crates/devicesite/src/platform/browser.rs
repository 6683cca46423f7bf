//! Browser platform: binds the orchestrator to the served page.
//!
//! `run` is the wasm entry point. It reads the credential cookie once,
//! builds the orchestrator over the live document and attaches one DOM
//! listener per [`Binding`]. The handle is parked in a thread local for
//! the lifetime of the page.

mod dom;
mod logger;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::{Closure, wasm_bindgen};
use web_sys::{Element, Event, KeyboardEvent};

pub use dom::{DomFieldStore, LocationNavigator, TaskSpawner};
pub use logger::ConsoleLogger;

use crate::config::FormConfig;
use crate::credential::Credential;
use crate::orchestrator::{Binding, EventKind, FormEvent, Orchestrator, Reaction};
use crate::recompute::{RecomputeClient, RecomputeError};
use crate::selector::Key;
use crate::transport::HttpTransport;

pub type BrowserOrchestrator = Orchestrator<DomFieldStore, HttpTransport>;

thread_local! {
    static FORM: RefCell<Option<FormHandle>> = RefCell::new(None);
}

#[derive(Debug)]
pub enum StartError {
    NoDocument,
    NoOrigin,
    Transport(RecomputeError),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::NoDocument => write!(f, "no window document"),
            StartError::NoOrigin => write!(f, "cannot read page origin"),
            StartError::Transport(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for StartError {}

struct Listener {
    target: Element,
    event: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.closure.as_ref().unchecked_ref());
    }
}

/// Live form. Dropping it detaches every listener.
pub struct FormHandle {
    orchestrator: Rc<BrowserOrchestrator>,
    _listeners: Vec<Listener>,
}

impl FormHandle {
    pub fn orchestrator(&self) -> &Rc<BrowserOrchestrator> {
        &self.orchestrator
    }
}

#[wasm_bindgen(start)]
pub fn run() {
    let _ = ConsoleLogger::install(log::LevelFilter::Debug);
    match start(FormConfig::default()) {
        Ok(handle) => FORM.with(|cell| *cell.borrow_mut() = Some(handle)),
        Err(error) => log::error!("form not started: {error}"),
    }
}

pub fn start(config: FormConfig) -> Result<FormHandle, StartError> {
    let store = DomFieldStore::from_window().ok_or(StartError::NoDocument)?;
    let origin = web_sys::window()
        .and_then(|window| window.location().origin().ok())
        .ok_or(StartError::NoOrigin)?;
    let transport = HttpTransport::new(&origin).map_err(StartError::Transport)?;
    let credential = Credential::from_cookies(
        &store.cookies(),
        &config.credential_cookie,
        config.credential_header.clone(),
    );

    let client = RecomputeClient::from_config(store.clone(), transport, credential, &config);
    let orchestrator = Rc::new(Orchestrator::new(config, client, TaskSpawner, LocationNavigator));

    let listeners = orchestrator
        .bindings()
        .into_iter()
        .filter_map(|binding| attach(&store, &orchestrator, binding))
        .collect();
    Ok(FormHandle {
        orchestrator,
        _listeners: listeners,
    })
}

fn attach(store: &DomFieldStore, orchestrator: &Rc<BrowserOrchestrator>, binding: Binding) -> Option<Listener> {
    let Some(target) = store.element(&binding.field) else {
        log::debug!("no element #{}, skipping {} listener", binding.field, binding.kind.dom_name());
        return None;
    };
    let event_name = binding.kind.dom_name();
    let orchestrator = Rc::clone(orchestrator);
    let Binding { field, kind } = binding;

    let closure: Closure<dyn FnMut(Event)> = Closure::new(move |event: Event| {
        let form_event = match kind {
            EventKind::Blur => FormEvent::Blur(field.clone()),
            EventKind::Change => FormEvent::Change(field.clone()),
            EventKind::KeyDown => {
                let Some(keyboard) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                FormEvent::KeyDown {
                    field: field.clone(),
                    key: Key::from_name(&keyboard.key()),
                }
            }
        };
        for reaction in orchestrator.dispatch(&form_event) {
            if let Reaction::Key(outcome) = reaction {
                if outcome.prevent_default {
                    event.prevent_default();
                }
            }
        }
    });

    if let Err(error) = target.add_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref()) {
        log::warn!("cannot listen to {event_name} on #{}: {error:?}", target.id());
        return None;
    }
    Some(Listener {
        target,
        event: event_name,
        closure,
    })
}
