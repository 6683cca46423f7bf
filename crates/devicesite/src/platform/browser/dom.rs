//! DOM implementations of the form seams.

use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlDocument, HtmlElement, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

use crate::field_store::{FieldKind, FieldStore};
use crate::orchestrator::{LocalTask, Navigator, Spawner};
use crate::selector::SelectorOption;

/// Fields are elements addressed by id.
#[derive(Clone)]
pub struct DomFieldStore {
    document: Document,
}

enum Control {
    Input(HtmlInputElement),
    Select(HtmlSelectElement),
    TextArea(HtmlTextAreaElement),
    Text(Element),
}

impl DomFieldStore {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn from_window() -> Option<Self> {
        Some(Self::new(web_sys::window()?.document()?))
    }

    pub fn element(&self, name: &str) -> Option<Element> {
        self.document.get_element_by_id(name)
    }

    /// `document.cookie`, empty when unavailable.
    pub fn cookies(&self) -> String {
        self.document
            .dyn_ref::<HtmlDocument>()
            .and_then(|document| document.cookie().ok())
            .unwrap_or_default()
    }

    fn control(&self, name: &str) -> Option<Control> {
        let element = self.element(name)?;
        let element = match element.dyn_into::<HtmlInputElement>() {
            Ok(input) => return Some(Control::Input(input)),
            Err(element) => element,
        };
        let element = match element.dyn_into::<HtmlSelectElement>() {
            Ok(select) => return Some(Control::Select(select)),
            Err(element) => element,
        };
        Some(match element.dyn_into::<HtmlTextAreaElement>() {
            Ok(text_area) => Control::TextArea(text_area),
            Err(element) => Control::Text(element),
        })
    }
}

impl FieldStore for DomFieldStore {
    fn kind(&self, name: &str) -> Option<FieldKind> {
        Some(match self.control(name)? {
            Control::Text(_) => FieldKind::Display,
            _ => FieldKind::Editable,
        })
    }

    fn read(&self, name: &str) -> Option<String> {
        Some(match self.control(name)? {
            Control::Input(input) => input.value(),
            Control::Select(select) => select.value(),
            Control::TextArea(text_area) => text_area.value(),
            Control::Text(element) => element.text_content().unwrap_or_default(),
        })
    }

    fn write(&self, name: &str, value: &str) {
        match self.control(name) {
            Some(Control::Input(input)) => input.set_value(value),
            Some(Control::Select(select)) => select.set_value(value),
            Some(Control::TextArea(text_area)) => text_area.set_value(value),
            Some(Control::Text(element)) => element.set_text_content(Some(value)),
            None => {}
        }
    }

    fn focus(&self, name: &str) -> bool {
        self.element(name)
            .and_then(|element| element.dyn_into::<HtmlElement>().ok())
            .is_some_and(|element| element.focus().is_ok())
    }

    fn set_options(&self, name: &str, options: &[SelectorOption]) {
        let Some(Control::Select(select)) = self.control(name) else {
            return;
        };
        select.set_length(0);
        for option in options {
            let Ok(element) = self.document.create_element("option") else {
                log::warn!("cannot create option for {name}");
                return;
            };
            let _ = element.set_attribute("value", &option.value);
            element.set_text_content(Some(&option.label));
            if select.append_child(&element).is_err() {
                log::warn!("cannot append option {} to {name}", option.value);
            }
        }
    }
}

/// Spawns on the zoon task executor.
pub struct TaskSpawner;

impl Spawner for TaskSpawner {
    fn spawn(&self, task: LocalTask) {
        zoon::Task::start(task);
    }
}

/// Navigates by assigning `window.location.href`.
pub struct LocationNavigator;

impl Navigator for LocationNavigator {
    fn navigate(&self, url: &str) {
        let Some(window) = web_sys::window() else {
            log::error!("no window, cannot navigate to {url}");
            return;
        };
        if let Err(error) = window.location().set_href(url) {
            log::error!("navigation to {url} failed: {error:?}");
        }
    }
}
