//! Named-field access over the form document.
//!
//! A field is addressed by its element id. Editable fields (inputs,
//! selects) hold a value, display fields hold text content; callers never
//! care which, they read and write text.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::selector::SelectorOption;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Input, select or textarea - written through its `value`.
    Editable,
    /// Read-only text node - written through its text content.
    Display,
}

/// Typed accessor over named UI fields.
///
/// Names that don't resolve are silently ignored: `read` returns `None`,
/// `write`/`set_options` do nothing, `focus` returns `false`.
pub trait FieldStore {
    fn kind(&self, name: &str) -> Option<FieldKind>;

    fn read(&self, name: &str) -> Option<String>;

    /// Overwrites the field, even when it is focused and the user is typing.
    fn write(&self, name: &str, value: &str);

    fn focus(&self, name: &str) -> bool;

    /// Replace the options of a selector field.
    fn set_options(&self, name: &str, options: &[SelectorOption]);

    fn contains(&self, name: &str) -> bool {
        self.kind(name).is_some()
    }
}

impl<T: FieldStore + ?Sized> FieldStore for Rc<T> {
    fn kind(&self, name: &str) -> Option<FieldKind> {
        (**self).kind(name)
    }

    fn read(&self, name: &str) -> Option<String> {
        (**self).read(name)
    }

    fn write(&self, name: &str, value: &str) {
        (**self).write(name, value)
    }

    fn focus(&self, name: &str) -> bool {
        (**self).focus(name)
    }

    fn set_options(&self, name: &str, options: &[SelectorOption]) {
        (**self).set_options(name, options)
    }
}

#[derive(Clone, Debug)]
struct MemoryField {
    kind: FieldKind,
    value: String,
    options: Vec<SelectorOption>,
}

/// In-memory document used by tests and the headless CLI.
///
/// Keeps insertion order so snapshots print the way the form is laid out.
#[derive(Debug, Default)]
pub struct MemoryFieldStore {
    fields: RefCell<IndexMap<String, MemoryField>>,
    focused: RefCell<Option<String>>,
}

impl MemoryFieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_editable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, FieldKind::Editable, value);
        self
    }

    pub fn with_display(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, FieldKind::Display, value);
        self
    }

    /// Add a field, or replace an existing one (options are dropped).
    pub fn insert(&self, name: impl Into<String>, kind: FieldKind, value: impl Into<String>) {
        self.fields.borrow_mut().insert(
            name.into(),
            MemoryField {
                kind,
                value: value.into(),
                options: Vec::new(),
            },
        );
    }

    /// Name of the field that last received focus.
    pub fn focused(&self) -> Option<String> {
        self.focused.borrow().clone()
    }

    pub fn options(&self, name: &str) -> Vec<SelectorOption> {
        self.fields
            .borrow()
            .get(name)
            .map(|field| field.options.clone())
            .unwrap_or_default()
    }

    /// Current values in document order.
    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.fields
            .borrow()
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone()))
            .collect()
    }
}

impl FieldStore for MemoryFieldStore {
    fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.borrow().get(name).map(|field| field.kind)
    }

    fn read(&self, name: &str) -> Option<String> {
        self.fields.borrow().get(name).map(|field| field.value.clone())
    }

    fn write(&self, name: &str, value: &str) {
        if let Some(field) = self.fields.borrow_mut().get_mut(name) {
            field.value = value.to_string();
        }
    }

    fn focus(&self, name: &str) -> bool {
        if !self.contains(name) {
            return false;
        }
        *self.focused.borrow_mut() = Some(name.to_string());
        true
    }

    fn set_options(&self, name: &str, options: &[SelectorOption]) {
        if let Some(field) = self.fields.borrow_mut().get_mut(name) {
            field.options = options.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_both_kinds() {
        let store = MemoryFieldStore::new()
            .with_editable("ni", "1e10")
            .with_display("Vbi", "");

        store.write("ni", "1e16");
        store.write("Vbi", "0.70");

        assert_eq!(store.read("ni").as_deref(), Some("1e16"));
        assert_eq!(store.read("Vbi").as_deref(), Some("0.70"));
        assert_eq!(store.kind("ni"), Some(FieldKind::Editable));
        assert_eq!(store.kind("Vbi"), Some(FieldKind::Display));
    }

    #[test]
    fn absent_fields_are_ignored() {
        let store = MemoryFieldStore::new().with_editable("ni", "1");

        assert_eq!(store.read("nope"), None);
        store.write("nope", "x");
        store.set_options("nope", &[]);
        assert!(!store.focus("nope"));
        assert_eq!(store.focused(), None);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn snapshot_keeps_document_order() {
        let store = MemoryFieldStore::new()
            .with_editable("Wn", "1")
            .with_editable("ni", "2")
            .with_display("Id", "3");

        let names: Vec<_> = store.snapshot().into_keys().collect();
        assert_eq!(names, ["Wn", "ni", "Id"]);
    }

    #[test]
    fn shared_store_through_rc() {
        let store = Rc::new(MemoryFieldStore::new().with_editable("Vapp", "0.00"));
        let alias = Rc::clone(&store);

        alias.write("Vapp", "0.05");
        assert!(alias.focus("Vapp"));

        assert_eq!(store.read("Vapp").as_deref(), Some("0.05"));
        assert_eq!(store.focused().as_deref(), Some("Vapp"));
    }
}
