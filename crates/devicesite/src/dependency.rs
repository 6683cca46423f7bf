use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Static mapping from a source field to the fields resent alongside it.
///
/// Dependents are assumed never to be triggers themselves. Nothing checks
/// this: a cycle such as `A -> B, B -> A` only costs a redundant request,
/// because a trigger sends exactly one request and never re-triggers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: IndexMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map used by the diode form.
    pub fn diode_form() -> Self {
        Self::new()
            .with("ni", ["Vbi"])
            .with("Vapp", ["Wn"])
            .with("Wn", ["Wp"])
            .with("Is", ["Id"])
    }

    pub fn with<I, S>(mut self, source: impl Into<String>, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges
            .insert(source.into(), dependents.into_iter().map(Into::into).collect());
        self
    }

    /// Declared dependents in declaration order, empty for unknown fields.
    pub fn dependents_of(&self, source: &str) -> &[String] {
        self.edges.get(source).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_source(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }
}
