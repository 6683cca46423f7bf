//! Reactive recompute layer for the diode calculation form.
//!
//! The user edits one field, the client resends that field together with
//! its declared dependents to the calculation service, and whatever the
//! service answers is written back into the visible fields verbatim.
//!
//! Everything here is platform-neutral except [`platform::browser`], which
//! binds the same logic to a real DOM document (feature `browser`).

pub mod config;
pub mod credential;
pub mod dependency;
pub mod field_store;
pub mod orchestrator;
pub mod platform;
pub mod recompute;
pub mod selector;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use config::{ConfigError, FormConfig, SelectorConfig};
pub use credential::Credential;
pub use dependency::DependencyGraph;
pub use field_store::{FieldKind, FieldStore, MemoryFieldStore};
pub use orchestrator::{Binding, EventKind, FormEvent, Navigator, Orchestrator, Reaction, Spawner};
pub use recompute::{AppliedUpdate, RecomputeClient, RecomputeError, RecomputeRequest, RecomputeResponse};
pub use selector::{Key, KeyOutcome, LockState, SelectorDomain, SelectorOption, SteppedSelector};
pub use transport::{HttpTransport, Transport};
