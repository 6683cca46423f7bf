//! Platform bindings for the form.
//!
//! The core never touches a real document. `browser` attaches it to the DOM
//! of the served page; headless drivers (tests, the CLI) use
//! [`MemoryFieldStore`](crate::field_store::MemoryFieldStore) instead.

#[cfg(all(feature = "browser", target_arch = "wasm32"))]
pub mod browser;
