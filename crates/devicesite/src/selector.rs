//! Keyboard-stepped selector over a fixed numeric range.
//!
//! The control is a plain `<select>` whose native interaction is switched
//! off: it stays focusable, but arrow keys only move the selection while
//! the selector is unlocked, one option per key press, without wrapping.

use serde::Serialize;

use crate::config::SelectorConfig;
use crate::field_store::FieldStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectorOption {
    /// Comparison value, e.g. `-0.95`.
    pub value: String,
    /// Display text, e.g. `-0.95 V`.
    pub label: String,
}

/// Upper bound on generated options. Wider ranges produce an empty domain.
pub const MAX_OPTIONS: usize = 10_000;

/// Number of options `[min, max]` at `step` would produce, or `None` past
/// [`MAX_OPTIONS`].
pub fn option_count(min: f64, max: f64, step: f64) -> Option<usize> {
    if !(step > 0.0) || min > max {
        return Some(0);
    }
    let span = ((max - min) / step + 1e-9).floor();
    if !span.is_finite() || span >= MAX_OPTIONS as f64 {
        return None;
    }
    Some(span as usize + 1)
}

/// Discrete options over `[min, max]` at a fixed step, strictly increasing.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorDomain {
    options: Vec<SelectorOption>,
    numbers: Vec<f64>,
}

impl SelectorDomain {
    /// Options are computed from their index (`min + i * step`) and rounded
    /// to `precision`, so drift never accumulates past `max`.
    pub fn generate(min: f64, max: f64, step: f64, precision: usize, unit: &str) -> Self {
        let mut domain = Self {
            options: Vec::new(),
            numbers: Vec::new(),
        };
        let count = match option_count(min, max, step) {
            Some(count) => count,
            None => {
                log::warn!("[{min}, {max}] at step {step} exceeds {MAX_OPTIONS} options");
                return domain;
            }
        };
        for i in 0..count {
            let number = round_to(min + i as f64 * step, precision);
            if number > max || domain.numbers.last().is_some_and(|last| number <= *last) {
                continue;
            }
            let value = format!("{number:.precision$}");
            let label = if unit.is_empty() {
                value.clone()
            } else {
                format!("{value} {unit}")
            };
            domain.options.push(SelectorOption { value, label });
            domain.numbers.push(number);
        }
        domain
    }

    pub fn from_config(config: &SelectorConfig) -> Self {
        Self::generate(config.min, config.max, config.step, config.precision, &config.unit)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn options(&self) -> &[SelectorOption] {
        &self.options
    }

    pub fn get(&self, index: usize) -> Option<&SelectorOption> {
        self.options.get(index)
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.options.iter().position(|option| option.value == value)
    }

    /// Index of the option nearest to `target` (first one on ties).
    pub fn closest_index(&self, target: f64) -> Option<usize> {
        self.numbers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
            .map(|(index, _)| index)
    }
}

fn round_to(number: f64, precision: usize) -> f64 {
    let scale = 10f64.powi(precision as i32);
    let rounded = (number * scale).round() / scale;
    // -0.0 would print as "-0.00"
    if rounded == 0.0 { 0.0 } else { rounded }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LockState {
    #[default]
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Tab,
    Other(String),
}

impl Key {
    /// From a DOM `KeyboardEvent.key` name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowUp" => Key::ArrowUp,
            "ArrowDown" => Key::ArrowDown,
            "Tab" => Key::Tab,
            other => Key::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyOutcome {
    /// Suppress the platform's own handling of the key.
    pub prevent_default: bool,
    /// New selection index, if the key moved it.
    pub moved_to: Option<usize>,
}

#[derive(Debug)]
pub struct SteppedSelector {
    field: String,
    domain: SelectorDomain,
    index: usize,
}

impl SteppedSelector {
    /// Fill the control with `domain` and select the option closest to
    /// `initial`.
    pub fn initialize<S: FieldStore>(
        field: impl Into<String>,
        domain: SelectorDomain,
        initial: f64,
        store: &S,
    ) -> Self {
        let field = field.into();
        let index = domain.closest_index(initial).unwrap_or_default();
        store.set_options(&field, domain.options());
        if let Some(option) = domain.get(index) {
            store.write(&field, &option.value);
        }
        log::debug!("selector {field}: {} options, starting at {index}", domain.len());
        Self { field, domain, index }
    }

    pub fn from_config<S: FieldStore>(config: &SelectorConfig, store: &S) -> Self {
        Self::initialize(
            config.field.clone(),
            SelectorDomain::from_config(config),
            config.initial,
            store,
        )
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn domain(&self) -> &SelectorDomain {
        &self.domain
    }

    pub fn selected(&self) -> Option<&SelectorOption> {
        self.domain.get(self.index)
    }

    /// Re-read the selection from the field. Mouse picks and service
    /// responses change it without going through `handle_key`.
    ///
    /// An exact option value wins; other numeric text selects the nearest
    /// option. Anything else keeps the current selection.
    pub fn sync<S: FieldStore>(&mut self, store: &S) -> usize {
        let current = store.read(&self.field);
        let index = current.as_deref().and_then(|value| {
            self.domain.index_of(value).or_else(|| {
                let number = value.trim().parse::<f64>().ok()?;
                self.domain.closest_index(number)
            })
        });
        if let Some(index) = index {
            self.index = index;
        }
        self.index
    }

    /// Every key except Tab is swallowed so the native dropdown never opens
    /// and focus can still leave. Arrow keys step only while unlocked, from
    /// whatever the field currently shows; a successful step writes the new
    /// value into the field.
    pub fn handle_key<S: FieldStore>(&mut self, key: &Key, lock: LockState, store: &S) -> KeyOutcome {
        let prevent_default = *key != Key::Tab;
        if lock.is_locked() {
            return KeyOutcome {
                prevent_default,
                moved_to: None,
            };
        }
        self.sync(store);
        let target = match key {
            Key::ArrowUp if self.index + 1 < self.domain.len() => Some(self.index + 1),
            Key::ArrowDown if self.index > 0 => Some(self.index - 1),
            _ => None,
        };
        if let Some(index) = target {
            self.index = index;
            if let Some(option) = self.domain.get(index) {
                store.write(&self.field, &option.value);
            }
        }
        KeyOutcome {
            prevent_default,
            moved_to: target,
        }
    }
}
