//! Payload validators the dispatcher can run on rendered webhook bodies.
//! The registry is fixed at startup: built-ins plus whatever the process
//! registers before the workers spawn, never extended at runtime.

mod alertmanager;

use std::collections::HashMap;

pub use alertmanager::validate_alertmanager;

/// Verdict of a validator run. `hint` carries the first structural error
/// when `ok` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub ok: bool,
    pub hint: String,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            ok: true,
            hint: String::new(),
        }
    }

    pub fn rejected(hint: impl Into<String>) -> Self {
        Self {
            ok: false,
            hint: hint.into(),
        }
    }
}

pub type ValidatorFn = Box<dyn Fn(&str) -> Validation + Send + Sync>;

pub struct ValidatorRegistry {
    validators: HashMap<String, ValidatorFn>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ValidatorRegistry {
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// The built-in set: currently the `alertmanager` payload validator.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("alertmanager", Box::new(|payload| validate_alertmanager(payload)));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, validator: ValidatorFn) {
        self.validators.insert(name.into(), validator);
    }

    pub fn get(&self, name: &str) -> Option<&ValidatorFn> {
        self.validators.get(name)
    }
}
