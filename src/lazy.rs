use std::cell::{Cell, OnceCell};
use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::error::GripError;

/// Value computed on first access and memoized.
///
/// A failing computation leaves the cell empty, so the next access retries.
/// An access made while the value is being computed fails with
/// [`GripError::MalformedClass`]: class files whose declarations refer to
/// each other in a loop end up there.
pub struct Deferred<T> {
    cell: OnceCell<T>,
    init: Rc<dyn Fn() -> Result<T>>,
    running: Cell<bool>,
}

impl<T> Deferred<T> {
    pub fn new(init: impl Fn() -> Result<T> + 'static) -> Self {
        Self {
            cell: OnceCell::new(),
            init: Rc::new(init),
            running: Cell::new(false),
        }
    }

    /// Cell that is already materialized.
    pub fn ready(value: T) -> Self
    where
        T: Clone + 'static,
    {
        let cell = OnceCell::new();
        let fallback = value.clone();
        let _ = cell.set(value);
        Self {
            cell,
            init: Rc::new(move || Ok(fallback.clone())),
            running: Cell::new(false),
        }
    }

    pub fn get(&self) -> Result<&T> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        if self.running.replace(true) {
            return Err(GripError::MalformedClass("cyclic declaration".to_string()).into());
        }
        let result = (self.init)();
        self.running.set(false);
        let value = result?;
        Ok(self.cell.get_or_init(|| value))
    }

    pub fn is_materialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: Clone> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        let cell = OnceCell::new();
        if let Some(value) = self.cell.get() {
            let _ = cell.set(value.clone());
        }
        Self {
            cell,
            init: Rc::clone(&self.init),
            running: Cell::new(false),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("Deferred").field(value).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}
