//! Layered query parameters.
//!
//! User values live at the top level of the map handed to a runtime; values
//! injected by the runner itself live under [`SYSTEM_NAMESPACE`].

use serde::Serialize;
use serde_json::{Map, Value};

/// Top-level key holding system values (`@lab` in a query).
pub const SYSTEM_NAMESPACE: &str = "lab";

/// System key holding a suite's data context.
pub const DATA_KEY: &str = "data";

/// Parameters for one case.
///
/// Cloning is a deep copy, so a clone handed to a concurrent case never
/// observes changes made to another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    user: Map<String, Value>,
    system: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> &Map<String, Value> {
        &self.user
    }

    pub fn system(&self) -> &Map<String, Value> {
        &self.system
    }

    pub fn set_user_value(&mut self, name: impl Into<String>, value: Value) {
        self.user.insert(name.into(), value);
    }

    pub fn set_user_values<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.user.extend(values);
    }

    /// Deep-merge `values` over the user values; `values` win.
    pub fn merge_user_values(&mut self, values: &Map<String, Value>) {
        merge_maps(&mut self.user, values);
    }

    pub fn set_system(&mut self, name: impl Into<String>, value: Value) {
        self.system.insert(name.into(), value);
    }

    /// Store any serializable value under the system namespace.
    pub fn set_system_value<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<()> {
        self.set_system(name, serde_json::to_value(value)?);
        Ok(())
    }

    /// Flatten into the map passed to a runtime.
    ///
    /// A user value named like the system namespace is shadowed.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut out = self.user.clone();
        out.insert(
            SYSTEM_NAMESPACE.to_string(),
            Value::Object(self.system.clone()),
        );
        out
    }
}

/// Recursively merge `overlay` into `target`.
///
/// Objects are merged key by key; every other value in `overlay` replaces
/// the one in `target`.
pub fn deep_merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => merge_maps(target, overlay),
        (target, overlay) => *target = overlay.clone(),
    }
}

fn merge_maps(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match target.get_mut(key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// What a suite's assertion script sees under `@lab.data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataContext {
    pub query: QueryData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryData {
    /// Deserialized output of the query script.
    pub result: Value,
    /// User parameters the query script ran with.
    pub params: Map<String, Value>,
}
