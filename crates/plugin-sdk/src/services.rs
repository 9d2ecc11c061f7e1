//! Interface-to-implementation bindings that plugins may override.

use std::collections::BTreeMap;

use tracing::debug;

/// Process-wide service bindings.
///
/// Starts from a set of defaults and returns to them on [`reset`](Self::reset).
/// Plugins override a binding in `register` and put the default back in
/// `unregister`.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    defaults: BTreeMap<String, String>,
    bindings: BTreeMap<String, String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_default`](Self::set_default).
    pub fn with_default(
        mut self,
        interface: impl Into<String>,
        implementation: impl Into<String>,
    ) -> Self {
        self.set_default(interface, implementation);
        self
    }

    /// Declare the default implementation of an interface and bind it.
    pub fn set_default(&mut self, interface: impl Into<String>, implementation: impl Into<String>) {
        let interface = interface.into();
        let implementation = implementation.into();
        self.defaults
            .insert(interface.clone(), implementation.clone());
        self.bindings.insert(interface, implementation);
    }

    /// Bind `interface` to `implementation`, dropping any previous binding first.
    pub fn bind(&mut self, interface: impl Into<String>, implementation: impl Into<String>) {
        let interface = interface.into();
        let implementation = implementation.into();
        self.unbind(&interface);
        debug!(%interface, %implementation, "bound service");
        self.bindings.insert(interface, implementation);
    }

    /// Remove the binding for `interface`, returning the implementation it had.
    pub fn unbind(&mut self, interface: &str) -> Option<String> {
        self.bindings.remove(interface)
    }

    /// Put the default implementation back, or leave the interface unbound
    /// when it has none.
    pub fn restore_default(&mut self, interface: &str) {
        match self.defaults.get(interface).cloned() {
            Some(implementation) => self.bind(interface, implementation),
            None => {
                self.unbind(interface);
            }
        }
    }

    pub fn resolve(&self, interface: &str) -> Option<&str> {
        self.bindings.get(interface).map(String::as_str)
    }

    pub fn is_overridden(&self, interface: &str) -> bool {
        self.bindings.get(interface) != self.defaults.get(interface)
    }

    /// Return every binding to its default.
    pub fn reset(&mut self) {
        self.bindings = self.defaults.clone();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
