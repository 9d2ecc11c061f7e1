//! Hangar Plugin SDK
//!
//! The capability set every plugin implements and the host tables those
//! capabilities act on. Plugins depend on this crate only; the kernel owns
//! the [`Host`] and calls the hooks in lifecycle order.

pub mod host;
pub mod routes;
pub mod services;
pub mod views;

use std::path::PathBuf;

pub use host::Host;
pub use routes::{Route, RouteTable};
pub use services::ServiceRegistry;
pub use views::ViewTable;

/// Capability hooks implemented by every loaded plugin.
///
/// The kernel calls `register` on every loaded plugin before calling `boot`
/// on any of them, so `boot` may rely on services other plugins registered.
/// `unregister` must undo everything `register` and `boot` did to the host.
pub trait Plugin: Send + Sync {
    /// Plugin machine name (the directory name of its descriptor).
    fn name(&self) -> &str;

    /// Install or override service bindings.
    fn register(&self, host: &mut Host) -> anyhow::Result<()>;

    /// Side effects that need other services in place (routes, views).
    fn boot(&self, host: &mut Host) -> anyhow::Result<()>;

    /// Reverse `register` and detach everything mounted under the plugin's prefix.
    fn unregister(&self, host: &mut Host) -> anyhow::Result<()>;
}

/// What the kernel knows about a plugin when constructing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContext {
    /// Plugin machine name.
    pub name: String,
    /// Version declared by the descriptor the instance is built from.
    pub version: String,
    /// Root directory of the plugin's deployed code.
    pub base_path: PathBuf,
}

/// Constructor registered with the kernel's loader under a plugin identity.
pub type PluginFactory = Box<dyn Fn(&PluginContext) -> Box<dyn Plugin> + Send + Sync>;

pub mod prelude {
    pub use crate::host::Host;
    pub use crate::routes::{Route, RouteTable};
    pub use crate::services::ServiceRegistry;
    pub use crate::views::ViewTable;
    pub use crate::{Plugin, PluginContext, PluginFactory};
}
