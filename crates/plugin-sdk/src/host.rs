//! The mutable host state plugins act on.

use crate::routes::RouteTable;
use crate::services::ServiceRegistry;
use crate::views::ViewTable;

/// Service bindings, mounted routes and view namespaces of one host process.
///
/// Owned by the plugin manager and lent to plugin hooks; nothing else
/// mutates it.
#[derive(Debug, Default)]
pub struct Host {
    pub services: ServiceRegistry,
    pub routes: RouteTable,
    pub views: ViewTable,
}

impl Host {
    /// Create a host whose service registry starts from the given defaults.
    pub fn new(services: ServiceRegistry) -> Self {
        Self {
            services,
            routes: RouteTable::default(),
            views: ViewTable::default(),
        }
    }

    /// Return to the boot state: default bindings, nothing mounted.
    pub fn reset(&mut self) {
        self.services.reset();
        self.routes.clear();
        self.views.clear();
    }

    /// Unmount every route under `prefix` and drop the view namespace of the
    /// same name. Returns the number of routes removed.
    pub fn detach_namespace(&mut self, prefix: &str) -> usize {
        let removed = self.routes.unmount(prefix);
        self.views.remove_namespace(prefix);
        removed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::routes::Route;

    #[test]
    fn reset_restores_defaults_and_clears_tables() {
        let mut host = Host::new(ServiceRegistry::new().with_default("plan", "core::SimplePlan"));
        host.services.bind("plan", "ext::ExtendedPlan");
        host.routes.mount("ext", "ext", [Route::get("/", "index")]);
        host.views.add_namespace("ext", "/srv/ext/views");

        host.reset();

        assert_eq!(host.services.resolve("plan"), Some("core::SimplePlan"));
        assert!(host.routes.is_empty());
        assert!(host.views.resolve("ext::index").is_none());
    }

    #[test]
    fn detach_namespace_leaves_other_plugins_alone() {
        let mut host = Host::default();
        host.routes.mount("billing", "billing", [Route::get("/", "index")]);
        host.routes.mount("blog", "blog", [Route::get("/", "index")]);
        host.views.add_namespace("billing", "/srv/billing/views");
        host.views.add_namespace("blog", "/srv/blog/views");

        assert_eq!(host.detach_namespace("billing"), 1);
        assert!(host.routes.find("GET", "/blog").is_some());
        assert!(host.views.resolve("blog::index").is_some());
        assert!(host.views.resolve("billing::index").is_none());
    }
}
