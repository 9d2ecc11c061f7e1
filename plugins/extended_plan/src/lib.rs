//! Extended plan plugin for Hangar.
//!
//! Overrides the host's `plan` service with the tiered implementation and
//! exposes a plan browser under `/extendedPlan`. Uninstalling puts the
//! simple plan service back.

use std::path::PathBuf;

use hangar_sdk::prelude::*;
use tracing::debug;

/// Route prefix and view namespace owned by this plugin.
pub const NS: &str = "extendedPlan";

/// Service interface this plugin overrides.
pub const PLAN_SERVICE: &str = "plan";

/// Implementation bound to [`PLAN_SERVICE`] while the plugin is registered.
pub const EXTENDED_PLAN_SERVICE: &str = "extended_plan::ExtendedPlanService";

/// Identity declared as `entry` in `extended_plan.info.toml`.
pub const IDENTITY: &str = "extended_plan::ExtendedPlan";

pub struct ExtendedPlan {
    name: String,
    views_dir: PathBuf,
}

impl ExtendedPlan {
    pub fn new(ctx: &PluginContext) -> Self {
        Self {
            name: ctx.name.clone(),
            views_dir: ctx.base_path.join("views"),
        }
    }

    /// Factory for the kernel's loader.
    pub fn factory() -> PluginFactory {
        Box::new(|ctx: &PluginContext| -> Box<dyn Plugin> { Box::new(Self::new(ctx)) })
    }
}

impl Plugin for ExtendedPlan {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, host: &mut Host) -> anyhow::Result<()> {
        host.services.bind(PLAN_SERVICE, EXTENDED_PLAN_SERVICE);
        debug!("extended_plan registered");
        Ok(())
    }

    fn boot(&self, host: &mut Host) -> anyhow::Result<()> {
        host.routes.mount(
            NS,
            NS,
            [
                Route::get("/", "index"),
                Route::get("/{plan}", "show"),
                Route::post("/{plan}/subscribe", "subscribe"),
            ],
        );
        host.views.add_namespace(NS, &self.views_dir);
        debug!("extended_plan booted");
        Ok(())
    }

    fn unregister(&self, host: &mut Host) -> anyhow::Result<()> {
        host.detach_namespace(NS);
        host.services.restore_default(PLAN_SERVICE);
        debug!("extended_plan unregistered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn plugin() -> ExtendedPlan {
        ExtendedPlan::new(&PluginContext {
            name: "extended_plan".into(),
            version: "1.0.0".into(),
            base_path: PathBuf::from("/srv/plugins/extended_plan"),
        })
    }

    fn host() -> Host {
        Host::new(ServiceRegistry::new().with_default(PLAN_SERVICE, "core::SimplePlanService"))
    }

    #[test]
    fn register_and_boot_wire_service_routes_and_views() {
        let plugin = plugin();
        let mut host = host();
        plugin.register(&mut host).unwrap();
        plugin.boot(&mut host).unwrap();

        assert_eq!(host.services.resolve(PLAN_SERVICE), Some(EXTENDED_PLAN_SERVICE));
        assert_eq!(host.routes.find("GET", "/extendedPlan/gold").unwrap().name, "extendedPlan.show");
        assert_eq!(
            host.views.resolve("extendedPlan::plans.index").unwrap(),
            PathBuf::from("/srv/plugins/extended_plan/views/plans/index.html")
        );
    }

    #[test]
    fn unregister_restores_simple_plan() {
        let plugin = plugin();
        let mut host = host();
        plugin.register(&mut host).unwrap();
        plugin.boot(&mut host).unwrap();
        plugin.unregister(&mut host).unwrap();

        assert_eq!(host.services.resolve(PLAN_SERVICE), Some("core::SimplePlanService"));
        assert!(host.routes.is_empty());
        assert!(host.views.resolve("extendedPlan::plans.index").is_none());
    }
}
