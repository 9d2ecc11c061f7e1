//! Hangar CLI
//!
//! Plugin lifecycle and migration commands against a PostgreSQL host.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hangar_kernel::config::Config;
use hangar_kernel::db;
use hangar_kernel::plugin::{PluginError, PluginLoader, PluginManager, cli};
use hangar_kernel::schema::PgSchema;
use hangar_kernel::store::PgStore;
use hangar_sdk::{Host, ServiceRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Implementation bound to the `plan` service when no plugin overrides it.
const SIMPLE_PLAN_SERVICE: &str = "hangar::SimplePlanService";

#[derive(Parser, Debug)]
#[command(author, version, about = "Hangar plugin lifecycle manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plugin lifecycle and migration commands.
    #[command(subcommand)]
    Plugin(PluginCommand),
}

#[derive(Subcommand, Debug)]
enum PluginCommand {
    /// List discovered plugins and their state.
    List,

    /// Install a plugin and run its migrations.
    Install { name: String },

    /// Roll back a plugin's migrations and deactivate it.
    Uninstall {
        name: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Change an installed plugin's version.
    Version {
        name: String,
        version: String,
        #[arg(long)]
        force: bool,
    },

    /// Run pending plugin migrations.
    Migrate {
        name: Option<String>,
        /// Version recorded for the applied units (default: the declared version).
        #[arg(long = "plugin-version")]
        plugin_version: Option<String>,
        /// Migration directory to use instead of the descriptor's.
        #[arg(long, requires = "name")]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },

    /// Roll back the latest batch of plugin migrations.
    Rollback {
        name: Option<String>,
        /// Only roll back units recorded under this version (default: the declared version).
        #[arg(long = "plugin-version")]
        plugin_version: Option<String>,
        #[arg(long, requires = "name")]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },

    /// Show which migrations of a plugin have run.
    Status {
        name: String,
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let precondition = e
                .downcast_ref::<PluginError>()
                .is_some_and(PluginError::is_precondition);
            if precondition {
                warn!(error = %format!("{e:#}"), "command refused");
            } else {
                error!(error = %format!("{e:#}"), "command failed");
            }
            let _ = writeln!(std::io::stderr(), "{}", e.root_cause());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    let pool = db::create_pool(&config).await?;
    if !db::check_health(&pool).await {
        bail!("database health check failed");
    }
    let store = Arc::new(PgStore::new(pool.clone()));
    store
        .ensure_schema()
        .await
        .context("failed to prepare plugin tables")?;
    info!("plugin store ready");

    let mut manager = PluginManager::new(
        config.manager_config(),
        store,
        Arc::new(PgSchema::new(pool)),
        builtin_plugins(),
        Host::new(
            ServiceRegistry::new().with_default(extended_plan::PLAN_SERVICE, SIMPLE_PLAN_SERVICE),
        ),
    );

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout().lock();

    let Command::Plugin(command) = args.command;
    match command {
        PluginCommand::List => {
            manager.discover();
            cli::cmd_plugin_list(&manager, &mut out).await
        }
        PluginCommand::Install { name } => {
            manager.start().await?;
            cli::cmd_plugin_install(&mut manager, &name, &mut out).await
        }
        PluginCommand::Uninstall { name, force } => {
            manager.start().await?;
            cli::cmd_plugin_uninstall(&mut manager, &name, force, &mut input, &mut out).await
        }
        PluginCommand::Version {
            name,
            version,
            force,
        } => {
            manager.start().await?;
            cli::cmd_plugin_version(&mut manager, &name, &version, force, &mut input, &mut out)
                .await
        }
        PluginCommand::Migrate {
            name,
            plugin_version,
            path,
            force,
        } => {
            manager.discover();
            cli::cmd_plugin_migrate(
                &mut manager,
                name.as_deref(),
                plugin_version.as_deref(),
                path.as_deref(),
                force,
                &mut input,
                &mut out,
            )
            .await
        }
        PluginCommand::Rollback {
            name,
            plugin_version,
            path,
            force,
        } => {
            manager.discover();
            cli::cmd_plugin_rollback(
                &mut manager,
                name.as_deref(),
                plugin_version.as_deref(),
                path.as_deref(),
                force,
                &mut input,
                &mut out,
            )
            .await
        }
        PluginCommand::Status { name, path } => {
            manager.discover();
            cli::cmd_plugin_status(&manager, &name, path.as_deref(), &mut out).await
        }
    }
}

/// Plugins compiled into this binary, keyed by descriptor identity.
fn builtin_plugins() -> PluginLoader {
    PluginLoader::new().with(extended_plan::IDENTITY, extended_plan::ExtendedPlan::factory())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
