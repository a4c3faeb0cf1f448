// ============================================================================
// phantom-admin - CLI for the phantom access-control registry
// ============================================================================
// Usage:
//   phantom-admin roles                                   List roles and holders
//   phantom-admin grant --actor W moderator intel:read    Add a permission to a role
//   phantom-admin assign --actor W wallet-x moderator     Give a role to an identity
//   phantom-admin check wallet-x --tier OPERATOR mev-extraction
//   phantom-admin edge /dashboard/tools/mev-extraction --cookie "phantom_session=..."
//   phantom-admin export --format json                    Dump registry as JSON
// ============================================================================

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use phantom_core::{
    AccessEvaluator, AdminOp, EdgeDecision, EdgeRequest, EnforcementPoint, GateConfig, Identity,
    Permission, PermissionRegistry, RegistryStore, RoleAdmin, Tier, ViewDecision,
};
use phantom_core::guard::ViewRequest;
use std::sync::Arc;
use tracing::info;

/// Phantom gate registry administration tool
#[derive(Parser)]
#[command(
    name = "phantom-admin",
    version,
    about = "Inspect and administer the phantom access-control registry"
)]
struct Cli {
    /// Path to the registry file (default: ~/.phantom/registry.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Acting identity for mutations
#[derive(clap::Args)]
struct Actor {
    /// Identity performing the change
    #[arg(long)]
    actor: String,

    /// Resolved tier of the acting identity
    #[arg(long, default_value = "ENTRY_LEVEL")]
    actor_tier: String,
}

impl Actor {
    fn identity(&self) -> Result<Identity> {
        let tier: Tier = self.actor_tier.parse()?;
        Ok(Identity::resolved(self.actor.clone(), tier))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show registry statistics
    Stats,

    /// List roles, their permissions, and holders
    Roles,

    /// List registered resources and their requirements
    Resources,

    /// Create an empty role
    CreateRole {
        #[command(flatten)]
        actor: Actor,
        role: String,
    },

    /// Rename a role, keeping its assignments
    RenameRole {
        #[command(flatten)]
        actor: Actor,
        from: String,
        to: String,
    },

    /// Delete a role and all its assignments
    DeleteRole {
        #[command(flatten)]
        actor: Actor,
        role: String,
    },

    /// Add a permission to a role
    Grant {
        #[command(flatten)]
        actor: Actor,
        role: String,
        permission: String,
    },

    /// Remove a permission from a role
    Revoke {
        #[command(flatten)]
        actor: Actor,
        role: String,
        permission: String,
    },

    /// Assign a role to an identity
    Assign {
        #[command(flatten)]
        actor: Actor,
        identity: String,
        role: String,
    },

    /// Remove a role from an identity
    Unassign {
        #[command(flatten)]
        actor: Actor,
        identity: String,
        role: String,
    },

    /// Evaluate an identity against a resource, as the view guard would
    Check {
        identity: String,
        resource: String,
        /// Resolved tier (omit to check an identity still resolving)
        #[arg(long)]
        tier: Option<String>,
    },

    /// Evaluate a request path, as the edge guard would
    Edge {
        path: String,
        /// Raw Cookie header sent with the request
        #[arg(long)]
        cookie: Option<String>,
    },

    /// Show the persisted admin audit trail
    Audit {
        #[command(flatten)]
        actor: Actor,
    },

    /// Export registry contents as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

fn parse_permission(raw: &str) -> Result<Permission> {
    Permission::parse(raw).with_context(|| {
        format!(
            "Valid permissions: {}",
            phantom_core::access::PERMISSION_CATALOG.join(", ")
        )
    })
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("phantom_admin=info".parse()?)
                .add_directive("phantom_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GateConfig::from_env()?;

    // Edge checks need no registry at all
    if let Commands::Edge { path, cookie } = &cli.command {
        return cmd_edge(&config, path, cookie.as_deref());
    }

    let db_path = cli.db_path.clone().or_else(|| config.db_path.clone());
    let store = RegistryStore::open(db_path.as_deref())?;
    let snapshot = store.load_or_seed(config.bootstrap_admin.as_deref())?;
    let registry = Arc::new(PermissionRegistry::from_snapshot(snapshot));

    match cli.command {
        Commands::Stats => cmd_stats(&store),
        Commands::Roles => cmd_roles(&registry),
        Commands::Resources => cmd_resources(&config),
        Commands::CreateRole { actor, role } => {
            cmd_mutate(&store, &registry, &actor, AdminOp::CreateRole { role })
        }
        Commands::RenameRole { actor, from, to } => {
            cmd_mutate(&store, &registry, &actor, AdminOp::RenameRole { from, to })
        }
        Commands::DeleteRole { actor, role } => {
            cmd_mutate(&store, &registry, &actor, AdminOp::DeleteRole { role })
        }
        Commands::Grant {
            actor,
            role,
            permission,
        } => {
            let permission = parse_permission(&permission)?;
            cmd_mutate(&store, &registry, &actor, AdminOp::Grant { role, permission })
        }
        Commands::Revoke {
            actor,
            role,
            permission,
        } => {
            let permission = parse_permission(&permission)?;
            cmd_mutate(&store, &registry, &actor, AdminOp::Revoke { role, permission })
        }
        Commands::Assign {
            actor,
            identity,
            role,
        } => cmd_mutate(&store, &registry, &actor, AdminOp::Assign { identity, role }),
        Commands::Unassign {
            actor,
            identity,
            role,
        } => cmd_mutate(&store, &registry, &actor, AdminOp::Unassign { identity, role }),
        Commands::Check {
            identity,
            resource,
            tier,
        } => cmd_check(&config, &registry, identity, &resource, tier.as_deref()),
        Commands::Audit { actor } => cmd_audit(&config, &store, &registry, &actor),
        Commands::Export { format } => cmd_export(&config, &store, &registry, &format),
        Commands::Edge { .. } => unreachable!("handled before opening the store"),
    }
}

fn cmd_stats(store: &RegistryStore) -> Result<()> {
    let stats = store.stats()?;

    println!("=== Phantom Gate Registry Stats ===");
    println!("Registry:   {}", store.path().display());
    println!();
    println!("Version:    {}", stats.version);
    println!("Roles:      {}", stats.total_roles);
    println!("Identities: {}", stats.total_identities);
    println!("Audit:      {} entries", stats.total_audit_entries);

    Ok(())
}

fn cmd_roles(registry: &PermissionRegistry) -> Result<()> {
    let snapshot = registry.snapshot();

    if snapshot.roles().is_empty() {
        println!("No roles defined.");
        return Ok(());
    }

    for (role, permissions) in snapshot.roles() {
        println!("{} (v{})", role, snapshot.version());
        if permissions.is_empty() {
            println!("  permissions: -");
        } else {
            for p in permissions {
                println!("  permission:  {}", p);
            }
        }
        let holders: Vec<_> = snapshot.holders_of(role).collect();
        println!(
            "  holders:     {}",
            if holders.is_empty() {
                "-".to_string()
            } else {
                holders.join(", ")
            }
        );
    }

    Ok(())
}

fn cmd_resources(config: &GateConfig) -> Result<()> {
    let resources = config.resource_registry();

    println!("{:<22}  {:<16}  {:<26}  {}", "RESOURCE", "TIER", "PERMISSION", "FLAGS");
    println!("{}", "-".repeat(80));
    for (id, req) in resources.entries() {
        let mut flags = Vec::new();
        if req.anonymous {
            flags.push("public".to_string());
        }
        if req.tier.is_some() && req.permission.is_some() {
            flags.push(format!("{:?}", req.combine).to_lowercase());
        }
        println!(
            "{:<22}  {:<16}  {:<26}  {}",
            id,
            req.tier.map(|t| t.id()).unwrap_or("-"),
            req.permission.as_ref().map(|p| p.as_str()).unwrap_or("-"),
            flags.join(",")
        );
    }
    println!(
        "\nUnregistered resources: {:?} default",
        resources.default_policy()
    );

    Ok(())
}

fn cmd_mutate(
    store: &RegistryStore,
    registry: &Arc<PermissionRegistry>,
    actor: &Actor,
    op: AdminOp,
) -> Result<()> {
    let actor = actor.identity()?;
    let admin = RoleAdmin::new(registry.clone());
    let result = admin.apply(&actor, op);

    // Snapshot and audit rows land together; rejections are audited too
    let audit: Vec<_> = admin.audit_log().into_iter().rev().collect();
    store.record_mutation(result.as_deref().ok(), &audit)?;

    let snapshot = result?;
    info!("Saved registry v{}", snapshot.version());
    println!("OK (registry v{})", snapshot.version());
    Ok(())
}

fn cmd_check(
    config: &GateConfig,
    registry: &Arc<PermissionRegistry>,
    identity: String,
    resource: &str,
    tier: Option<&str>,
) -> Result<()> {
    let identity = match tier {
        // Tiers come from an external resolver; unknown ones grant nothing
        Some(raw) => Identity::resolved(identity, Tier::fail_closed_granted(raw)),
        None => Identity::connected(identity),
    };
    let resources = Arc::new(config.resource_registry());
    let evaluator = AccessEvaluator::new(registry.clone(), resources.clone());

    let requirement = resources.requirement_for(resource);
    println!(
        "Requirement: {}{}",
        serde_json::to_string(&requirement)?,
        if resources.is_registered(resource) {
            ""
        } else {
            " (default)"
        }
    );
    let snapshot = registry.snapshot();
    println!(
        "Identity:    {} tier={} permissions=[{}]",
        identity.id,
        identity.tier.effective(),
        identity
            .permissions(&snapshot)
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let decision = evaluator.check_resource(&identity, resource);
    let view = config.view_guard(resources).enforce(ViewRequest {
        identity: Some(&identity),
        snapshot: &*snapshot,
        resource_id: resource,
    });

    match decision.reason() {
        None => println!("Decision:    GRANTED"),
        Some(reason) => println!("Decision:    DENIED ({})", reason),
    }
    match view {
        ViewDecision::Render => println!("View:        render"),
        ViewDecision::Denied { reason } => println!("View:        access denied view ({})", reason),
        ViewDecision::Redirect { location } => println!("View:        redirect to {}", location),
    }
    Ok(())
}

fn cmd_edge(config: &GateConfig, path: &str, cookie: Option<&str>) -> Result<()> {
    let guard = config.edge_guard();
    let request = EdgeRequest::from_cookie_header(path, cookie, &config.session_cookie);

    match guard.enforce(&request) {
        EdgeDecision::Unguarded => println!("{}: not protected, pass through", path),
        EdgeDecision::Proceed => println!("{}: credential present, proceed to view guard", path),
        EdgeDecision::Redirect(location) => {
            println!("{}: no credential, redirect to {}", path, location)
        }
    }
    Ok(())
}

fn cmd_audit(
    config: &GateConfig,
    store: &RegistryStore,
    registry: &Arc<PermissionRegistry>,
    actor: &Actor,
) -> Result<()> {
    let actor = actor.identity()?;
    let evaluator = AccessEvaluator::new(registry.clone(), Arc::new(config.resource_registry()));
    if let Some(reason) = evaluator.check_resource(&actor, "admin/audit").reason() {
        anyhow::bail!("Access denied for {}: {}", actor.id, reason);
    }

    let entries = store.list_audit()?;
    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    for entry in &entries {
        let outcome = match &entry.outcome {
            Ok(version) => format!("ok v{}", version),
            Err(e) => format!("rejected: {}", e),
        };
        println!(
            "{}  {:<20}  {:<40}  {}",
            format_timestamp(entry.at),
            entry.actor,
            entry.op.to_string(),
            outcome
        );
    }
    println!("\nTotal: {} entries", entries.len());
    Ok(())
}

fn cmd_export(
    config: &GateConfig,
    store: &RegistryStore,
    registry: &PermissionRegistry,
    format: &str,
) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let snapshot = registry.snapshot();
    let resources: serde_json::Map<String, serde_json::Value> = config
        .resource_registry()
        .entries()
        .map(|(id, req)| -> Result<(String, serde_json::Value)> {
            Ok((id.to_string(), serde_json::to_value(req)?))
        })
        .collect::<Result<_>>()?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "stats": store.stats()?,
        "config": config,
        "registry": &*snapshot,
        "resources": resources,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
