//! fleetinv CLI
//!
//! Command-line interface for working the fleetinv discovery queue

use clap::{Parser, Subcommand};
use color_eyre::Result;
use fleetinv_api::responses::StatusChangeResponse;
use fleetinv_api::{InventoryStatus, ResourceId, ResourceTypeRef};
use fleetinv_client::HttpClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetinv")]
#[command(about = "Inventory discovery queue CLI", long_about = None)]
struct Cli {
    /// Daemon base URL
    #[arg(long, env = "FLEETINV_URL", default_value = "http://127.0.0.1:7080")]
    url: String,

    /// Operator recorded on status changes
    #[arg(long, env = "FLEETINV_USER", default_value = "admin")]
    user: String,

    /// Print raw JSON responses
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued platforms and their servers
    Queue {
        /// Statuses to list (NEW, IGNORED, ...)
        #[arg(long = "status", value_delimiter = ',', default_value = "NEW")]
        statuses: Vec<InventoryStatus>,
    },
    /// Show a single resource
    Show { id: ResourceId },
    /// Commit NEW resources
    Import {
        #[arg(required = true)]
        ids: Vec<ResourceId>,
    },
    /// Ignore NEW resources
    Ignore {
        #[arg(required = true)]
        ids: Vec<ResourceId>,
    },
    /// Return IGNORED resources to the queue
    Unignore {
        #[arg(required = true)]
        ids: Vec<ResourceId>,
    },
    /// Ask an agent to discover a resource under a committed parent
    Add {
        /// Parent resource id
        #[arg(long)]
        parent: ResourceId,
        /// Resource type name
        #[arg(long = "type")]
        type_name: String,
        /// Plugin defining the type
        #[arg(long)]
        plugin: String,
        /// Plugin configuration as JSON
        #[arg(long, default_value = "{}")]
        config: String,
    },
    /// List registered agents
    Agents,
    /// Register an agent
    #[command(name = "register-agent")]
    RegisterAgent {
        name: String,
        /// Callback address of the agent
        address: String,
    },
    /// Unregister an agent
    #[command(name = "unregister-agent")]
    UnregisterAgent { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.url)?.as_user(&cli.user);

    match cli.command {
        Commands::Queue { statuses } => {
            let queue = client.queue(&statuses).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&queue)?);
                return Ok(());
            }
            if queue.is_empty() {
                println!("discovery queue is empty");
            }
            for entry in queue {
                let p = &entry.platform;
                println!(
                    "{:>6}  {:<10} {} [{}/{}] agent={}",
                    p.id,
                    p.status,
                    p.name,
                    p.type_name,
                    p.plugin,
                    p.agent.as_deref().unwrap_or("-")
                );
                for s in &entry.servers {
                    println!("{:>6}    {:<10} {} [{}/{}]", s.id, s.status, s.name, s.type_name, s.plugin);
                }
            }
        }
        Commands::Show { id } => {
            let resource = client.get_resource(id).await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
        }
        Commands::Import { ids } => {
            report("imported", ids.len(), client.import_resources(ids).await?);
        }
        Commands::Ignore { ids } => {
            report("ignored", ids.len(), client.ignore_resources(ids).await?);
        }
        Commands::Unignore { ids } => {
            report("unignored", ids.len(), client.unignore_resources(ids).await?);
        }
        Commands::Add {
            parent,
            type_name,
            plugin,
            config,
        } => {
            let plugin_configuration: serde_json::Value = serde_json::from_str(&config)?;
            let response = client
                .manually_add_resource(ResourceTypeRef::new(type_name, plugin), parent, plugin_configuration)
                .await?;
            if response.already_existed {
                println!("resource already exists: {}", response.resource_id);
            } else {
                println!("added resource {}", response.resource_id);
            }
        }
        Commands::Agents => {
            let agents = client.list_agents().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&agents)?);
                return Ok(());
            }
            for agent in agents {
                let last_sync = agent
                    .last_sync
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                println!(
                    "{:<20} {:<30} last_sync={} failures={}",
                    agent.name, agent.address, last_sync, agent.sync_failures
                );
            }
        }
        Commands::RegisterAgent { name, address } => {
            let agent = client.register_agent(&name, &address).await?;
            println!("registered agent {} at {}", agent.name, agent.address);
        }
        Commands::UnregisterAgent { name } => {
            client.unregister_agent(&name).await?;
            println!("unregistered agent {name}");
        }
    }

    Ok(())
}

fn report(action: &str, count: usize, response: StatusChangeResponse) {
    println!("{action} {count} resource(s), {} agent sync(s) requested", response.dispatched);
    if response.failed > 0 {
        eprintln!("warning: {} agent sync(s) failed, agents will catch up on their next report", response.failed);
    }
}
