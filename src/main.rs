use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use flowline_rs::config::{EngineConfig, PersistenceKind};
use flowline_rs::flow::builder::Builder;
use flowline_rs::flow::graph::render;
use flowline_rs::flow::loader::FlowLoader;
use flowline_rs::flow::types::FlowFile;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GraphFormat {
    Mermaid,
    Dot,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a flow file and print its trigger graph
    Graph {
        /// Path to the flow file
        #[arg(short, long)]
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value = "mermaid")]
        format: GraphFormat,
    },
    /// Print the JSON schema of the flow file format
    Schema,
    /// List stored snapshots of a run
    Snapshots {
        /// Instance id of the run
        #[arg(short, long)]
        instance: String,

        /// SQLite database URL (defaults to FLOWLINE_DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Graph { file, format } => {
            let def = FlowLoader::new()
                .load_flow(&file)
                .with_context(|| format!("failed to load flow file {}", file))?;
            let registry = Builder::outline(&def)?;

            log::info!(
                "Flow '{}': {} steps, start steps {:?}",
                registry.name(),
                registry.steps().len(),
                registry.start_steps()
            );

            let text = match format {
                GraphFormat::Mermaid => render::to_mermaid(&registry),
                GraphFormat::Dot => render::to_dot(&registry),
            };
            print!("{}", text);
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(FlowFile);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Snapshots {
            instance,
            database_url,
        } => {
            let mut config = EngineConfig::from_env()?;
            config.persistence = PersistenceKind::Sqlite;
            if let Some(url) = database_url {
                config.database_url = url;
            }

            let store = config
                .open_persistence()
                .await?
                .context("snapshot persistence is disabled")?;
            let snapshots = store.list_snapshots(&instance).await?;

            if snapshots.is_empty() {
                println!("No snapshots for instance {}", instance);
            }
            for snapshot in snapshots {
                let completed: Vec<&str> =
                    snapshot.completed.iter().map(|c| c.name.as_str()).collect();
                println!(
                    "{}  {:<24} completed: {}",
                    snapshot.timestamp.to_rfc3339(),
                    snapshot.step_name,
                    completed.join(", ")
                );
            }
        }
    }

    Ok(())
}
