use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graph_explorer::ingest::{parse_option, DataSourceRegistry, SourceOptions};
use graph_explorer::server::ApiServer;
use graph_explorer::workspace::Workspace;
use graph_explorer::Config;
use std::io::{self, BufRead, Write};

#[derive(Parser, Debug)]
#[command(name = "graph-explorer")]
#[command(about = "Load JSON, XML or Turtle data as a graph and explore it", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the JSON HTTP API
    Serve {
        /// Port to listen on (defaults to http_server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Load a source and read shell commands from stdin
    Shell {
        /// Path or http(s) URL of the data to load
        source: String,

        /// Data source id (default: chosen by file extension)
        #[arg(short, long)]
        data_source: Option<String>,

        /// Data source option as key=value (repeatable)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
    },
}

fn main() -> Result<()> {
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.explorer.log_level),
    )
    .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port } => {
            // ingestion reads sources with a blocking client, so the runtime only exists for serving
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(serve(config, port))
        }
        Commands::Shell {
            source,
            data_source,
            options,
        } => run_shell(&config, &source, data_source.as_deref(), &options),
    }
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    log::info!("Starting Graph Explorer v{}", env!("CARGO_PKG_VERSION"));
    let port = port.unwrap_or(config.http_server.port);
    let server = ApiServer::new(config).await?;
    server.run(port).await?;
    Ok(())
}

fn run_shell(config: &Config, source: &str, data_source: Option<&str>, raw_options: &[String]) -> Result<()> {
    let mut options = SourceOptions::new();
    for raw in raw_options {
        let (key, value) = parse_option(raw)?;
        options.insert(key, value);
    }

    let registry = DataSourceRegistry::new(config);
    let data_source = registry.resolve(source, data_source)?;
    let graph = data_source
        .load_data(source, &options)
        .with_context(|| format!("Failed to load {}", source))?;

    let mut workspace = Workspace::with_graph(graph, None);
    workspace.current_data_source_id = Some(data_source.id().to_string());
    println!(
        "Loaded {}: {} nodes, {} links. Type 'help' for commands.",
        source,
        workspace.graph().node_count(),
        workspace.graph().link_count()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "help" => println!("{}", HELP),
            "show" => println!("{}", serde_json::to_string_pretty(&workspace.filtered_graph().to_dict())?),
            "reset" => {
                workspace.reset();
                println!("View reset");
            }
            "filters" => {
                for (i, query) in workspace.applied_filters().iter().enumerate() {
                    println!("{}: {}", i, query);
                }
            }
            command => match workspace.run_command(command) {
                Ok(message) => println!(
                    "{} ({} of {} nodes visible)",
                    message,
                    workspace.filtered_graph().node_count(),
                    workspace.graph().node_count()
                ),
                Err(e) => eprintln!("Error: {}", e),
            },
        }
        stdout.flush()?;
    }
    Ok(())
}

const HELP: &str = "\
create node --id=<id> [--property=Key=Value]...
create edge [--id=<id>] <source> <target> [--property=Key=Value]...
edit node --id=<id> --property=Key=Value...
delete node --id=<id>
delete edge --id=<id>
search <text>
filter <attribute> <op> <value>     op: == != < <= > >=
clear | reset | filters | show | help | exit";
