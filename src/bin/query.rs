use anyhow::{Context, Result};
use clap::Parser;
use graph_explorer::ingest::{parse_option, DataSourceRegistry, SourceOptions};
use graph_explorer::query::Query;
use graph_explorer::Config;

#[derive(Parser, Debug)]
#[command(name = "graph-query")]
#[command(about = "Load a source, apply searches and filters, print the resulting graph as JSON")]
struct Args {
    /// Path or http(s) URL of the data to load
    source: String,

    /// Data source id (default: chosen by file extension)
    #[arg(short, long)]
    data_source: Option<String>,

    /// Text search, applied in order (repeatable)
    #[arg(short, long)]
    search: Vec<String>,

    /// Filter expression such as "age >= 30", applied after searches (repeatable)
    #[arg(short, long)]
    filter: Vec<String>,

    /// Data source option as key=value (repeatable)
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let config = Config::load()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.explorer.log_level),
    )
    .init();

    let args = Args::parse();

    let mut options = SourceOptions::new();
    for raw in &args.options {
        let (key, value) = parse_option(raw)?;
        options.insert(key, value);
    }

    let registry = DataSourceRegistry::new(&config);
    let mut graph = registry
        .load(&args.source, args.data_source.as_deref(), &options)
        .with_context(|| format!("Failed to load {}", args.source))?;

    let mut queries: Vec<Query> = args.search.iter().map(|s| Query::search(s.as_str())).collect();
    for expression in &args.filter {
        match Query::parse(expression) {
            query @ Query::Filter { .. } => queries.push(query),
            Query::Search(_) => anyhow::bail!("Invalid filter expression: {}", expression),
        }
    }

    for query in &queries {
        graph = query
            .apply(&graph)
            .with_context(|| format!("Failed to apply '{}'", query))?
            .into_owned();
        log::info!("{}: {} nodes remain", query, graph.node_count());
    }

    let output = if args.pretty {
        serde_json::to_string_pretty(&graph.to_dict())?
    } else {
        serde_json::to_string(&graph.to_dict())?
    };
    println!("{}", output);
    Ok(())
}
