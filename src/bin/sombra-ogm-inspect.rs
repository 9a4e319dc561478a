//! Inspects the type encoding of a graph snapshot.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sombra_ogm::{
    config::{OgmConfig, StrategyOverride},
    model::{ElementRef, TypeDescriptor},
    store::{GraphStore, IndexKind, MemoryGraph},
    template::GraphTemplate,
    typerep::{Instantiators, ProbeReport, Strategy},
};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "sombra_ogm=warn";

#[derive(Parser, Debug)]
#[command(
    name = "sombra-ogm-inspect",
    version,
    about = "Inspect how a graph snapshot records entity types",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Override the configured strategy")]
    strategy: Option<StrategyArg>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Show which type encoding the snapshot uses")]
    Probe {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: Option<PathBuf>,
    },
    #[command(about = "List the elements tagged with a type")]
    Types {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: Option<PathBuf>,
        #[arg(value_name = "TYPE")]
        type_name: String,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum StrategyArg {
    Auto,
    Indexed,
    Subreference,
    Noop,
}

impl From<StrategyArg> for StrategyOverride {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => StrategyOverride::Auto,
            StrategyArg::Indexed => StrategyOverride::Indexed,
            StrategyArg::Subreference => StrategyOverride::SubReference,
            StrategyArg::Noop => StrategyOverride::Noop,
        }
    }
}

#[derive(Serialize)]
struct ProbeOutput {
    snapshot: PathBuf,
    strategy: Strategy,
    registry: &'static str,
    probe: ProbeReport,
    nodes: usize,
    relationships: usize,
    node_indexes: Vec<String>,
    relationship_indexes: Vec<String>,
}

#[derive(Serialize)]
struct TypesOutput {
    snapshot: PathBuf,
    type_name: String,
    strategy: Strategy,
    count: u64,
    elements: Vec<ElementRef>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => OgmConfig::load(path)?,
        None => OgmConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy.into();
    }
    init_tracing(&config);

    match &cli.command {
        Command::Probe { snapshot } => {
            let path = snapshot_path(snapshot.as_deref(), &config)?;
            let graph = Arc::new(MemoryGraph::open(&path)?);
            let template = open_template(&graph, &config)?;
            let output = ProbeOutput {
                snapshot: path,
                strategy: template.strategy(),
                registry: template.strategy().object_type(),
                probe: template.probe_report().cloned().unwrap_or_default(),
                nodes: graph.node_count(),
                relationships: graph.relationship_count(),
                node_indexes: graph.index_names(IndexKind::Nodes),
                relationship_indexes: graph.index_names(IndexKind::Relationships),
            };
            emit(cli.format, &output, print_probe)?;
        }
        Command::Types {
            snapshot,
            type_name,
        } => {
            let path = snapshot_path(snapshot.as_deref(), &config)?;
            let graph = Arc::new(MemoryGraph::open(&path)?);
            let template = open_template(&graph, &config)?;
            let ty = TypeDescriptor::new(type_name);
            let elements = template
                .type_representation()
                .iterate_by_type(&ty)?
                .to_vec()?;
            let output = TypesOutput {
                snapshot: path,
                type_name: ty.to_string(),
                strategy: template.strategy(),
                count: elements.len() as u64,
                elements,
            };
            emit(cli.format, &output, print_types)?;
        }
    }
    Ok(())
}

fn init_tracing(config: &OgmConfig) {
    let directive = config.log.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn snapshot_path(explicit: Option<&Path>, config: &OgmConfig) -> Result<PathBuf, Box<dyn Error>> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| config.store.snapshot.clone())
        .ok_or_else(|| "no snapshot given and none configured under [store]".into())
}

fn open_template(
    graph: &Arc<MemoryGraph>,
    config: &OgmConfig,
) -> Result<GraphTemplate, Box<dyn Error>> {
    let store: Arc<dyn GraphStore> = graph.clone();
    Ok(GraphTemplate::open(store, Instantiators::default(), config)?)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(&T),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(value),
    }
    Ok(())
}

fn print_header(title: &str) {
    println!();
    println!("{title}");
    println!("{}", "═".repeat(title.chars().count()));
}

fn print_section(title: &str) {
    println!();
    println!("─── {} {}", title, "─".repeat(40usize.saturating_sub(title.len())));
}

fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("  {:.<30} {}", name, value);
}

fn print_probe(output: &ProbeOutput) {
    print_header("Type encoding");
    print_field("Snapshot", output.snapshot.display());
    print_field("Strategy", output.strategy);
    print_field("Registry", output.registry);

    print_section("Probe");
    print_field("Type index present", output.probe.indexed);
    print_field("Subreference markers", output.probe.subreference_labels.len());
    for label in &output.probe.subreference_labels {
        println!("    {label}");
    }
    if output.probe.is_dual_signature() {
        println!("  WARNING: both encodings are present; the indexed encoding wins");
    }

    print_section("Graph");
    print_field("Nodes", output.nodes);
    print_field("Relationships", output.relationships);
    print_field("Node indexes", output.node_indexes.join(", "));
    print_field("Relationship indexes", output.relationship_indexes.join(", "));
}

fn print_types(output: &TypesOutput) {
    print_header(&format!("Instances of {}", output.type_name));
    print_field("Strategy", output.strategy);
    print_field("Count", output.count);
    for element in &output.elements {
        println!("    {element}");
    }
}
