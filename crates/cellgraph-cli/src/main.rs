//! Cellgraph CLI
//!
//! - `run`: annotate marker sets with one method and score the result
//! - `score`: re-score an existing result table
//! - `methods`: list registered annotation methods
//! - `extract`: show the query blocks found in a saved model response

use anyhow::{anyhow, Context, Result};
use cellgraph_pipeline::{
    run_pipeline, score_table, Collaborators, GraphContext, Method, PipelineConfig, RowFilter,
    StrategyKind, DEFAULT_RAG_K, DEFAULT_WEIGHT,
};
use cellgraph_retrieval::{
    extract_queries, ChatClient, ChatClientConfig, Extraction, KeywordRetriever, Neo4jHttpStore,
};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod logging;

#[derive(Parser)]
#[command(name = "cellgraph")]
#[command(author, version, about = "Cell-type annotation with LLM, RAG and knowledge-graph strategies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate the selected rows with one method, then score them.
    ///
    /// Provider settings come from the environment: `DEEPSEEK_API_KEY`,
    /// `DEEPSEEK_BASE_URL`, `CELLGRAPH_LLM_TIMEOUT_SECS`, and `NEO4J_*` for
    /// the knowledge-graph methods.
    Run(RunArgs),

    /// Score an existing result table without annotating.
    Score(ScoreArgs),

    /// List the registered annotation methods.
    Methods,

    /// Print the Cypher blocks found in a model response (`-` reads stdin).
    Extract {
        input: PathBuf,
    },
}

#[derive(Args)]
struct LogArgs {
    /// Directory for the per-run log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    /// Log to the console only
    #[arg(long)]
    no_log_file: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Input CSV with `dataset`, `tissue`, `marker` and the manual reference columns
    #[arg(short, long)]
    input: PathBuf,
    /// Annotation method (see `cellgraph methods`)
    #[arg(short, long)]
    method: String,
    #[arg(long, default_value = "human")]
    species: String,
    /// Only rows of this dataset
    #[arg(long)]
    dataset: Option<String>,
    /// Only rows of this tissue
    #[arg(long)]
    tissue: Option<String>,
    /// Retrieval depth for methods without their own
    #[arg(short = 'k', long, default_value_t = DEFAULT_RAG_K)]
    k: usize,
    /// Weight of the fine label in the final score
    #[arg(short, long, default_value_t = DEFAULT_WEIGHT)]
    weight: f64,
    /// Existing result table to add to (default: start from the input)
    #[arg(long)]
    init_results: Option<PathBuf>,
    /// Where the result table is written
    #[arg(short, long)]
    save: PathBuf,
    /// JSON Lines passage corpus for the RAG methods
    #[arg(long)]
    corpus: Option<PathBuf>,
    /// Graph schema description for the knowledge-graph methods
    #[arg(long)]
    graph_schema: Option<PathBuf>,
    /// Few-shot query examples, separated by blank lines
    #[arg(long)]
    graph_examples: Option<PathBuf>,
    /// Model request timeout in seconds, 0 disables (overrides CELLGRAPH_LLM_TIMEOUT_SECS)
    #[arg(long, value_name = "SECS")]
    llm_timeout: Option<u64>,
    /// System message sent with every model request
    #[arg(long)]
    system_prompt: Option<String>,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct ScoreArgs {
    /// Result table to score
    #[arg(short, long)]
    results: PathBuf,
    #[arg(short, long)]
    method: String,
    #[arg(long)]
    dataset: Option<String>,
    #[arg(long)]
    tissue: Option<String>,
    #[arg(short, long, default_value_t = DEFAULT_WEIGHT)]
    weight: f64,
    /// Output path (default: overwrite the input table)
    #[arg(short, long)]
    save: Option<PathBuf>,
    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Score(args) => cmd_score(args),
        Commands::Methods => {
            cmd_methods();
            Ok(())
        }
        Commands::Extract { input } => cmd_extract(&input),
    }
}

fn init_logging(args: &LogArgs) -> Result<()> {
    let log_dir = (!args.no_log_file).then_some(args.log_dir.as_path());
    if let Some(path) = logging::init(log_dir)? {
        eprintln!("{} {}", "logging to".cyan(), path.display());
    }
    Ok(())
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {what} {}", path.display()))
}

/// Few-shot examples are separated by one or more blank lines.
fn split_examples(raw: &str) -> Vec<String> {
    let mut examples = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in raw.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !current.is_empty() {
                examples.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    examples
}

/// Apply the command-line overrides to the environment's client settings.
fn chat_config(
    base: ChatClientConfig,
    llm_timeout: Option<u64>,
    system_prompt: Option<&str>,
) -> ChatClientConfig {
    let mut config = base;
    if let Some(secs) = llm_timeout {
        config = config.with_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    if let Some(prompt) = system_prompt {
        config = config.with_system_prompt(prompt);
    }
    config
}

fn cmd_run(args: RunArgs) -> Result<()> {
    init_logging(&args.log)?;
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id);
    let _guard = span.enter();

    let method: Method = args.method.parse()?;
    let kind = method.spec().kind;

    let client = ChatClient::new(chat_config(
        ChatClientConfig::from_env()?,
        args.llm_timeout,
        args.system_prompt.as_deref(),
    ))?;
    tracing::info!(
        base_url = %client.config().base_url,
        timeout_secs = ?client.config().timeout.map(|t| t.as_secs()),
        "chat client ready"
    );

    let documents = match &args.corpus {
        Some(path) => Some(KeywordRetriever::from_jsonl(path)?),
        None => None,
    };

    let (store, schema, examples) = if kind == StrategyKind::KgGraphRag {
        let schema_path = args
            .graph_schema
            .as_deref()
            .ok_or_else(|| anyhow!("method {method} needs --graph-schema"))?;
        let schema = read_text(schema_path, "graph schema")?;
        let examples = match &args.graph_examples {
            Some(path) => split_examples(&read_text(path, "graph examples")?),
            None => Vec::new(),
        };
        let store = Neo4jHttpStore::from_env()?;
        tracing::info!(
            uri = %store.config().uri,
            database = %store.config().database,
            "graph store ready"
        );
        (Some(store), schema, examples)
    } else {
        (None, String::new(), Vec::new())
    };

    let mut collaborators = Collaborators::new(&client);
    if let Some(documents) = &documents {
        collaborators = collaborators.with_documents(documents);
    }
    if let Some(store) = &store {
        collaborators = collaborators.with_graph(GraphContext {
            store,
            schema: &schema,
            examples: &examples,
        });
    }

    let config = PipelineConfig {
        dataset: args.dataset,
        tissue: args.tissue,
        default_rag_k: args.k,
        weight: args.weight,
        init_result_path: args.init_results,
        ..PipelineConfig::new(&args.input, &args.method, &args.species, &args.save)
    };
    tracing::info!(method = %method, species = %config.species, "pipeline starting");

    let report = run_pipeline(&config, &collaborators)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    let a = &report.annotation;
    let s = &report.scoring;
    println!(
        "{} {} ({} rows)",
        "ok".green().bold(),
        report.method.bold(),
        a.rows
    );
    println!(
        "  annotated {}  failed {}  unmatched {}",
        a.annotated.to_string().green(),
        a.failed.to_string().red(),
        a.unmatched
    );
    println!(
        "  scored {}  skipped {}  failed {}",
        s.scored.to_string().green(),
        s.skipped_no_prediction + s.skipped_no_references,
        s.failed.to_string().red()
    );
    println!("{} {}", "wrote".green().bold(), report.save_path.display().to_string().bold());
    Ok(())
}

fn cmd_score(args: ScoreArgs) -> Result<()> {
    init_logging(&args.log)?;
    let filter = RowFilter::new(args.dataset.as_deref(), args.tissue.as_deref());
    let save = args.save.unwrap_or_else(|| args.results.clone());
    let report = score_table(&args.results, &args.method, &filter, args.weight, &save)?;
    println!(
        "{} scored {}  skipped {}  failed {}",
        "ok".green().bold(),
        report.scored,
        report.skipped_no_prediction + report.skipped_no_references,
        report.failed
    );
    println!("{} {}", "wrote".green().bold(), save.display().to_string().bold());
    Ok(())
}

fn cmd_methods() {
    println!(
        "{:<26} {:<14} {:<19} {}",
        "METHOD".bold(),
        "STRATEGY".bold(),
        "MODEL".bold(),
        "COLUMN PREFIX".bold()
    );
    for method in Method::ALL {
        let spec = method.spec();
        println!(
            "{:<26} {:<14} {:<19} {}",
            method.name(),
            spec.kind.to_string(),
            spec.model,
            spec.prefix
        );
    }
}

fn cmd_extract(input: &Path) -> Result<()> {
    let text = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        read_text(input, "response")?
    };

    let extraction = extract_queries(&text);
    let how = match &extraction {
        Extraction::Fenced(_) => "fenced",
        Extraction::Fallback(_) => "fallback (whole response)",
        Extraction::Empty => "empty",
    };
    eprintln!("{} {} block(s), {}", "info:".yellow().bold(), extraction.len(), how);
    for (i, block) in extraction.blocks().iter().enumerate() {
        println!("{}", format!("-- block {i}").dimmed());
        println!("{block}");
    }
    Ok(())
}
