use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use jasonify::batch::{self, BatchStats, Outcome};
use jasonify::engine::DEFAULT_MAX_DEPTH;
use jasonify::input::{self, Loaded};
use jasonify::{extract_with, Document, ExtractOptions, Mapping, Registry};

#[derive(Parser)]
#[command(name = "jasonify", version, about = "Extract typed JSON records from HTML pages")]
struct Cli {
    /// Directory of named mappings (*.json, *.toml)
    #[arg(long, global = true, env = "JASONIFY_MAPPINGS", default_value = "mappings")]
    mappings: PathBuf,

    /// Deepest object nesting followed before giving up on a branch
    #[arg(long, global = true, env = "JASONIFY_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one document (file path or http(s) URL)
    Extract {
        /// Mapping file, or a name from the mappings directory
        #[arg(short, long)]
        mapping: String,
        input: String,
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
        /// Print only the data tree, diagnostics go to the log
        #[arg(long)]
        data_only: bool,
    },
    /// Check mapping files and print every structural error
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Extract many documents in parallel, one JSON line per document
    Batch {
        #[arg(short, long)]
        mapping: String,
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// List mappings in the mappings directory
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let options = ExtractOptions {
        max_depth: cli.max_depth,
    };

    match cli.command {
        Commands::Extract {
            mapping,
            input,
            compact,
            data_only,
        } => {
            let mapping = resolve_mapping(&mapping, &cli.mappings)?;
            let Loaded { markup, url, .. } = input::load(&input).await?;
            let document = match url {
                Some(url) => Document::parse_with_url(&markup, url),
                None => Document::parse(&markup),
            };
            let extraction = extract_with(&document, &mapping, &options)
                .with_context(|| format!("extracting {input}"))?;

            for diagnostic in &extraction.diagnostics {
                info!("{}", diagnostic);
            }
            let json = if data_only {
                to_json(&extraction.data, compact)?
            } else {
                to_json(&extraction, compact)?
            };
            println!("{json}");
            if extraction.is_failed() {
                bail!("no record extracted from {input}");
            }
        }
        Commands::Validate { files } => {
            let mut invalid = 0usize;
            for path in &files {
                match Mapping::from_file(path) {
                    Ok(mapping) => println!("{}: ok ({})", path.display(), mapping.name()),
                    Err(e) => {
                        invalid += 1;
                        println!("{}: {}", path.display(), e);
                    }
                }
            }
            if invalid > 0 {
                bail!("{} of {} mappings invalid", invalid, files.len());
            }
        }
        Commands::Batch { mapping, inputs } => {
            let mapping = resolve_mapping(&mapping, &cli.mappings)?;
            info!("Loading {} documents...", inputs.len());
            let pb = batch::progress_bar(inputs.len());
            let loaded = input::load_all(inputs.clone(), Some(&pb)).await?;
            pb.finish_and_clear();

            let mut pages = Vec::with_capacity(loaded.len());
            let mut outcomes: Vec<(usize, Outcome)> = Vec::new();
            for (i, result) in loaded.into_iter().enumerate() {
                match result {
                    Ok(page) => pages.push((i, page)),
                    Err(e) => outcomes.push((i, Outcome::error(&inputs[i], e))),
                }
            }

            info!("Extracting {} documents with {}...", pages.len(), mapping.name());
            let pb = batch::progress_bar(pages.len());
            let (indices, pages): (Vec<usize>, Vec<Loaded>) = pages.into_iter().unzip();
            let extracted = batch::extract_all(&pages, &mapping, &options, Some(&pb));
            pb.finish_and_clear();
            outcomes.extend(indices.into_iter().zip(extracted));
            outcomes.sort_by_key(|(i, _)| *i);

            let outcomes: Vec<Outcome> = outcomes.into_iter().map(|(_, o)| o).collect();
            let mut stdout = std::io::stdout().lock();
            for outcome in &outcomes {
                writeln!(stdout, "{}", serde_json::to_string(outcome)?)?;
            }
            stdout.flush()?;
            eprintln!("{}", BatchStats::from_outcomes(&outcomes));
        }
        Commands::List => {
            let registry = load_registry(&cli.mappings)?;
            if registry.is_empty() {
                println!("No mappings in {}", cli.mappings.display());
            }
            for name in registry.names() {
                let mapping = registry.get(&name)?;
                println!(
                    "{:<24} {:>3} fields  {}",
                    name,
                    mapping.root().fields.len(),
                    mapping.base_url().map(|u| u.as_str()).unwrap_or("-")
                );
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("Done in {}", format_duration(elapsed));
    }
    Ok(())
}

/// A path to a mapping file, or the name of one in the mappings directory.
fn resolve_mapping(arg: &str, dir: &Path) -> anyhow::Result<Arc<Mapping>> {
    let path = Path::new(arg);
    if path.is_file() {
        let mapping = Mapping::from_file(path)
            .with_context(|| format!("loading mapping {}", path.display()))?;
        return Ok(Arc::new(mapping));
    }
    let registry = load_registry(dir)?;
    Ok(registry.get(arg)?)
}

fn load_registry(dir: &Path) -> anyhow::Result<Registry> {
    let mut registry = Registry::new();
    registry
        .load_dir(dir)
        .with_context(|| format!("loading mappings from {}", dir.display()))?;
    Ok(registry)
}

fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> serde_json::Result<String> {
    if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
