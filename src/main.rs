use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pelee_lib::catalog::PipelineCatalog;
use pelee_lib::config::EngineSettings;
use pelee_lib::error::PeleeResult;
use pelee_lib::event::Event;
use pelee_lib::logger;
use pelee_lib::pipeline::{OutputSink, VecSource};
use pelee_lib::registry::{PipelineDefinition, PipelineFactory};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "pelee",
    version,
    about = "Configuration-driven record-processing pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the settings file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one event through a pipeline
    Run {
        /// Definition file, or an id from the pipelines directory
        pipeline: String,
        /// Input event payload as JSON (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Use the multi-strategy engine
        #[arg(long)]
        enhanced: bool,
    },
    /// Assemble a pipeline without running it
    Check {
        /// Definition file, or an id from the pipelines directory
        pipeline: String,
        /// Assemble for the multi-strategy engine
        #[arg(long)]
        enhanced: bool,
    },
    /// Send events through a definition's filter chain
    Filter {
        /// Definition file, or an id from the pipelines directory
        pipeline: String,
        /// One event payload, or a JSON array of payloads (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// List registered stage types
    Stages,
    /// List registered filter types
    Filters,
    /// List pipelines in the pipelines directory
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = EngineSettings::load(cli.config.as_deref())?;
    logger::init(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    let factory = PipelineFactory::with_builtins()?.with_workers(settings.parallel_workers);

    match cli.command {
        Commands::Run {
            pipeline,
            input,
            enhanced,
        } => {
            let definition = resolve(&pipeline, &settings)?;
            let payload = read_input(input.as_deref())?;
            let output = if enhanced {
                let pipeline = factory.create_enhanced(&definition)?;
                pipeline.initialize()?;
                let result = pipeline.execute(Event::new(payload));
                pipeline.shutdown();
                result.into_result()?.into_payload()
            } else {
                let pipeline = factory.create_pipeline(&definition)?;
                let mut event = Event::new(payload);
                pipeline.execute(&mut event)?;
                event.into_payload()
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Check { pipeline, enhanced } => {
            let definition = resolve(&pipeline, &settings)?;
            println!("{}", factory.check(&definition, enhanced)?);
        }
        Commands::Filter { pipeline, input } => {
            let definition = resolve(&pipeline, &settings)?;
            let events: Vec<Event> = match read_input(input.as_deref())? {
                Value::Array(items) => items.into_iter().map(Event::new).collect(),
                single => vec![Event::new(single)],
            };
            let pipeline = factory
                .create_data_pipeline(&definition)?
                .source(VecSource::new(events))
                .sink(StdoutSink)
                .build();
            let report = pipeline.drain()?;
            eprintln!(
                "{} read, {} written, {} dropped",
                report.read, report.delivered, report.dropped
            );
        }
        Commands::Stages => {
            for code in factory.stages().type_codes() {
                let description = factory
                    .stages()
                    .get(code)
                    .map(|d| d.description())
                    .unwrap_or_default();
                println!("{:<10} {}", code, description);
            }
        }
        Commands::Filters => {
            for code in factory.filters().type_codes() {
                let description = factory
                    .filters()
                    .get(code)
                    .map(|d| d.description())
                    .unwrap_or_default();
                println!("{:<10} {}", code, description);
            }
        }
        Commands::List => {
            let catalog = PipelineCatalog::load_dir(&settings.pipelines_dir).with_context(|| {
                format!("Failed to read {}", settings.pipelines_dir.display())
            })?;
            for id in catalog.ids() {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

/// Writes each event payload as one JSON line
struct StdoutSink;

impl OutputSink for StdoutSink {
    fn send(&self, event: &Event) -> PeleeResult<()> {
        println!("{}", serde_json::to_string(event.payload())?);
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// A path to a definition file, or a catalog id
fn resolve(pipeline: &str, settings: &EngineSettings) -> Result<PipelineDefinition> {
    let path = Path::new(pipeline);
    if path.is_file() {
        return Ok(PipelineDefinition::from_file(path)?);
    }
    if !settings.pipelines_dir.is_dir() {
        bail!(
            "'{}' is not a file and {} is not a directory",
            pipeline,
            settings.pipelines_dir.display()
        );
    }
    let catalog = PipelineCatalog::load_dir(&settings.pipelines_dir)?;
    Ok(catalog.get(pipeline)?.clone())
}

fn read_input(input: Option<&Path>) -> Result<Value> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Input is not valid JSON")
}
