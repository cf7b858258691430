// SPDX-License-Identifier: MIT

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vaultflow::adk::command::{CommandExecutor, ModelCommandExecutor};
use vaultflow::adk::model::openai::OpenAIModel;
use vaultflow::adk::model::Model;
use vaultflow::flow::config::EngineConfig;
use vaultflow::flow::pipeline::PipelineSet;
use vaultflow::flow::runtime::Executor;
use vaultflow::flow::workflow::layout::{ensure_layout, layout_workflow};
use vaultflow::flow::workflow::store::write_json;
use vaultflow::flow::workflow::{validate_workflow, ValidationOptions, WorkflowDefinition, WorkflowStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the vault's queues and process requests until Ctrl-C
    Serve,
    /// Validate a workflow file and print the normalised definition
    Validate {
        file: PathBuf,

        /// Accept code nodes
        #[arg(long)]
        allow_code: bool,
    },
    /// Lay out a workflow file
    Layout {
        file: PathBuf,

        /// Re-lay-out even when the current positions are usable
        #[arg(long)]
        force: bool,

        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },
    /// Execute a workflow by id or from a file
    Run {
        /// Workflow id in the vault, or a path to a workflow file
        workflow: String,

        /// Run input; parsed as JSON when possible, otherwise used as text
        #[arg(short, long)]
        input: Option<String>,
    },
}

fn build_model(config: &EngineConfig) -> anyhow::Result<Arc<dyn Model>> {
    if config.api_key.is_none() {
        log::warn!("OPENAI_API_KEY is not set; only servers without authentication will work");
    }
    let model = OpenAIModel::new(config.model.clone(), &config.base_url, config.api_key.clone())?;
    log::info!("Using model {} at {}", config.model, model.endpoint());
    Ok(Arc::new(model))
}

async fn read_workflow_value(path: &Path) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

async fn load_valid(path: &Path, allow_code: bool) -> anyhow::Result<WorkflowDefinition> {
    let value = read_workflow_value(path).await?;
    match validate_workflow(&value, ValidationOptions::allow_code(allow_code)) {
        Ok(validated) => {
            for warning in &validated.warnings {
                log::warn!("{}", warning);
            }
            Ok(validated.workflow)
        }
        Err(errors) => bail!("{} is invalid:\n{}", path.display(), errors),
    }
}

fn parse_input(raw: Option<String>) -> Option<Value> {
    raw.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Serve => {
            let config = EngineConfig::from_env()?;
            let paths = config.paths();
            paths.ensure().await?;
            log::info!("Serving vault {}", paths.root().display());

            let model = build_model(&config)?;
            let commands: Arc<dyn CommandExecutor> = Arc::new(ModelCommandExecutor::new(Arc::clone(&model)));
            let pipelines = PipelineSet::new(&paths, model, commands);

            tokio::select! {
                _ = pipelines.serve(config.scan_interval) => {}
                result = tokio::signal::ctrl_c() => {
                    result?;
                    log::info!("Shutting down");
                }
            }
        }
        Commands::Validate { file, allow_code } => {
            let workflow = load_valid(&file, allow_code).await?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
        }
        Commands::Layout { file, force, write } => {
            let mut workflow = load_valid(&file, true).await?;
            if force {
                layout_workflow(&mut workflow);
            } else if !ensure_layout(&mut workflow) {
                log::info!("Positions are usable; only missing handles were filled in");
            }

            if write {
                write_json(&file, &workflow).await?;
                println!("Wrote {}", file.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&workflow)?);
            }
        }
        Commands::Run { workflow, input } => {
            let config = EngineConfig::from_env()?;
            let path = Path::new(&workflow);
            let definition = if path.is_file() {
                load_valid(path, true).await?
            } else {
                WorkflowStore::new(config.paths().workflows_dir())
                    .load(&workflow)
                    .await?
            };

            let model = build_model(&config)?;
            let executor = Executor::from_config(Arc::new(ModelCommandExecutor::new(model)), &config);
            let execution = executor.run(&definition, parse_input(input)).await;

            println!("{}", serde_json::to_string_pretty(&execution.run)?);
            if let Some(error) = execution.run.error {
                bail!("Run failed: {}", error);
            }
        }
    }

    Ok(())
}
