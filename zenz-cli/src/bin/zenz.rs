//! zenz: one-shot generation, evaluation and tokenization from the shell

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zenz_engine::hf_download::resolve_model_path;
use zenz_engine::model_config::registry;
use zenz_engine::{CandidateEvaluation, Conditions, ZenzEngine};

/// zenz kana-kanji conversion tool
#[derive(Parser, Debug)]
#[command(name = "zenz")]
#[command(about = "Greedy conversion and candidate evaluation with zenz GGUF models")]
struct Cli {
    /// Model variant id from models.toml (defaults to the registry default)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Direct GGUF file path (overrides --model)
    #[arg(long, global = true)]
    gguf: Option<PathBuf>,

    /// Context window size (clamped to 128..=4096)
    #[arg(long, global = true, default_value_t = 512)]
    n_ctx: i32,

    /// Inference threads (clamped to 1..=8)
    #[arg(long, global = true, default_value_t = 4)]
    threads: i32,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConditionArgs {
    /// Left context (text before the cursor)
    #[arg(long, default_value = "")]
    context: String,
    #[arg(long, default_value = "")]
    profile: String,
    #[arg(long, default_value = "")]
    topic: String,
    #[arg(long, default_value = "")]
    style: String,
    #[arg(long, default_value = "")]
    preference: String,
}

impl ConditionArgs {
    fn conditions(&self) -> Conditions {
        Conditions {
            profile: self.profile.clone(),
            topic: self.topic.clone(),
            style: self.style.clone(),
            preference: self.preference.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert katakana input to kana-kanji text
    Convert {
        /// Katakana input
        input: String,
        #[command(flatten)]
        conditions: ConditionArgs,
        /// Maximum generated tokens
        #[arg(long, default_value_t = 32)]
        max_tokens: usize,
    },

    /// Greedy generation from a raw, already tagged prompt
    Generate {
        prompt: String,
        #[arg(long, default_value_t = 32)]
        max_tokens: usize,
    },

    /// Check whether the model agrees with a candidate conversion.
    ///
    /// Prints PASS:<score>, FIX:<prefix>, WHOLE:<text> or ERROR.
    Evaluate {
        /// Katakana input
        input: String,
        /// Proposed conversion
        candidate: String,
        #[command(flatten)]
        conditions: ConditionArgs,
    },

    /// Show how the model tokenizes text
    Tokenize { text: String },

    /// List the models in the registry
    Models,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "zenz=debug,zenz_engine=debug"
    } else {
        "zenz=warn,zenz_engine=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let engine = match cli.command {
        Commands::Models => return list_models(),
        _ => load_engine(&cli)?,
    };

    match cli.command {
        Commands::Convert {
            input,
            conditions,
            max_tokens,
        } => {
            let output = engine.try_generate_with_context_and_conditions(
                &conditions.conditions(),
                &conditions.context,
                &input,
                max_tokens,
            )?;
            tracing::debug!("stopped: {:?}", output.stop);
            println!("{}", output.text);
        }
        Commands::Generate { prompt, max_tokens } => {
            println!("{}", engine.try_generate(&prompt, max_tokens)?.text);
        }
        Commands::Evaluate {
            input,
            candidate,
            conditions,
        } => {
            let result = engine.try_candidate_evaluate(
                &conditions.conditions(),
                &conditions.context,
                &input,
                &candidate,
            );
            match result {
                Ok(evaluation) => println!("{}", evaluation),
                Err(e) => {
                    eprintln!("evaluation failed: {}", e);
                    println!("{}", CandidateEvaluation::Error);
                }
            }
        }
        Commands::Tokenize { text } => {
            for piece in engine.tokenize_display(&text)? {
                println!("{:>6}  {}", piece.id, piece.display);
            }
        }
        Commands::Models => {}
    }

    Ok(())
}

fn load_engine(cli: &Cli) -> Result<ZenzEngine> {
    let path = resolve_model_path(cli.gguf.as_deref(), cli.model.as_deref())
        .context("Failed to locate model")?;
    let engine: ZenzEngine = ZenzEngine::new();
    engine
        .init_model(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    engine.set_runtime_config(cli.n_ctx, cli.threads);
    Ok(engine)
}

fn list_models() -> Result<()> {
    let reg = registry()?;
    for id in reg.all_variant_ids() {
        let Some((family, variant)) = reg.find_variant(id) else {
            continue;
        };
        let marker = if variant.id == reg.default_model { "*" } else { " " };
        println!(
            "{} {:<24} {} ({}/{})",
            marker, variant.id, variant.display_name, family.repo_id, variant.filename
        );
    }
    Ok(())
}
