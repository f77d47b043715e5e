//! AJIMEE-Bench evaluation tool for zenz-engine
//!
//! Runs greedy conversion over every item and, independently, asks the model
//! to evaluate the first expected output as a candidate. Items are processed
//! in parallel against one shared engine.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zenz_engine::hf_download::resolve_model_path;
use zenz_engine::prompt::{CONTEXT_START_TAG, INPUT_START_TAG};
use zenz_engine::{CandidateEvaluation, Conditions, ZenzEngine};

/// AJIMEE-Bench evaluation for zenz-engine
#[derive(Parser)]
#[command(name = "zenz-bench")]
struct Cli {
    /// Path to evaluation_items.json
    bench_path: PathBuf,

    /// Model variant id from models.toml (defaults to the registry default)
    #[arg(long)]
    model: Option<String>,

    /// Direct GGUF file path (overrides --model)
    #[arg(long)]
    gguf: Option<PathBuf>,

    /// Save detailed results to JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Disable left context usage
    #[arg(long)]
    no_context: bool,

    /// Skip candidate evaluation of the expected output
    #[arg(long)]
    no_evaluate: bool,

    /// Context window size per session
    #[arg(long, default_value_t = 512)]
    n_ctx: i32,

    /// Inference threads per session
    #[arg(long, default_value_t = 2)]
    threads: i32,

    /// Items processed concurrently (default: half of CPU count)
    #[arg(long)]
    jobs: Option<usize>,

    /// Maximum generated tokens per item
    #[arg(long, default_value_t = 100)]
    max_tokens: usize,
}

/// A single AJIMEE-Bench evaluation item
#[derive(Debug, Deserialize)]
struct BenchItem {
    input: String,
    context_text: Option<String>,
    expected_output: Vec<String>,
}

/// Result for a single evaluation item
#[derive(Debug, Serialize)]
struct ItemResult {
    input: String,
    context: String,
    prediction: String,
    expected: Vec<String>,
    exact_match: bool,
    min_cer: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<String>,
}

/// Overall evaluation metrics
#[derive(Debug, Serialize)]
struct Metrics {
    num_examples: usize,
    exact_match_rate: f64,
    avg_min_cer: f64,
    /// Count per evaluation kind (PASS, FIX, WHOLE, ERROR)
    evaluation_kinds: BTreeMap<&'static str, usize>,
    results: Vec<ItemResult>,
}

impl Metrics {
    fn collect(results: Vec<(ItemResult, Option<&'static str>)>) -> Self {
        let mut evaluation_kinds = BTreeMap::new();
        let mut exact_matches = 0usize;
        let mut total_cer = 0.0f64;
        let mut items = Vec::with_capacity(results.len());

        for (result, kind) in results {
            if result.exact_match {
                exact_matches += 1;
            }
            total_cer += result.min_cer;
            if let Some(kind) = kind {
                *evaluation_kinds.entry(kind).or_insert(0) += 1;
            }
            items.push(result);
        }

        let num_examples = items.len();
        let (exact_match_rate, avg_min_cer) = if num_examples > 0 {
            (
                exact_matches as f64 / num_examples as f64,
                total_cer / num_examples as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            num_examples,
            exact_match_rate,
            avg_min_cer,
            evaluation_kinds,
            results: items,
        }
    }
}

/// Truncate text at the first tag that starts a new prompt section, or a newline
fn truncate_at_stop_tokens(text: &str) -> &str {
    let end = text
        .find([INPUT_START_TAG, CONTEXT_START_TAG, '\n'])
        .unwrap_or(text.len());
    &text[..end]
}

/// Levenshtein distance at the character level (Wagner-Fischer)
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let n = b_chars.len();

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for j in 1..=n {
            let cost = usize::from(*a_char != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Character Error Rate
fn calculate_cer(hypothesis: &str, reference: &str) -> f64 {
    let ref_len = reference.chars().count();
    if ref_len == 0 {
        return if hypothesis.is_empty() {
            0.0
        } else {
            f64::INFINITY
        };
    }
    levenshtein_distance(hypothesis, reference) as f64 / ref_len as f64
}

/// Minimum CER across multiple references
fn calculate_min_cer(hypothesis: &str, references: &[String]) -> f64 {
    references
        .iter()
        .map(|r| calculate_cer(hypothesis, r))
        .fold(f64::INFINITY, f64::min)
}

fn run_item(
    engine: &ZenzEngine,
    cli: &Cli,
    item: &BenchItem,
) -> (ItemResult, Option<&'static str>) {
    let context = if cli.no_context {
        ""
    } else {
        item.context_text.as_deref().unwrap_or("")
    };

    let conditions = Conditions::default();
    let generated = match engine.try_generate_with_context_and_conditions(
        &conditions,
        context,
        &item.input,
        cli.max_tokens,
    ) {
        Ok(output) => output.text,
        Err(e) => {
            tracing::warn!("generation failed for {}: {}", item.input, e);
            String::new()
        }
    };
    let prediction = truncate_at_stop_tokens(&generated).trim().to_string();

    let evaluation = match (cli.no_evaluate, item.expected_output.first()) {
        (false, Some(expected)) => Some(engine.candidate_evaluate(
            &conditions,
            context,
            &item.input,
            expected,
        )),
        _ => None,
    };
    let kind = evaluation.as_ref().map(CandidateEvaluation::kind);

    let result = ItemResult {
        input: item.input.clone(),
        context: context.to_string(),
        exact_match: item.expected_output.contains(&prediction),
        min_cer: calculate_min_cer(&prediction, &item.expected_output),
        prediction,
        expected: item.expected_output.clone(),
        evaluation: evaluation.map(|e| e.to_string()),
    };
    (result, kind)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zenz_bench=info,zenz_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Configure rayon thread pool (default: half of CPU count)
    let jobs = cli.jobs.unwrap_or_else(|| {
        (std::thread::available_parallelism().map_or(4, |n| n.get()) / 2).max(1)
    });
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build_global()
        .ok(); // ignore error if already initialized

    let path = resolve_model_path(cli.gguf.as_deref(), cli.model.as_deref())
        .context("Failed to locate model")?;
    eprintln!("Loading model from {}...", path.display());
    let engine: ZenzEngine = ZenzEngine::new();
    engine
        .init_model(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let config = engine.set_runtime_config(cli.n_ctx, cli.threads);
    eprintln!(
        "Sessions: n_ctx={} threads={} jobs={}",
        config.context_length, config.thread_count, jobs
    );

    eprintln!("Loading benchmark from {}...", cli.bench_path.display());
    let data = std::fs::read_to_string(&cli.bench_path)
        .with_context(|| format!("Failed to read {}", cli.bench_path.display()))?;
    let items: Vec<BenchItem> =
        serde_json::from_str(&data).context("Failed to parse evaluation_items.json")?;
    let items: Vec<BenchItem> = items.into_iter().filter(|i| !i.input.is_empty()).collect();
    eprintln!("Loaded {} examples", items.len());

    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
            .context("invalid progress template")?
            .progress_chars("=>-"),
    );

    let results: Vec<(ItemResult, Option<&'static str>)> = items
        .par_iter()
        .map(|item| {
            let result = run_item(&engine, &cli, item);
            pb.inc(1);
            result
        })
        .collect();
    pb.finish_with_message("done");

    let metrics = Metrics::collect(results);

    for (n, result) in metrics.results.iter().enumerate() {
        if result.exact_match {
            continue;
        }
        println!("\n[{}] NG", n + 1);
        println!("  Input:    {}", result.input);
        if !result.context.is_empty() {
            println!("  Context:  {}", result.context);
        }
        println!("  Output:   {}", result.prediction);
        println!("  Expected: {:?}", result.expected);
        if let Some(evaluation) = &result.evaluation {
            println!("  Evaluate: {}", evaluation);
        }
    }

    println!();
    println!("{}", "=".repeat(50));
    println!("Evaluation Results");
    println!("{}", "=".repeat(50));
    println!("Number of examples: {}", metrics.num_examples);
    println!("Exact match rate:   {:.2}%", metrics.exact_match_rate * 100.0);
    println!("Avg min CER:        {:.4}", metrics.avg_min_cer);
    if !metrics.evaluation_kinds.is_empty() {
        println!("{}", "-".repeat(50));
        for (kind, count) in &metrics.evaluation_kinds {
            println!("{:<6} {}", kind, count);
        }
    }
    println!("{}", "=".repeat(50));

    if let Some(output_path) = &cli.output {
        let json = serde_json::to_string_pretty(&metrics)?;
        std::fs::write(output_path, &json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        eprintln!("Detailed results saved to {}", output_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("漢字", "漢字"), 0);
        assert_eq!(levenshtein_distance("漢字", "感じ"), 2);
        assert_eq!(levenshtein_distance("漢字", "漢字検定"), 2);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_cer() {
        assert_eq!(calculate_cer("漢字", "漢字"), 0.0);
        assert_eq!(calculate_cer("漢", "漢字"), 0.5);
        assert_eq!(calculate_cer("", ""), 0.0);
        assert!(calculate_cer("漢", "").is_infinite());
    }

    #[test]
    fn test_min_cer() {
        let refs = vec!["感じ".to_string(), "漢字".to_string()];
        assert_eq!(calculate_min_cer("漢字", &refs), 0.0);
        assert!(calculate_min_cer("漢字", &[]).is_infinite());
    }

    #[test]
    fn test_truncate_at_stop_tokens() {
        assert_eq!(truncate_at_stop_tokens("漢字\nです"), "漢字");
        assert_eq!(truncate_at_stop_tokens("漢字\u{ee00}カンジ"), "漢字");
        assert_eq!(truncate_at_stop_tokens("漢字"), "漢字");
    }

    #[test]
    fn test_metrics_collect() {
        let item = |prediction: &str, exact_match: bool, min_cer: f64| ItemResult {
            input: "カンジ".to_string(),
            context: String::new(),
            prediction: prediction.to_string(),
            expected: vec!["漢字".to_string()],
            exact_match,
            min_cer,
            evaluation: None,
        };
        let metrics = Metrics::collect(vec![
            (item("漢字", true, 0.0), Some("PASS")),
            (item("感じ", false, 1.0), Some("FIX")),
            (item("漢字", true, 0.0), Some("PASS")),
            (item("", false, 1.0), None),
        ]);
        assert_eq!(metrics.num_examples, 4);
        assert_eq!(metrics.exact_match_rate, 0.5);
        assert_eq!(metrics.avg_min_cer, 0.5);
        assert_eq!(metrics.evaluation_kinds.get("PASS"), Some(&2));
        assert_eq!(metrics.evaluation_kinds.get("FIX"), Some(&1));
        assert_eq!(metrics.evaluation_kinds.len(), 2);
    }

    #[test]
    fn test_metrics_empty() {
        let metrics = Metrics::collect(Vec::new());
        assert_eq!(metrics.num_examples, 0);
        assert_eq!(metrics.exact_match_rate, 0.0);
    }
}
