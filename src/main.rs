use clap::Parser;
use facetlearn::{
    Corpus,
    DataDir,
    FacetConfig,
    FacetOutcome,
    FacetSession,
    bootstrap,
    error,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

/// Characters of OCR text shown next to each result.
const EXCERPT_CHARS: usize = 60;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("FACETLEARN_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config = FacetConfig::load(&data_dir.config())?;
    let metadata = cli.metadata.clone().unwrap_or_else(|| data_dir.metadata());
    let embeddings =
        cli.embeddings.clone().unwrap_or_else(|| data_dir.embeddings());
    let corpus = Corpus::load(&metadata, &embeddings)?;

    match cli.command {
        Command::Learn(args) => {
            let mut config = config;
            if let Some(count) = args.count {
                config.n_results = count;
            }
            if let Some(seed) = args.seed {
                config.seed = seed;
            }
            let n_results = config.n_results;

            let session = FacetSession::new(&corpus, config);
            let outcome = session.learn_facet_detailed(&args.query)?;

            if args.json {
                format_json(&outcome, &corpus, n_results)?;
            } else if args.uuids {
                for c in outcome.candidates.iter().take(n_results) {
                    println!("{}", c.uuid);
                }
            } else {
                format_human(&outcome, &corpus, n_results);
            }
        }
        Command::Search(args) => {
            cmd_search(&corpus, &args)?;
        }
        Command::Status(args) => {
            cmd_status(&data_dir, &corpus, &config, args.json)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn excerpt(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(EXCERPT_CHARS)
        .collect()
}

fn format_human(outcome: &FacetOutcome, corpus: &Corpus, limit: usize) {
    println!(
        "Trained on {} positive / {} negative examples",
        outcome.labels.positives().len(),
        outcome.labels.negatives().len()
    );

    if outcome.candidates.is_empty() {
        println!("No new candidates found.");
        return;
    }

    let shown: Vec<_> = outcome.candidates.iter().take(limit).collect();
    for (i, c) in shown.iter().enumerate() {
        let text = corpus.record(c.uuid).map(|r| r.ocr.as_str()).unwrap_or("");
        println!("{:>4}. [{:.3}] #{} {}", i + 1, c.score, c.uuid, excerpt(text));
    }
    println!("\n{} result(s)", shown.len());
}

fn format_json(
    outcome: &FacetOutcome,
    corpus: &Corpus,
    limit: usize,
) -> error::Result<()> {
    let results: Vec<_> = outcome
        .candidates
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, c)| {
            let fields = corpus
                .record(c.uuid)
                .map(|r| serde_json::Value::Object(r.fields.clone()))
                .unwrap_or_default();
            json!({
                "rank": i + 1,
                "uuid": c.uuid,
                "score": c.score,
                "fields": fields,
            })
        })
        .collect();

    let body = json!({
        "query": outcome.query,
        "positives": outcome.labels.positives().len(),
        "negatives": outcome.labels.negatives().len(),
        "result_count": results.len(),
        "results": results,
    });
    println!("{}", serde_json::to_string(&body)?);
    Ok(())
}

fn cmd_search(corpus: &Corpus, args: &cli::SearchArgs) -> error::Result<()> {
    let hits = bootstrap::keyword_search(corpus, &args.query);

    if args.json {
        let shown: Vec<_> = hits
            .iter()
            .take(args.count)
            .filter_map(|&uuid| corpus.record(uuid))
            .collect();
        let body = json!({
            "query": args.query,
            "match_count": hits.len(),
            "matches": shown,
        });
        println!("{}", serde_json::to_string(&body)?);
    } else if hits.is_empty() {
        println!("No records match '{}'", args.query);
    } else {
        for &uuid in hits.iter().take(args.count) {
            if let Some(record) = corpus.record(uuid) {
                println!("#{uuid} {}", excerpt(&record.ocr));
            }
        }
        println!("\n{} match(es)", hits.len());
    }
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    corpus: &Corpus,
    config: &FacetConfig,
    json: bool,
) -> error::Result<()> {
    if json {
        let body = json!({
            "data_dir": data_dir.root().display().to_string(),
            "records": corpus.len(),
            "dimension": corpus.dimension(),
            "config": config,
        });
        println!("{}", serde_json::to_string(&body)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Records: {}", corpus.len());
        println!("Embedding dimension: {}", corpus.dimension());
        println!("Results per facet: {}", config.n_results);
        println!("Seed: {}", config.seed);
        println!("Example weight: {}", config.example_weight);
    }
    Ok(())
}
