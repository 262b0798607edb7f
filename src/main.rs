use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use homedir::my_home;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

mod clause;
mod cli;
mod config;
mod document;
mod semantic;
mod storage;
mod template;
#[cfg(test)]
mod tests;

use clause::{filter_by_answer, load_records, save_records, ClauseRecord};
use config::Config;
use semantic::{ClauseRetrievalService, EmbeddingModel, EmbeddingProvider};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Paragraphs { document } => {
            let paragraphs = document::extract_paragraphs(&document)
                .with_context(|| format!("failed to read {}", document.display()))?;
            println!("{}", serde_json::to_string_pretty(paragraphs.as_slice())?);
        }

        cli::Command::Retrieve {
            document,
            template,
            top_k,
            model,
            output,
            no_cache,
        } => {
            let base_path = base_path()?;
            let mut config = Config::load_with(&base_path).context("failed to load config")?;

            config.retrieval = config.retrieval.with_overrides(top_k, model, no_cache)?;

            let records = retrieve(&config, &base_path, &document, &template)?;
            write_records(output.as_deref(), &records)?;
        }

        cli::Command::Best { records } => {
            for record in read_records(&records)? {
                match record.best_match() {
                    Ok(best) => println!(
                        "{} / {}: [{:.4}] {}",
                        record.clause_name, record.clause_subname, best.confidence, best.clause
                    ),
                    Err(e) => log::warn!("{e}"),
                }
            }
        }

        cli::Command::Filter {
            records,
            answer,
            output,
        } => {
            let records = read_records(&records)?;
            let filtered: Vec<ClauseRecord> =
                filter_by_answer(&records, &answer).cloned().collect();
            log::info!(
                "{} of {} records answered '{}'",
                filtered.len(),
                records.len(),
                answer
            );
            write_records(output.as_deref(), &filtered)?;
        }

        cli::Command::Show { records, top } => {
            let top = top.unwrap_or(config::DEFAULT_TOP_K);
            for record in read_records(&records)? {
                println!("{} / {}", record.clause_name, record.clause_subname);
                println!("{}", record.input_clause);
                if record.retrieved_clauses.is_empty() {
                    println!("{record}");
                } else {
                    println!("{}", record.format_top(top));
                }
                println!();
            }
        }
    }

    Ok(())
}

fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CLAUSEMATCH_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;

    Ok(home.join(".local/share/clausematch"))
}

fn retrieve(
    config: &Config,
    base_path: &Path,
    document: &Path,
    template: &Path,
) -> anyhow::Result<Vec<ClauseRecord>> {
    let mut records = template::load_template(template)
        .with_context(|| format!("failed to load template {}", template.display()))?;

    let model = EmbeddingModel::new(
        &config.retrieval.model,
        base_path.to_path_buf(),
        Some(Duration::from_secs(config.retrieval.download_timeout_secs)),
    )
    .context("failed to initialize embedding model")?;
    log::info!(
        "Embedding model '{}' ready ({} dimensions)",
        config.retrieval.model,
        model.dimensions()
    );

    let service = ClauseRetrievalService::new(model, config.retrieval.clone(), base_path.to_path_buf());

    let doc = service
        .index_document(document)
        .with_context(|| format!("failed to index {}", document.display()))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    pb.set_message(format!("Retrieving {} clauses", records.len()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = service.retrieve_all(&doc, &mut records);
    pb.finish_and_clear();
    result?;

    log::info!(
        "Retrieved top {} paragraphs for {} clauses with '{}'",
        service.top_k(),
        records.len(),
        service.provider().name()
    );

    Ok(records)
}

fn read_records(path: &Path) -> anyhow::Result<Vec<ClauseRecord>> {
    load_records(path).with_context(|| format!("failed to read records {}", path.display()))
}

fn write_records(output: Option<&Path>, records: &[ClauseRecord]) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            save_records(path, records)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("Wrote {} records to {}", records.len(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(records)?),
    }

    Ok(())
}
