// keepsake-cli: maintenance frontend for keepsake-core
// Argument parsing, logging setup, JSON output

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use keepsake_core::{Memory, RecordKind, SearchFilters};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("keepsake: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn type_filter(types: &[RecordKind]) -> Option<&[RecordKind]> {
    (!types.is_empty()).then_some(types)
}

/// Execute one command, writing JSON to `out`.
fn run(cli: Cli, out: &mut impl Write) -> io::Result<()> {
    let memory = Memory::load(cli.home).map_err(io::Error::other)?;
    log::debug!("data root {}", memory.root().display());

    match cli.command {
        Command::Search {
            query,
            limit,
            types,
            projects,
            days,
            no_highlight,
        } => {
            let filters = SearchFilters {
                doc_types: types,
                project_ids: projects,
                days_back: days,
            };
            for hit in memory
                .query()
                .search_cross_project(&query, limit, &filters, !no_highlight)
            {
                writeln!(out, "{}", serde_json::to_string(&hit)?)?;
            }
        }
        Command::Recent { days, limit, types } => {
            for hit in memory.query().search_recent(days, limit, type_filter(&types)) {
                writeln!(out, "{}", serde_json::to_string(&hit)?)?;
            }
        }
        Command::Suggest { prefix, limit } => {
            for title in memory.query().get_suggestions(&prefix, limit) {
                writeln!(out, "{}", title)?;
            }
        }
        Command::Stats => {
            let stats = memory.index().get_index_stats().as_map();
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
        }
        Command::Sweep => {
            let report = memory.sweep_expired();
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
        }
        Command::CleanupLocks { force } => {
            let removed = memory.index().cleanup_locks(force);
            writeln!(out, "{}", serde_json::json!({ "removed": removed }))?;
        }
        Command::Reindex => {
            let report = memory.reindex();
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
            if report.failures > 0 {
                return Err(io::Error::other(format!(
                    "{} record(s) could not be indexed",
                    report.failures
                )));
            }
        }
    }
    Ok(())
}
