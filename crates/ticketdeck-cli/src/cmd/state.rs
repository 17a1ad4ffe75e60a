//! `td state`: inspect or forget the filters saved between runs.

use std::io::Write;
use std::process;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use ticketdeck_core::persist::encode_query;
use ticketdeck_core::{CacheError, DurableCache, FilterState};

use super::CommandContext;
use crate::output::{CliError, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    #[command(
        about = "Show the saved filters",
        after_help = "EXAMPLES:\n    # Show what the next `td list` starts from\n    td state show\n\n    # Machine-readable output\n    td state show --format json"
    )]
    Show,

    #[command(
        about = "Forget the saved filters",
        after_help = "EXAMPLES:\n    # Start the next run from defaults\n    td state clear"
    )]
    Clear,
}

#[derive(Debug, Serialize)]
struct StateOutput {
    path: String,
    key: String,
    filters: Option<FilterState>,
    /// Query string equivalent of the saved filters.
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearOutput {
    path: String,
    key: String,
    cleared: bool,
}

/// Dispatch `td state` subcommands.
pub fn run_state(command: &StateCommand, ctx: &CommandContext) -> Result<()> {
    match command {
        StateCommand::Show => run_show(ctx),
        StateCommand::Clear => run_clear(ctx),
    }
}

fn run_show(ctx: &CommandContext) -> Result<()> {
    let config = ctx.engine_config()?;
    let cache = ctx.cache();

    let filters = match load_filters(&cache, &config.cache_key) {
        Ok(filters) => filters,
        Err(err) => {
            let code = err.error_code();
            let cli_err = CliError::with_details(
                err.to_string(),
                code.hint().unwrap_or("Run `td state clear` to start over"),
                code.code(),
            );
            render_error(ctx.output, &cli_err)?;
            process::exit(1);
        }
    };

    let out = StateOutput {
        path: cache.path().display().to_string(),
        key: config.cache_key,
        location: filters.as_ref().map(encode_query),
        filters,
    };

    render_mode(
        ctx.output,
        &out,
        |out, w| match &out.location {
            Some(location) => writeln!(w, "saved=true query={location:?}"),
            None => writeln!(w, "saved=false"),
        },
        |out, w| {
            pretty_section(w, "Saved Filters")?;
            pretty_kv(w, "File", &out.path)?;
            let Some(filters) = &out.filters else {
                return pretty_kv(w, "Filters", "none saved");
            };
            pretty_kv(w, "Status", filters.status.as_str())?;
            pretty_kv(w, "Sort", filters.sort.as_str())?;
            pretty_kv(w, "Search", &filters.query)?;
            pretty_kv(w, "Author", &filters.author)?;
            pretty_kv(w, "Overdue", filters.overdue_only.to_string())
        },
    )
}

fn load_filters(
    cache: &impl DurableCache,
    key: &str,
) -> std::result::Result<Option<FilterState>, CacheError> {
    let Some(raw) = cache.load(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| CacheError::Corrupt(err.to_string()))
}

fn run_clear(ctx: &CommandContext) -> Result<()> {
    let config = ctx.engine_config()?;
    let mut cache = ctx.cache();
    let cleared = cache.load(&config.cache_key).ok().flatten().is_some()
        || cache.entries().is_err();
    cache.remove(&config.cache_key)?;

    let out = ClearOutput {
        path: cache.path().display().to_string(),
        key: config.cache_key,
        cleared,
    };
    render_mode(
        ctx.output,
        &out,
        |out, w| writeln!(w, "cleared={}", out.cleared),
        |out, w| {
            let line = if out.cleared {
                "saved filters removed"
            } else {
                "nothing saved"
            };
            pretty_kv(w, "State", line)
        },
    )
}
