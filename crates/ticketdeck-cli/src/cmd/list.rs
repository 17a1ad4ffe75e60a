//! `td list`: fetch one page of tickets and print it.

use std::io::{self, Write};
use std::process;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use ticketdeck_core::{FilterState, RenderedList};

use super::{CommandContext, FilterArgs};
use crate::host::terminal::{TerminalSink, write_list_pretty, write_list_text};
use crate::output::{CliError, pretty_kv, render_error, render_mode};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
}

#[derive(Debug, Serialize)]
struct ListOutput {
    filters: FilterState,
    /// Canonical query string for these filters.
    location: String,
    #[serde(flatten)]
    list: RenderedList,
}

/// Execute `td list`.
///
/// Exits with status 1 when the server cannot be reached or answers with an error.
pub fn run_list(args: &ListArgs, ctx: &CommandContext) -> Result<()> {
    let mut session = ctx.session(&args.filters, TerminalSink::new(), false, None)?;
    session.start();

    if let Some(err) = session.engine().last_error().cloned() {
        render_error(ctx.output, &CliError::from(&err))?;
        process::exit(1);
    }

    let filters = session.engine().filters().clone();
    let list = session.screen().list.clone();
    let Some(list) = list else {
        anyhow::bail!("the server answered without a ticket list");
    };
    let out = ListOutput {
        filters,
        location: session.location(),
        list,
    };

    render_mode(
        ctx.output,
        &out,
        |out, w| write_list_text(w, &out.list),
        |out, w| write_pretty(w, out),
    )
}

fn write_pretty(w: &mut dyn Write, out: &ListOutput) -> io::Result<()> {
    write_list_pretty(w, &out.list)?;
    if !out.location.is_empty() {
        pretty_kv(w, "Filters", &out.location)?;
    }
    Ok(())
}
