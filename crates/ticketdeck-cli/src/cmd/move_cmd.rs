//! `td move`: change the status of one ticket.

use std::io::Write;
use std::process;

use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use ticketdeck_core::DropOutcome;

use super::{CommandContext, FilterArgs};
use crate::host::terminal::TerminalSink;
use crate::output::{CliError, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Ticket to move.
    pub id: u64,

    /// Target status, e.g. `en_cours` or `resolu`.
    pub status: String,

    /// Filters for the list that is refreshed after the move.
    #[command(flatten)]
    pub filters: FilterArgs,
}

#[derive(Debug, Serialize)]
struct MoveOutput {
    ticket_id: u64,
    status: String,
    /// `moved` or `unchanged`.
    outcome: &'static str,
    /// Tickets in the refreshed list.
    total_items: Option<u64>,
}

/// Execute `td move`.
///
/// Exits with status 1 when the status is refused locally or by the server.
pub fn run_move(args: &MoveArgs, ctx: &CommandContext) -> Result<()> {
    let mut session = ctx.session(&args.filters, TerminalSink::new(), true, None)?;
    session.start();

    let outcome = match session.engine().move_ticket(args.id, &args.status) {
        DropOutcome::Sent(_) => {
            session.settle();
            match session.last_mutation() {
                Some(Ok(())) => "moved",
                Some(Err(err)) => {
                    render_error(ctx.output, &CliError::from(err))?;
                    process::exit(1);
                }
                None => bail!("status change for ticket #{} never completed", args.id),
            }
        }
        DropOutcome::Unchanged => "unchanged",
        DropOutcome::Rejected(err) => {
            render_error(ctx.output, &CliError::from(&err))?;
            process::exit(1);
        }
        DropOutcome::Disabled => bail!("status changes are not enabled for this session"),
    };

    let out = MoveOutput {
        ticket_id: args.id,
        status: args.status.clone(),
        outcome,
        total_items: session.screen().list.as_ref().map(|list| list.total_items),
    };

    render_mode(
        ctx.output,
        &out,
        |out, w| {
            writeln!(
                w,
                "ticket={} status={} outcome={}",
                out.ticket_id, out.status, out.outcome
            )
        },
        |out, w| {
            pretty_section(w, &format!("Ticket #{}", out.ticket_id))?;
            let line = if out.outcome == "moved" {
                format!("moved to {}", out.status)
            } else {
                format!("already {}", out.status)
            };
            pretty_kv(w, "Status", line)?;
            if let Some(total) = out.total_items {
                pretty_kv(w, "Tickets", total.to_string())?;
            }
            Ok(())
        },
    )
}
