//! `td watch`: keep the ticket list live over the server's push stream.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{CommandContext, FilterArgs};
use crate::host::session::WatchLimit;
use crate::host::terminal::TerminalSink;

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Ring the terminal bell and print a banner for each change.
    #[arg(long)]
    pub notify: bool,

    /// Stop after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Stop after this many push messages.
    #[arg(long, value_name = "N")]
    pub max_messages: Option<u64>,
}

/// Execute `td watch`.
///
/// Every render is printed as it happens; the summary goes to stderr.
pub fn run_watch(args: &WatchArgs, ctx: &CommandContext) -> Result<()> {
    let sink = TerminalSink::new().live(ctx.output);
    let mut session = ctx.session(&args.filters, sink, false, Some(args.notify))?;
    session.start();

    let summary = session.watch(WatchLimit {
        duration: args.duration.map(Duration::from_secs),
        messages: args.max_messages,
    })?;
    info!(
        messages = summary.messages,
        renders = summary.renders,
        disconnects = summary.disconnects,
        "watch finished"
    );

    if ctx.output.is_json() {
        eprintln!("{}", serde_json::to_string(&summary)?);
    } else {
        eprintln!(
            "watch ended: messages={} renders={} disconnects={}",
            summary.messages, summary.renders, summary.disconnects
        );
    }
    Ok(())
}
