#![forbid(unsafe_code)]

mod cmd;
mod host;
mod output;
mod settings;

use std::env;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "td: live, filterable ticket lists in the terminal",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Base URL of the ticket server.
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Tickets",
        about = "List tickets",
        long_about = "Fetch one page of tickets matching the filters. Filters not given on the\n\
                      command line keep the value saved by the previous run.",
        after_help = "EXAMPLES:\n    # Tickets in progress, nearest deadline first\n    td list --status en_cours --sort deadline\n\n    # Search titles and bodies, third page\n    td list -q printer --page 3\n\n    # Ignore saved filters, emit JSON\n    td list --fresh --format json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Change a ticket's status",
        long_about = "Send one status change for a ticket, then refresh the list.",
        after_help = "EXAMPLES:\n    # Mark ticket 42 as resolved\n    td move 42 resolu\n\n    # Emit machine-readable output\n    td move 42 en_cours --format json"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Follow live ticket changes",
        long_about = "Keep the list open and re-fetch whenever the server pushes a change.\n\
                      The push stream reconnects on its own after a drop.",
        after_help = "EXAMPLES:\n    # Watch open tickets with a bell on every change\n    td watch --status en_attente --notify\n\n    # Stop after five minutes\n    td watch --duration 300\n\n    # One JSON document per render\n    td watch --format json"
    )]
    Watch(cmd::watch::WatchArgs),

    #[command(next_help_heading = "Maintenance", about = "Inspect or clear saved filters")]
    State {
        #[command(subcommand)]
        command: cmd::state::StateCommand,
    },

    #[command(
        next_help_heading = "Maintenance",
        about = "Deterministic session simulation",
        long_about = "Run seeded simulations of the engine against a faulty network."
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    td completions bash\n\n    # Generate zsh completions\n    td completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TICKETDECK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "ticketdeck=debug,info"
        } else {
            "ticketdeck=info,warn"
        })
    });

    let format = env::var("TICKETDECK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // logs go to stderr; stdout carries command output
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_dir = settings::config_dir()?;
    let user = settings::load_user_config(&config_dir)?;
    let output = output::resolve_output_mode(cli.format, cli.json, user.output.as_deref());
    debug!(config_dir = %config_dir.display(), ?output, "resolved settings");
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let ctx = cmd::CommandContext {
        output,
        server: cli.server,
        user,
        config_dir,
        project_root: env::current_dir()?,
    };

    match cli.command {
        Commands::List(ref args) => cmd::list::run_list(args, &ctx),
        Commands::Move(ref args) => cmd::move_cmd::run_move(args, &ctx),
        Commands::Watch(ref args) => cmd::watch::run_watch(args, &ctx),
        Commands::State { ref command } => cmd::state::run_state(command, &ctx),
        Commands::Sim(ref args) => cmd::sim::run_sim(args, &ctx),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn format_flag_after_subcommand() {
        let cli = Cli::parse_from(["td", "list", "--format", "json"]);
        assert_eq!(cli.format, Some(OutputMode::Json));
    }

    #[test]
    fn hidden_json_flag_parses() {
        let cli = Cli::parse_from(["td", "--json", "list"]);
        assert!(cli.json);
    }

    #[test]
    fn server_flag_is_global() {
        let cli = Cli::parse_from(["td", "list", "--server", "http://tickets.local"]);
        assert_eq!(cli.server.as_deref(), Some("http://tickets.local"));
    }

    #[test]
    fn list_filters_parse() {
        let cli = Cli::parse_from([
            "td", "list", "-s", "en_cours", "--sort", "deadline", "-q", "vpn", "--overdue",
            "--page", "3",
        ]);
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.filters.status.as_deref(), Some("en_cours"));
        assert_eq!(args.filters.page, 3);
        assert!(args.filters.overdue);
        assert_eq!(
            args.filters.location_query(),
            "status=en_cours&sort=deadline&q=vpn&overdue=1"
        );
    }

    #[test]
    fn overdue_conflicts_with_all_deadlines() {
        let result = Cli::try_parse_from(["td", "list", "--overdue", "--all-deadlines"]);
        assert!(result.is_err());
    }

    #[test]
    fn move_takes_id_and_status() {
        let cli = Cli::parse_from(["td", "move", "42", "resolu"]);
        let Commands::Move(args) = cli.command else {
            panic!("expected move");
        };
        assert_eq!(args.id, 42);
        assert_eq!(args.status, "resolu");
    }

    #[test]
    fn move_rejects_non_numeric_id() {
        assert!(Cli::try_parse_from(["td", "move", "abc", "resolu"]).is_err());
    }

    #[test]
    fn watch_limits_parse() {
        let cli = Cli::parse_from(["td", "watch", "--notify", "--duration", "5", "--max-messages", "2"]);
        let Commands::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert!(args.notify);
        assert_eq!(args.duration, Some(5));
        assert_eq!(args.max_messages, Some(2));
    }

    #[test]
    fn all_subcommands_parse() {
        let subcommands = [
            vec!["td", "list"],
            vec!["td", "move", "1", "en_attente"],
            vec!["td", "watch"],
            vec!["td", "state", "show"],
            vec!["td", "state", "clear"],
            vec!["td", "sim", "run", "--seeds", "3"],
            vec!["td", "sim", "replay", "--seed", "3"],
            vec!["td", "completions", "bash"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }
}
