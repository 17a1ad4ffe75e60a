pub mod completions;
pub mod list;
pub mod move_cmd;
pub mod sim;
pub mod state;
pub mod watch;

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ticketdeck_core::EngineConfig;
use ticketdeck_core::config::load_engine_config;
use url::form_urlencoded;

use crate::host::cache::FileCache;
use crate::host::http::TicketApi;
use crate::host::session::{Session, SessionOptions};
use crate::host::terminal::TerminalSink;
use crate::output::OutputMode;
use crate::settings::{self, UserConfig};

/// Filter flags shared by every command that shows the ticket list.
///
/// Flags that are not given keep their saved value from the previous run.
#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Status to show (`all` clears the filter).
    #[arg(long, short = 's')]
    pub status: Option<String>,

    /// Sort order: recent, oldest or deadline.
    #[arg(long)]
    pub sort: Option<String>,

    /// Text matched against title and body.
    #[arg(long, short = 'q')]
    pub query: Option<String>,

    /// Text matched against the author's username.
    #[arg(long, short = 'a')]
    pub author: Option<String>,

    /// Only tickets whose deadline has passed.
    #[arg(long, conflicts_with = "all_deadlines")]
    pub overdue: bool,

    /// Clear a saved `--overdue` filter.
    #[arg(long)]
    pub all_deadlines: bool,

    /// Page to open.
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Ignore the filters saved by earlier runs.
    #[arg(long)]
    pub fresh: bool,
}

impl FilterArgs {
    /// Location query carrying only the flags that were given.
    pub fn location_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(status) = &self.status {
            query.append_pair("status", status);
        }
        if let Some(sort) = &self.sort {
            query.append_pair("sort", sort);
        }
        if let Some(text) = &self.query {
            query.append_pair("q", text);
        }
        if let Some(author) = &self.author {
            query.append_pair("author", author);
        }
        if self.overdue {
            query.append_pair("overdue", "1");
        } else if self.all_deadlines {
            query.append_pair("overdue", "0");
        }
        query.finish()
    }
}

/// Resolved global settings shared by all commands.
pub struct CommandContext {
    pub output: OutputMode,
    pub server: Option<String>,
    pub user: UserConfig,
    pub config_dir: PathBuf,
    pub project_root: PathBuf,
}

impl CommandContext {
    /// Engine settings from `.ticketdeck/config.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the project config exists but is invalid.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        load_engine_config(&self.project_root)
    }

    pub fn cache(&self) -> FileCache {
        FileCache::in_dir(&self.config_dir)
    }

    /// Open a session for the ticket list selected by `filters`.
    ///
    /// # Errors
    ///
    /// Returns an error when no server is configured or the engine config is invalid.
    pub fn session(
        &self,
        filters: &FilterArgs,
        sink: TerminalSink,
        mutations: bool,
        realtime: Option<bool>,
    ) -> Result<Session> {
        let base = settings::resolve_server(self.server.as_deref(), &self.user)?;
        let cache = (!filters.fresh).then(|| self.cache());
        Ok(Session::open(SessionOptions {
            config: self.engine_config()?,
            api: TicketApi::new(base),
            location: filters.location_query(),
            cache,
            initial_page: filters.page.max(1),
            sink,
            mutations,
            realtime,
        }))
    }
}
