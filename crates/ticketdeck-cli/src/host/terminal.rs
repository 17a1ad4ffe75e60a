//! Render sink for the terminal.
//!
//! One-shot commands let the sink collect into a [`Screen`] and print once the
//! session has settled. `watch` switches the sink to live mode, where every
//! render and notice is printed as it happens.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use ticketdeck_core::{Notice, NoticeLevel, RenderSink, RenderedList, TicketView};

use crate::output::{OutputMode, pretty_kv, pretty_rule};

#[derive(Debug, Default)]
pub struct Screen {
    pub list: Option<RenderedList>,
    pub error: Option<String>,
    pub notices: Vec<Notice>,
    pub busy: bool,
    pub renders: u64,
}

#[derive(Clone, Default)]
pub struct TerminalSink {
    screen: Rc<RefCell<Screen>>,
    live: Option<OutputMode>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print each render immediately in `mode`.
    pub const fn live(mut self, mode: OutputMode) -> Self {
        self.live = Some(mode);
        self
    }

    pub fn screen(&self) -> Rc<RefCell<Screen>> {
        Rc::clone(&self.screen)
    }
}

impl RenderSink for TerminalSink {
    fn set_busy(&mut self, busy: bool) {
        self.screen.borrow_mut().busy = busy;
    }

    fn render_list(&mut self, list: &RenderedList) {
        {
            let mut screen = self.screen.borrow_mut();
            screen.list = Some(list.clone());
            screen.error = None;
            screen.renders += 1;
        }
        if let Some(mode) = self.live {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            // a closed stdout ends the watch through the next write anyway
            let _ = write_live_list(&mut out, list, mode);
        }
    }

    fn render_error(&mut self, message: &str) {
        {
            let mut screen = self.screen.borrow_mut();
            screen.list = None;
            screen.error = Some(message.to_string());
        }
        if self.live.is_some() {
            eprintln!("error: {message}");
        }
    }

    fn notify(&mut self, notice: &Notice) {
        if self.live.is_some() {
            eprintln!("{}", notice_line(notice));
        }
        self.screen.borrow_mut().notices.push(notice.clone());
    }
}

pub fn notice_line(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
        NoticeLevel::Alert => "ALERT",
    };
    format!("[{tag}] {}", notice.message)
}

fn write_live_list(w: &mut dyn Write, list: &RenderedList, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *w, list)?;
            writeln!(w)
        }
        OutputMode::Text => write_list_text(w, list),
        OutputMode::Pretty => write_list_pretty(w, list),
    }
}

/// `key=value` lines, one per ticket, then one summary line.
pub fn write_list_text(w: &mut dyn Write, list: &RenderedList) -> io::Result<()> {
    for ticket in &list.tickets {
        write!(
            w,
            "id={} status={} author={} title={:?}",
            ticket.id, ticket.status, ticket.author, ticket.title
        )?;
        if let Some(deadline) = &ticket.deadline {
            write!(w, " deadline={:?} overdue={}", deadline.at, deadline.overdue)?;
        }
        writeln!(w)?;
    }
    let (page, pages) = list
        .pagination
        .as_ref()
        .map_or((1, 1), |view| (view.current_page, view.total_pages));
    writeln!(
        w,
        "total={} shown={} page={page} pages={pages}",
        list.total_items,
        list.tickets.len()
    )
}

pub fn write_list_pretty(w: &mut dyn Write, list: &RenderedList) -> io::Result<()> {
    if list.tickets.is_empty() {
        writeln!(w, "No tickets match these filters.")?;
    }
    for ticket in &list.tickets {
        write_card(w, ticket)?;
    }
    pretty_rule(w)?;
    pretty_kv(w, "Tickets", list.total_items.to_string())?;
    if let Some(view) = &list.pagination {
        pretty_kv(
            w,
            "Page",
            format!("{} of {}   {}", view.current_page, view.total_pages, view.label()),
        )?;
    }
    Ok(())
}

fn write_card(w: &mut dyn Write, ticket: &TicketView) -> io::Result<()> {
    writeln!(
        w,
        "#{:<5} {:<12} {}",
        ticket.id,
        format!("[{}]", ticket.status_label),
        ticket.title
    )?;
    let mut meta = format!("by {} · {}", ticket.author, ticket.created);
    if let Some(priority) = &ticket.priority {
        meta.push_str(&format!(" · {priority}"));
    }
    if let Some(deadline) = &ticket.deadline {
        let marker = if deadline.overdue { "!" } else { "" };
        meta.push_str(&format!(" · due {} ({}){marker}", deadline.at, deadline.countdown));
    }
    writeln!(w, "       {meta}")?;
    if let Some(response) = &ticket.admin_response {
        writeln!(w, "       ↳ {response}")?;
    }
    Ok(())
}
