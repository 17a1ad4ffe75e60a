//! Random user sessions.
//!
//! A scenario is a time-ordered list of user and environment actions. Text
//! input arrives in keystroke bursts, each keystroke spelling one more letter
//! of a word, with gaps shorter than the debounce delay.

use serde::{Deserialize, Serialize};
use ticketdeck_core::{FilterPatch, FilterState, SortKey, StatusFilter};

use crate::rng::DeterministicRng;
use crate::server::{AUTHORS, STATUSES, WORDS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    TypeQuery { text: String },
    TypeAuthor { text: String },
    SelectStatus { value: String },
    SelectSort { value: String },
    SetOverdue { checked: bool },
    SubmitSearch,
    GoToPage { page: u32 },
    MoveTicket { ticket_id: u64, status: String },
    /// Another user changes the collection; announced over the push channel.
    ServerChange,
    /// The push connection drops.
    DropChannel,
}

impl Action {
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::TypeQuery { .. } | Self::TypeAuthor { .. })
    }

    /// Filter patch this action applies, if any.
    #[must_use]
    pub fn filter_patch(&self) -> Option<FilterPatch> {
        let patch = FilterPatch::default();
        match self {
            Self::TypeQuery { text } => Some(patch.with_query(text.clone())),
            Self::TypeAuthor { text } => Some(patch.with_author(text.clone())),
            Self::SelectStatus { value } => Some(patch.with_status(StatusFilter::parse(value))),
            Self::SelectSort { value } => Some(patch.with_sort(SortKey::parse(value))),
            Self::SetOverdue { checked } => Some(patch.with_overdue_only(*checked)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAction {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

/// Knobs for scenario generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Number of top-level steps; a text burst counts as one.
    pub steps: usize,
    pub debounce_ms: u64,
    pub ticket_count: usize,
    pub text_percent: u8,
    pub server_change_percent: u8,
    pub channel_drop_percent: u8,
    pub move_percent: u8,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            steps: 40,
            debounce_ms: 250,
            ticket_count: 60,
            text_percent: 35,
            server_change_percent: 10,
            channel_drop_percent: 5,
            move_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scenario {
    pub actions: Vec<TimedAction>,
}

impl Scenario {
    #[must_use]
    pub fn generate(config: &ScenarioConfig, rng: &mut DeterministicRng) -> Self {
        let mut actions = Vec::new();
        let mut at_ms = 0_u64;
        let keystroke_gap_max = config.debounce_ms.saturating_sub(1).max(1);

        for _ in 0..config.steps {
            at_ms += rng.between(50, 1_500);
            if rng.hit_rate_percent(config.text_percent) {
                let author_field = rng.hit_rate_percent(30);
                let word = if author_field {
                    rng.pick(&AUTHORS).copied().unwrap_or("mara")
                } else {
                    rng.pick(&WORDS).copied().unwrap_or("vpn")
                };
                let typed = usize::try_from(rng.between(1, word.len() as u64)).unwrap_or(1);
                for end in 1..=typed {
                    let text = word[..end].to_string();
                    let action = if author_field {
                        Action::TypeAuthor { text }
                    } else {
                        Action::TypeQuery { text }
                    };
                    actions.push(TimedAction { at_ms, action });
                    at_ms += rng.between(20, keystroke_gap_max);
                }
                if rng.hit_rate_percent(20) {
                    actions.push(TimedAction {
                        at_ms,
                        action: Action::SubmitSearch,
                    });
                }
                continue;
            }
            let action = Self::discrete_action(config, rng);
            actions.push(TimedAction { at_ms, action });
        }
        Self { actions }
    }

    fn discrete_action(config: &ScenarioConfig, rng: &mut DeterministicRng) -> Action {
        if rng.hit_rate_percent(config.server_change_percent) {
            return Action::ServerChange;
        }
        if rng.hit_rate_percent(config.channel_drop_percent) {
            return Action::DropChannel;
        }
        if rng.hit_rate_percent(config.move_percent) {
            let ticket_count = u64::try_from(config.ticket_count.max(1)).unwrap_or(1);
            // occasionally aim at a status nobody allows
            let status = if rng.hit_rate_percent(10) {
                "archived"
            } else {
                rng.pick(&STATUSES).copied().unwrap_or("resolu")
            };
            return Action::MoveTicket {
                ticket_id: rng.between(1, ticket_count),
                status: status.to_string(),
            };
        }
        match rng.next_bounded(6) {
            0 => {
                let value = if rng.hit_rate_percent(30) {
                    "all"
                } else {
                    rng.pick(&STATUSES).copied().unwrap_or("all")
                };
                Action::SelectStatus {
                    value: value.to_string(),
                }
            }
            1 => Action::SelectSort {
                value: rng
                    .pick(&["recent", "oldest", "deadline"])
                    .copied()
                    .unwrap_or("recent")
                    .to_string(),
            },
            2 => Action::SetOverdue {
                checked: rng.hit_rate_percent(50),
            },
            3 => Action::SubmitSearch,
            4 => Action::TypeQuery {
                text: String::new(),
            },
            _ => Action::GoToPage {
                page: u32::try_from(rng.between(1, 8)).unwrap_or(1),
            },
        }
    }

    /// Filter state a correct engine must end with.
    #[must_use]
    pub fn expected_filters(&self) -> FilterState {
        let mut state = FilterState::default();
        for timed in &self.actions {
            if let Some(patch) = timed.action.filter_patch() {
                patch.apply_to(&mut state);
            }
        }
        state
    }

    /// Number of quiescence windows among text inputs: maximal runs whose
    /// consecutive gaps are shorter than `debounce_ms`.
    #[must_use]
    pub fn text_windows(&self, debounce_ms: u64) -> u64 {
        let mut windows = 0;
        let mut last: Option<u64> = None;
        for timed in self.actions.iter().filter(|timed| timed.action.is_text()) {
            match last {
                Some(previous) if timed.at_ms - previous < debounce_ms => {}
                _ => windows += 1,
            }
            last = Some(timed.at_ms);
        }
        windows
    }
}
