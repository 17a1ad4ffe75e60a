//! Drag-initiated status changes.
//!
//! A drop sends exactly one targeted request. Nothing in the list is patched
//! locally: on success the engine re-fetches, on failure the list is left
//! untouched and an alert is raised.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::MutationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub id: MutationId,
    pub ticket_id: u64,
    pub status: String,
}

/// Remote mutation endpoint. Completion is delivered through
/// [`crate::Engine::on_mutation_response`].
pub trait MutationClient {
    fn update_status(&mut self, request: &MutationRequest);
}

impl<T: MutationClient + ?Sized> MutationClient for Box<T> {
    fn update_status(&mut self, request: &MutationRequest) {
        (**self).update_status(request);
    }
}

/// Immediate result of a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    Sent(MutationId),
    /// Dropped onto the status it already has.
    Unchanged,
    /// Refused locally; no request was sent.
    Rejected(MutationError),
    /// No mutation capability attached to the engine.
    Disabled,
}

/// A settled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub request: MutationRequest,
    pub result: Result<(), MutationError>,
}

/// Status-mutation capability.
pub struct StatusMutator {
    client: Box<dyn MutationClient>,
    allowed_statuses: Vec<String>,
    next_id: u64,
    in_flight: HashMap<MutationId, MutationRequest>,
}

impl StatusMutator {
    #[must_use]
    pub fn new(client: impl MutationClient + 'static) -> Self {
        Self {
            client: Box::new(client),
            allowed_statuses: Vec::new(),
            next_id: 0,
            in_flight: HashMap::new(),
        }
    }

    /// Restrict targets to `statuses`. An empty list accepts anything.
    #[must_use]
    pub fn with_allowed_statuses(mut self, statuses: Vec<String>) -> Self {
        self.allowed_statuses = statuses;
        self
    }

    /// Handle a drop of `ticket_id` onto `target`.
    ///
    /// `current` is the ticket's status in the latest rendered snapshot, if known.
    pub fn drop_ticket(&mut self, ticket_id: u64, target: &str, current: Option<&str>) -> DropOutcome {
        if current == Some(target) {
            debug!(ticket_id, status = target, "drop onto the same status; nothing to do");
            return DropOutcome::Unchanged;
        }
        if !self.allowed_statuses.is_empty()
            && !self.allowed_statuses.iter().any(|status| status == target)
        {
            return DropOutcome::Rejected(MutationError::InvalidStatus {
                status: target.to_string(),
            });
        }

        self.next_id += 1;
        let request = MutationRequest {
            id: MutationId(self.next_id),
            ticket_id,
            status: target.to_string(),
        };
        debug!(id = %request.id, ticket_id, status = target, "sending status change");
        self.client.update_status(&request);
        let id = request.id;
        self.in_flight.insert(id, request);
        DropOutcome::Sent(id)
    }

    /// Match a completion to its request. `None` for unknown or repeated ids.
    pub fn settle(&mut self, id: MutationId, result: Result<(), MutationError>) -> Option<MutationOutcome> {
        let request = self.in_flight.remove(&id)?;
        Some(MutationOutcome { request, result })
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl fmt::Debug for StatusMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusMutator")
            .field("allowed_statuses", &self.allowed_statuses)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
