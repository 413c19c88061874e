//! Per-identifier synchronization state.
//!
//! Every toggle takes a ticket from a store-wide counter. Only the holder of
//! the newest ticket for an identifier may roll its membership back; older
//! completions can at most move the confirmed baseline forward, and only past
//! tickets the server has not already superseded.

/// Where an identifier stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No toggle since the last full fetch.
    Idle,
    /// A toggle is in flight. `previous` is the last membership the server confirmed.
    Pending { previous: bool },
    /// The newest toggle was persisted.
    Confirmed,
    /// The newest toggle failed and membership was restored.
    RolledBack,
}

/// What a completed remote call did to the local set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Newest toggle succeeded; membership already correct.
    Confirmed,
    /// A newer toggle is still in flight; only the baseline moved.
    Superseded,
    /// Newest toggle failed; membership must be set to `restore`.
    RolledBack { restore: bool },
    /// An older toggle succeeded after a newer one was rolled back.
    LateConfirmed { membership: bool },
    /// Nothing to do: the entry was reset or already settled by a newer ticket.
    Stale,
}

#[derive(Debug, Clone)]
pub(crate) struct Tracked {
    pub(crate) state: SyncState,
    pub(crate) ticket: u64,
    /// Newest ticket the server has accepted. Older successes never move the baseline.
    pub(crate) confirmed_ticket: u64,
}

impl Tracked {
    /// Start tracking a toggle away from `current`.
    pub(crate) fn begin(prior: Option<&Tracked>, current: bool, ticket: u64) -> Self {
        let previous = match prior.map(|t| t.state) {
            Some(SyncState::Pending { previous }) => previous,
            _ => current,
        };
        Self {
            state: SyncState::Pending { previous },
            ticket,
            confirmed_ticket: prior.map(|t| t.confirmed_ticket).unwrap_or(0),
        }
    }

    /// Apply the outcome of the remote call holding `ticket`, which tried to
    /// set membership to `target`.
    pub(crate) fn resolve(&mut self, ticket: u64, target: bool, succeeded: bool) -> Resolution {
        let state = self.state;
        match state {
            SyncState::Pending { previous } if ticket == self.ticket => {
                if succeeded {
                    self.state = SyncState::Confirmed;
                    self.confirmed_ticket = ticket;
                    Resolution::Confirmed
                } else {
                    self.state = SyncState::RolledBack;
                    Resolution::RolledBack { restore: previous }
                }
            }
            SyncState::Pending { .. } if ticket < self.ticket => {
                if succeeded && ticket > self.confirmed_ticket {
                    self.state = SyncState::Pending { previous: target };
                    self.confirmed_ticket = ticket;
                }
                Resolution::Superseded
            }
            SyncState::RolledBack
                if ticket < self.ticket && ticket > self.confirmed_ticket && succeeded =>
            {
                self.state = SyncState::Confirmed;
                self.confirmed_ticket = ticket;
                Resolution::LateConfirmed { membership: target }
            }
            _ => Resolution::Stale,
        }
    }
}
