//! Engine lifecycle states.

use std::fmt;

/// Where the engine currently stands.
///
/// `Unconfigured` and `Uninitialized` are distinct from `Error`: the first
/// means the backend could not be reached at all, the second that it was
/// reached but its schema was never provisioned. Both need operator action
/// rather than a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync has run yet.
    Idle,
    /// Verifying preconditions (session, owner, backend reachability).
    Checking,
    /// A sync run is in progress.
    Syncing,
    /// The last run completed successfully.
    Synced,
    /// The last run failed mid-way; the local store is untouched.
    Error,
    /// The backend is unreachable.
    Unconfigured,
    /// The backend is reachable but its schema is missing.
    Uninitialized,
}

impl SyncState {
    /// True when a new sync run may start from this state.
    pub fn can_start_sync(&self) -> bool {
        !matches!(self, SyncState::Checking | SyncState::Syncing)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Idle => "idle",
            SyncState::Checking => "checking",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
            SyncState::Unconfigured => "unconfigured",
            SyncState::Uninitialized => "uninitialized",
        };
        f.write_str(s)
    }
}
