//! Last-write-wins conflict policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a conflicting update becomes authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep the local fields and write them to the remote side.
    PushLocal,
    /// Overwrite the local fields with the remote payload.
    PullRemote,
}

/// Decides the winner of an update conflict.
///
/// Read-only calendars always pull. Otherwise the local side wins only when
/// it is strictly newer; equal timestamps go to the remote side.
pub fn resolve(
    local_updated_at: DateTime<Utc>,
    remote_updated_at: DateTime<Utc>,
    can_write: bool,
) -> Resolution {
    if can_write && local_updated_at > remote_updated_at {
        Resolution::PushLocal
    } else {
        Resolution::PullRemote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn newer_local_pushes_when_writable() {
        let local = t0() + Duration::seconds(1);
        assert_eq!(resolve(local, t0(), true), Resolution::PushLocal);
    }

    #[test]
    fn newer_remote_pulls() {
        let remote = t0() + Duration::seconds(1);
        assert_eq!(resolve(t0(), remote, true), Resolution::PullRemote);
    }

    #[test]
    fn tie_goes_to_remote() {
        assert_eq!(resolve(t0(), t0(), true), Resolution::PullRemote);
    }

    #[test]
    fn read_only_always_pulls() {
        let local = t0() + Duration::days(30);
        assert_eq!(resolve(local, t0(), false), Resolution::PullRemote);
    }
}
