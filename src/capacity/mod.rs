//! Admission control over the global and per-team headcount ceilings.

use crate::errors::AppError;

/// Admit iff `current + incoming <= ceiling`.
pub fn can_admit(current: i64, incoming: i64, ceiling: i64) -> bool {
    current + incoming <= ceiling
}

/// Spots left under a ceiling, never negative.
pub fn remaining(current: i64, ceiling: i64) -> i64 {
    (ceiling - current).max(0)
}

/// Counts and ceilings observed inside the registering transaction.
///
/// `participants` excludes Organisation members. `team_members` is `None` for a
/// team being created and for the Organisation team, which has no size ceiling.
#[derive(Debug, Clone, Copy)]
pub struct CapacitySnapshot {
    pub participants: i64,
    pub max_total_participants: i64,
    pub team_members: Option<i64>,
    pub max_team_size: i64,
    pub is_organisation: bool,
}

/// Evaluate both ceilings independently; the global one is reported first.
pub fn check_capacity(snapshot: &CapacitySnapshot, incoming: i64) -> Result<(), AppError> {
    if snapshot.is_organisation {
        return Ok(());
    }

    if !can_admit(
        snapshot.participants,
        incoming,
        snapshot.max_total_participants,
    ) {
        let left = remaining(snapshot.participants, snapshot.max_total_participants);
        return Err(AppError::Capacity {
            message: format!(
                "Registration is full: {} spot(s) remaining, {} requested",
                left, incoming
            ),
            remaining: left,
        });
    }

    let team_members = snapshot.team_members.unwrap_or(0);
    if !can_admit(team_members, incoming, snapshot.max_team_size) {
        let left = remaining(team_members, snapshot.max_team_size);
        return Err(AppError::Capacity {
            message: format!(
                "Team is limited to {} members: {} spot(s) remaining, {} requested",
                snapshot.max_team_size, left, incoming
            ),
            remaining: left,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(participants: i64, team_members: Option<i64>) -> CapacitySnapshot {
        CapacitySnapshot {
            participants,
            max_total_participants: 10,
            team_members,
            max_team_size: 4,
            is_organisation: false,
        }
    }

    #[test]
    fn test_can_admit_boundary_is_inclusive() {
        assert!(can_admit(8, 2, 10));
        assert!(!can_admit(9, 2, 10));
        assert!(can_admit(0, 0, 0));
    }

    #[test]
    fn test_global_ceiling_reports_remaining() {
        let err = check_capacity(&snapshot(9, None), 2).unwrap_err();
        match err {
            AppError::Capacity { remaining, .. } => assert_eq!(remaining, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_team_ceiling_checked_independently() {
        assert!(check_capacity(&snapshot(0, Some(3)), 1).is_ok());
        let err = check_capacity(&snapshot(0, Some(3)), 2).unwrap_err();
        match err {
            AppError::Capacity { remaining, .. } => assert_eq!(remaining, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_new_team_only_bounded_by_team_size() {
        assert!(check_capacity(&snapshot(0, None), 4).is_ok());
        assert!(check_capacity(&snapshot(0, None), 5).is_err());
    }

    #[test]
    fn test_organisation_is_exempt() {
        let mut snap = snapshot(10, Some(40));
        snap.is_organisation = true;
        assert!(check_capacity(&snap, 5).is_ok());
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining(12, 10), 0);
        assert_eq!(remaining(3, 10), 7);
    }
}
