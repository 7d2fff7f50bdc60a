//! Attendee bookkeeping on a single raid.
//!
//! These functions only touch the in-memory record; `RaidEngine` persists the
//! result through the registry and schedules the status refresh.

use crate::error::RaidError;
use crate::raid::{Attendee, AttendeeStatus, Raid};

/// Head count for display and capacity; finished attendees no longer count.
pub fn attendee_count(raid: &Raid) -> u32 {
    raid.attendees
        .values()
        .filter(|a| a.status != AttendeeStatus::Complete)
        .fold(0u32, |total, a| total.saturating_add(a.count))
}

/// Signs `member` up or moves them to `status`.
///
/// `extra` is the number of people the member brings; `None` means the member
/// did not say, which keeps an existing count untouched.
pub fn join(
    raid: &mut Raid,
    member: u64,
    status: AttendeeStatus,
    extra: Option<u32>,
) -> Result<(), RaidError> {
    let count = extra.map(|n| n.saturating_add(1));

    match raid.attendees.get_mut(&member) {
        None => {
            raid.attendees.insert(
                member,
                Attendee {
                    count: count.unwrap_or(1),
                    status,
                },
            );
        }
        Some(attendee) => {
            if status == AttendeeStatus::Interested
                && count.map_or(true, |c| c == attendee.count)
            {
                return Err(RaidError::AlreadyJoined);
            }
            if let Some(count) = count {
                attendee.count = count;
            }
            attendee.status = status;
        }
    }
    Ok(())
}

pub fn leave(raid: &mut Raid, member: u64) -> Result<Attendee, RaidError> {
    raid.attendees.remove(&member).ok_or(RaidError::NotJoined)
}
