//! Time policy: thresholds derived from `Timings` and the current instant.
//!
//! Everything here is pure. The scheduler evaluates these predicates against a
//! raid inside the registry write lock and only mutates when one holds.

use chrono::{DateTime, Duration, Utc};

use crate::config::Timings;
use crate::raid::{EndTime, Raid, Subject};

pub fn last_possible_time(creation: DateTime<Utc>, timings: &Timings) -> DateTime<Utc> {
    creation + timings.default_raid_duration
}

pub fn start_clear_time(now: DateTime<Utc>, timings: &Timings) -> DateTime<Utc> {
    now + timings.start_clear
}

pub fn deletion_time(now: DateTime<Utc>, timings: &Timings) -> DateTime<Utc> {
    now + timings.deletion_warning
}

/// Hatch and end time for an egg that hatches `until_hatch` from now.
pub fn egg_window(
    now: DateTime<Utc>,
    until_hatch: Duration,
    timings: &Timings,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let hatch = now + until_hatch;
    (hatch, hatch + timings.hatched_egg_duration)
}

/// Applies an end time given relative to `now`. For an egg the offset is the
/// hatch time and the raid ends once the hatched boss is gone.
pub fn apply_end_time(raid: &mut Raid, now: DateTime<Utc>, end_in: Option<Duration>, timings: &Timings) {
    let Some(end_in) = end_in else {
        raid.end_time = EndTime::Undefined;
        return;
    };
    match raid.subject {
        Subject::Egg { .. } => {
            let (hatch, end) = egg_window(now, end_in, timings);
            raid.hatch_time = Some(hatch);
            raid.end_time = EndTime::At(end);
        }
        Subject::Boss { .. } => raid.end_time = EndTime::At(now + end_in),
    }
}

/// Applies a start time given relative to `now`; for an egg it means the hatch.
pub fn apply_start_time(raid: &mut Raid, now: DateTime<Utc>, start_in: Duration, timings: &Timings) {
    match raid.subject {
        Subject::Boss { .. } => raid.start_time = Some(now + start_in),
        Subject::Egg { .. } => {
            let (hatch, end) = egg_window(now, start_in, timings);
            raid.hatch_time = Some(hatch);
            raid.end_time = EndTime::At(end);
        }
    }
}

pub fn hatch_due(raid: &Raid, now: DateTime<Utc>) -> bool {
    !raid.hatched && raid.hatch_time.is_some_and(|hatch| now > hatch)
}

/// What the start window needs this tick, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartWindow {
    /// Start time passed; arm the clear timer.
    Arm,
    /// Grace period over; drop start and clear times.
    Clear,
}

pub fn start_window(raid: &Raid, now: DateTime<Utc>) -> Option<StartWindow> {
    let start = raid.start_time?;
    match raid.start_clear_time {
        Some(clear) if now > clear => Some(StartWindow::Clear),
        Some(_) => None,
        None if now > start => Some(StartWindow::Arm),
        None => None,
    }
}

pub fn is_expired(raid: &Raid, now: DateTime<Utc>) -> bool {
    raid.end_time.at().is_some_and(|end| now > end) || now > raid.last_possible_time
}

pub fn expiry_due(raid: &Raid, now: DateTime<Utc>) -> bool {
    raid.deletion_time.is_none() && is_expired(raid, now)
}

pub fn deletion_due(raid: &Raid, now: DateTime<Utc>) -> bool {
    raid.deletion_time.is_some_and(|deletion| now > deletion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raid(subject: Subject, now: DateTime<Utc>) -> Raid {
        Raid::new(1, 2, subject, 3, now, now + Duration::minutes(60))
    }

    fn boss() -> Subject {
        Subject::Boss {
            name: "lugia".to_string(),
            tier: 5,
        }
    }

    #[test]
    fn test_egg_end_time_means_hatch() {
        let now = Utc::now();
        let timings = Timings::default();
        let mut egg = raid(Subject::Egg { tier: 4 }, now);

        apply_end_time(&mut egg, now, Some(Duration::minutes(30)), &timings);
        assert_eq!(egg.hatch_time, Some(now + Duration::minutes(30)));
        assert_eq!(
            egg.end_time,
            EndTime::At(now + Duration::minutes(30) + timings.hatched_egg_duration)
        );
        assert!(egg.start_time.is_none());
    }

    #[test]
    fn test_boss_times() {
        let now = Utc::now();
        let timings = Timings::default();
        let mut raid = raid(boss(), now);

        apply_end_time(&mut raid, now, Some(Duration::minutes(40)), &timings);
        apply_start_time(&mut raid, now, Duration::minutes(10), &timings);
        assert_eq!(raid.end_time, EndTime::At(now + Duration::minutes(40)));
        assert_eq!(raid.start_time, Some(now + Duration::minutes(10)));
        assert!(raid.hatch_time.is_none());

        apply_end_time(&mut raid, now, None, &timings);
        assert_eq!(raid.end_time, EndTime::Undefined);
    }

    #[test]
    fn test_hatch_due_only_once() {
        let now = Utc::now();
        let mut egg = raid(Subject::Egg { tier: 4 }, now);
        assert!(!hatch_due(&egg, now));

        egg.hatch_time = Some(now - Duration::minutes(1));
        assert!(hatch_due(&egg, now));
        egg.hatched = true;
        assert!(!hatch_due(&egg, now));
    }

    #[test]
    fn test_start_window_alternates() {
        let now = Utc::now();
        let mut raid = raid(boss(), now);
        assert_eq!(start_window(&raid, now), None);

        raid.start_time = Some(now + Duration::minutes(1));
        assert_eq!(start_window(&raid, now), None);

        raid.start_time = Some(now - Duration::minutes(1));
        assert_eq!(start_window(&raid, now), Some(StartWindow::Arm));

        raid.start_clear_time = Some(now + Duration::minutes(5));
        assert_eq!(start_window(&raid, now), None);
        assert_eq!(
            start_window(&raid, now + Duration::minutes(6)),
            Some(StartWindow::Clear)
        );
    }

    #[test]
    fn test_expiry_uses_end_or_cutoff() {
        let now = Utc::now();
        let mut raid = raid(boss(), now);
        assert!(!expiry_due(&raid, now));
        assert!(expiry_due(&raid, now + Duration::minutes(61)));

        raid.end_time = EndTime::At(now + Duration::minutes(10));
        assert!(expiry_due(&raid, now + Duration::minutes(11)));

        raid.deletion_time = Some(now + Duration::minutes(20));
        assert!(!expiry_due(&raid, now + Duration::minutes(11)));
    }

    #[test]
    fn test_deletion_due() {
        let now = Utc::now();
        let mut raid = raid(boss(), now);
        assert!(!deletion_due(&raid, now));
        raid.deletion_time = Some(now);
        assert!(!deletion_due(&raid, now));
        assert!(deletion_due(&raid, now + Duration::seconds(1)));
    }
}
