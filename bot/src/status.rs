//! Render-ready snapshot of a raid.
//!
//! The engine builds a `RaidStatus` from the raid, the venue and the resolved
//! members; a `Gateway` turns it into whatever the platform displays.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

use crate::gateway::MemberInfo;
use crate::raid::{attendee_count, AttendeeStatus, EndTime, Raid};
use crate::venues::Venue;

/// `3:05 pm` in the configured zone.
pub fn clock(t: DateTime<Utc>, tz: Tz) -> String {
    t.with_timezone(&tz).format("%-I:%M %P").to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendeeLine {
    pub member_id: u64,
    pub name: String,
    pub roles: Vec<u64>,
    /// People brought along besides the member.
    pub extra: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusGroup {
    pub status: AttendeeStatus,
    pub attendees: Vec<AttendeeLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaidStatus {
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub footer: String,
    pub total: u32,
    /// Non-empty groups in status order.
    pub groups: Vec<StatusGroup>,
    /// (label, time)
    pub hatch: Option<(String, String)>,
    pub start: Option<(String, String)>,
    pub location_info: Option<String>,
}

impl RaidStatus {
    pub fn build(
        raid: &Raid,
        venue: Option<&Venue>,
        members: &HashMap<u64, MemberInfo>,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Self {
        let boss = raid.subject.display_name();

        let footer = match raid.end_time {
            EndTime::At(end) => format!("Raid available until {}", clock(end, tz)),
            EndTime::Undefined => "Raid end time currently unset".to_string(),
        };

        let mut lines: Vec<(AttendeeStatus, AttendeeLine)> = raid
            .attendees
            .iter()
            .map(|(id, attendee)| {
                let (name, roles) = match members.get(id) {
                    Some(m) => (m.display_name.clone(), m.roles.clone()),
                    None => (format!("user {id}"), Vec::new()),
                };
                (
                    attendee.status,
                    AttendeeLine {
                        member_id: *id,
                        name,
                        roles,
                        extra: attendee.count.saturating_sub(1),
                    },
                )
            })
            .collect();
        lines.sort_by(|(_, a), (_, b)| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.member_id.cmp(&b.member_id))
        });

        let groups = AttendeeStatus::ALL
            .iter()
            .map(|status| StatusGroup {
                status: *status,
                attendees: lines
                    .iter()
                    .filter(|(s, _)| s == status)
                    .map(|(_, line)| line.clone())
                    .collect(),
            })
            .filter(|g| !g.attendees.is_empty())
            .collect();

        let hatch = raid.hatch_time.map(|t| {
            let label = if now > t { "Egg Hatched At" } else { "Egg Hatch Time" };
            (label.to_string(), clock(t, tz))
        });
        let start = raid.start_time.map(|t| {
            let label = if now > t {
                "Last Starting Time"
            } else {
                "Next Planned Starting Time"
            };
            (label.to_string(), clock(t, tz))
        });

        Self {
            title: venue
                .map(|v| v.display_name().to_string())
                .unwrap_or_else(|| format!("Venue {}", raid.venue_id)),
            url: venue.map(Venue::directions_url),
            description: format!("Level {} Raid against {}", raid.subject.tier(), boss),
            footer,
            total: attendee_count(raid),
            groups,
            hatch,
            start,
            location_info: venue.and_then(|v| v.additional_information.clone()),
        }
    }
}

/// One entry of the per-region raid list.
#[derive(Debug, Clone, PartialEq)]
pub struct RaidSummary {
    pub channel_id: u64,
    pub boss: String,
    pub venue: String,
    pub attendees: u32,
}

impl RaidSummary {
    pub fn of(raid: &Raid, venue: Option<&Venue>) -> Self {
        Self {
            channel_id: raid.channel_id,
            boss: raid.subject.display_name(),
            venue: venue
                .map(|v| v.name.clone())
                .unwrap_or_else(|| format!("Venue {}", raid.venue_id)),
            attendees: attendee_count(raid),
        }
    }

    pub fn line(&self) -> String {
        format!(
            "**{}**\n<#{}> :: {} :: {} interested trainer{}",
            self.boss,
            self.channel_id,
            self.venue,
            self.attendees,
            if self.attendees == 1 { "" } else { "s" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raid::{attendance, Subject};
    use chrono::{Duration, TimeZone};

    fn venue() -> Venue {
        Venue {
            id: 4,
            name: "Central Station".to_string(),
            nickname: Some("Station".to_string()),
            latitude: 52.0,
            longitude: 21.0,
            additional_information: Some("North entrance".to_string()),
        }
    }

    fn member(id: u64, name: &str) -> (u64, MemberInfo) {
        (
            id,
            MemberInfo {
                id,
                display_name: name.to_string(),
                roles: vec![],
            },
        )
    }

    #[test]
    fn test_status_groups_and_labels() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut raid = Raid::new(1, 10, Subject::Egg { tier: 5 }, 4, now, now + Duration::hours(2));
        raid.channel_id = 2;
        raid.hatch_time = Some(now - Duration::minutes(5));
        raid.end_time = EndTime::At(now + Duration::minutes(40));
        attendance::join(&mut raid, 20, AttendeeStatus::Coming, Some(2)).unwrap();
        attendance::join(&mut raid, 30, AttendeeStatus::Complete, None).unwrap();
        attendance::join(&mut raid, 40, AttendeeStatus::Coming, None).unwrap();

        let members: HashMap<u64, MemberInfo> =
            [member(10, "zed"), member(20, "Bea"), member(40, "amy")].into_iter().collect();
        let status = RaidStatus::build(&raid, Some(&venue()), &members, now, chrono_tz::UTC);

        assert_eq!(status.title, "Station");
        assert_eq!(status.description, "Level 5 Raid against ????");
        assert_eq!(status.footer, "Raid available until 10:40 am");
        assert_eq!(status.total, 1 + 3 + 1);
        assert_eq!(status.hatch, Some(("Egg Hatched At".to_string(), "9:55 am".to_string())));
        assert!(status.start.is_none());
        assert_eq!(status.location_info.as_deref(), Some("North entrance"));

        let order: Vec<AttendeeStatus> = status.groups.iter().map(|g| g.status).collect();
        assert_eq!(
            order,
            vec![AttendeeStatus::Interested, AttendeeStatus::Coming, AttendeeStatus::Complete]
        );
        let coming: Vec<&str> = status.groups[1].attendees.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(coming, vec!["amy", "Bea"]);
        assert_eq!(status.groups[1].attendees[1].extra, 2);
        // unresolved members fall back to their id
        assert_eq!(status.groups[2].attendees[0].name, "user 30");
    }

    #[test]
    fn test_summary_line() {
        let now = Utc::now();
        let mut raid = Raid::new(
            1,
            10,
            Subject::Boss {
                name: "kyogre".to_string(),
                tier: 5,
            },
            4,
            now,
            now + Duration::hours(2),
        );
        raid.channel_id = 77;
        let summary = RaidSummary::of(&raid, Some(&venue()));
        assert_eq!(
            summary.line(),
            "**Kyogre**\n<#77> :: Central Station :: 1 interested trainer"
        );
    }
}
