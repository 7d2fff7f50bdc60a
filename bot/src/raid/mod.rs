//! Raid entity model.

pub mod attendance;
pub mod time;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::venues::Venue;

pub use attendance::attendee_count;

/// Where a raid is heading: a known boss, or an egg that only tells the tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    Boss { name: String, tier: u8 },
    Egg { tier: u8 },
}

impl Subject {
    pub fn name(&self) -> Option<&str> {
        match self {
            Subject::Boss { name, .. } => Some(name),
            Subject::Egg { .. } => None,
        }
    }

    pub fn tier(&self) -> u8 {
        match self {
            Subject::Boss { tier, .. } | Subject::Egg { tier } => *tier,
        }
    }

    /// Capitalized boss name, or `????` for an egg.
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => {
                let mut chars = name.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            None => "????".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    Interested,
    Coming,
    Present,
    Complete,
}

impl AttendeeStatus {
    pub const ALL: [AttendeeStatus; 4] = [
        AttendeeStatus::Interested,
        AttendeeStatus::Coming,
        AttendeeStatus::Present,
        AttendeeStatus::Complete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AttendeeStatus::Interested => "Interested",
            AttendeeStatus::Coming => "Coming",
            AttendeeStatus::Present => "Present",
            AttendeeStatus::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// The member plus whoever they bring along; never zero.
    pub count: u32,
    pub status: AttendeeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndTime {
    #[default]
    Undefined,
    At(DateTime<Utc>),
}

impl EndTime {
    pub fn at(self) -> Option<DateTime<Utc>> {
        match self {
            EndTime::Undefined => None,
            EndTime::At(t) => Some(t),
        }
    }
}

/// A message somewhere on the platform, `channel:message` in text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

impl MessageRef {
    pub fn new(channel_id: u64, message_id: u64) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.message_id)
    }
}

impl FromStr for MessageRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, message) = s
            .split_once(':')
            .ok_or_else(|| format!("expected channel:message, got {s:?}"))?;
        Ok(Self {
            channel_id: channel.parse().map_err(|_| format!("bad channel id in {s:?}"))?,
            message_id: message.parse().map_err(|_| format!("bad message id in {s:?}"))?,
        })
    }
}

/// One raid, keyed by the channel it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raid {
    pub channel_id: u64,
    pub source_channel_id: u64,
    pub created_by: u64,
    pub creation_time: DateTime<Utc>,
    pub subject: Subject,
    pub venue_id: u64,
    #[serde(default)]
    pub attendees: HashMap<u64, Attendee>,

    #[serde(default)]
    pub hatch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hatched: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_clear_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: EndTime,
    pub last_possible_time: DateTime<Utc>,
    #[serde(default)]
    pub deletion_warning_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deletion_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement: Option<MessageRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<MessageRef>,
}

impl Raid {
    /// A fresh raid with its creator signed up as interested.
    ///
    /// `channel_id` stays 0 until the bound channel exists.
    pub fn new(
        source_channel_id: u64,
        created_by: u64,
        subject: Subject,
        venue_id: u64,
        creation_time: DateTime<Utc>,
        last_possible_time: DateTime<Utc>,
    ) -> Self {
        let mut attendees = HashMap::new();
        attendees.insert(
            created_by,
            Attendee {
                count: 1,
                status: AttendeeStatus::Interested,
            },
        );

        Self {
            channel_id: 0,
            source_channel_id,
            created_by,
            creation_time,
            subject,
            venue_id,
            attendees,
            hatch_time: None,
            hatched: false,
            start_time: None,
            start_clear_time: None,
            end_time: EndTime::Undefined,
            last_possible_time,
            deletion_warning_time: None,
            deletion_time: None,
            announcement: None,
            messages: Vec::new(),
        }
    }

    pub fn is_hatched(&self) -> bool {
        self.subject.name().is_some()
    }

    /// Every message that mirrors this raid's state.
    pub fn message_refs(&self) -> impl Iterator<Item = MessageRef> + '_ {
        self.announcement.into_iter().chain(self.messages.iter().copied())
    }

    /// Drops `message` wherever it is referenced; returns whether anything changed.
    pub fn drop_message(&mut self, message: MessageRef) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| *m != message);
        let mut changed = before != self.messages.len();
        if self.announcement == Some(message) {
            self.announcement = None;
            changed = true;
        }
        changed
    }

    /// Copy suitable for the archive: no message references.
    pub fn stripped(&self) -> Raid {
        Raid {
            announcement: None,
            messages: Vec::new(),
            ..self.clone()
        }
    }

    /// Describes the first broken invariant, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let EndTime::At(end) = self.end_time {
            if end < self.creation_time {
                return Err(format!("end time {end} precedes creation"));
            }
        }
        if let Some((member, _)) = self.attendees.iter().find(|(_, a)| a.count == 0) {
            return Err(format!("attendee {member} has a zero count"));
        }
        if let Some(announcement) = self.announcement {
            if self.messages.contains(&announcement) {
                return Err(format!("announcement {announcement} also listed as a message"));
            }
        }
        if self.deletion_warning_time.is_some() && self.deletion_time.is_none() {
            return Err("deletion warning recorded without a deletion time".to_string());
        }
        Ok(())
    }
}

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").expect("static regex"));

fn slug(text: &str) -> String {
    NON_WORD
        .split(text)
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Channel name for a raid: `<boss or tier N>-<venue>`.
pub fn channel_name(subject: &Subject, venue: Option<&Venue>) -> String {
    let head = match subject.name() {
        Some(name) => slug(name),
        None => slug(&format!("tier {}", subject.tier())),
    };
    let venue = venue
        .map(|v| slug(&v.display_name().to_lowercase()))
        .unwrap_or_else(|| "unknown-venue".to_string());
    format!("{head}-{venue}")
}
