use serenity::all::{CreateEmbed, CreateEmbedFooter, GuildId, Http};
use std::collections::HashMap;

use crate::raid::AttendeeStatus;
use crate::status::{AttendeeLine, RaidStatus};

const EMBED_COLOUR: u32 = 4_437_377;
const FIELD_LIMIT: usize = 1024;

/// Guild emoji looked up by name for each status, with a plain fallback.
const STATUS_EMOJI: [(AttendeeStatus, &str, &str); 4] = [
    (AttendeeStatus::Interested, "pokeball", "❔"),
    (AttendeeStatus::Coming, "greatball", "➡️"),
    (AttendeeStatus::Present, "ultraball", "✅"),
    (AttendeeStatus::Complete, "premierball", "🏁"),
];

/// Roles that earn a badge next to the member name; the badge is the guild
/// emoji of the same name.
const TEAM_ROLES: [&str; 3] = ["instinct", "mystic", "valor"];

/// Guild-specific emoji, resolved once when the bot connects.
#[derive(Debug, Clone, Default)]
pub struct Decorations {
    status: HashMap<AttendeeStatus, String>,
    badges: HashMap<u64, String>,
}

impl Decorations {
    /// `emojis` are (name, tag) pairs, `roles` are (role id, role name) pairs.
    pub fn from_parts(
        emojis: impl IntoIterator<Item = (String, String)>,
        roles: impl IntoIterator<Item = (u64, String)>,
    ) -> Self {
        let by_name: HashMap<String, String> = emojis
            .into_iter()
            .map(|(name, tag)| (name.to_ascii_lowercase(), tag))
            .collect();

        let status = STATUS_EMOJI
            .iter()
            .filter_map(|(s, name, _)| by_name.get(*name).map(|tag| (*s, tag.clone())))
            .collect();

        let badges = roles
            .into_iter()
            .filter_map(|(id, name)| {
                let name = name.to_ascii_lowercase();
                if !TEAM_ROLES.contains(&name.as_str()) {
                    return None;
                }
                by_name.get(&name).map(|tag| (id, tag.clone()))
            })
            .collect();

        Self { status, badges }
    }

    pub async fn fetch(http: &Http, guild_id: GuildId) -> Self {
        let emojis = match guild_id.emojis(http).await {
            Ok(list) => list
                .into_iter()
                .map(|e| (e.name.clone(), format!("<:{}:{}>", e.name, e.id.get())))
                .collect(),
            Err(e) => {
                tracing::warn!(guild_id = guild_id.get(), error = %e, "could not fetch guild emoji");
                Vec::new()
            }
        };
        let roles = match guild_id.roles(http).await {
            Ok(map) => map
                .into_iter()
                .map(|(id, role)| (id.get(), role.name))
                .collect(),
            Err(e) => {
                tracing::warn!(guild_id = guild_id.get(), error = %e, "could not fetch guild roles");
                Vec::new()
            }
        };
        Self::from_parts(emojis, roles)
    }

    pub fn status(&self, status: AttendeeStatus) -> &str {
        if let Some(tag) = self.status.get(&status) {
            return tag;
        }
        STATUS_EMOJI
            .iter()
            .find(|(s, _, _)| *s == status)
            .map(|(_, _, fallback)| *fallback)
            .unwrap_or("")
    }

    fn badges(&self, roles: &[u64]) -> String {
        roles
            .iter()
            .filter_map(|r| self.badges.get(r))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("")
    }
}

fn attendee_line(line: &AttendeeLine, decorations: &Decorations) -> String {
    let mut text = line.name.clone();
    if line.extra > 0 {
        text.push_str(&format!(" +{}", line.extra));
    }
    let badges = decorations.badges(&line.roles);
    if !badges.is_empty() {
        text.push(' ');
        text.push_str(&badges);
    }
    text
}

/// Joins lines, cutting off with a count of what did not fit.
fn capped(lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let rest = lines.len() - i;
        let sep = if out.is_empty() { "" } else { "\n" };
        // lines after this one still need room for a tail
        let reserve = if rest > 1 {
            format!("\n... and {} more", rest).len()
        } else {
            0
        };
        if out.len() + sep.len() + line.len() + reserve > FIELD_LIMIT {
            out.push_str(&format!("{}... and {} more", sep, rest));
            return out;
        }
        out.push_str(sep);
        out.push_str(line);
    }
    out
}

/// Head count field, left out while nobody counts.
fn total_field(total: u32) -> Option<(&'static str, String)> {
    (total > 0).then(|| ("Possible Trainers", total.to_string()))
}

pub fn render_status(status: &RaidStatus, decorations: &Decorations) -> CreateEmbed {
    let mut e = CreateEmbed::new()
        .colour(EMBED_COLOUR)
        .title(&status.title)
        .description(&status.description)
        .footer(CreateEmbedFooter::new(&status.footer));
    if let Some(url) = &status.url {
        e = e.url(url);
    }

    if let Some((label, at)) = &status.hatch {
        e = e.field(label, at, true);
    }
    if let Some((label, at)) = &status.start {
        e = e.field(label, at, true);
    }

    if let Some((name, value)) = total_field(status.total) {
        e = e.field(name, value, false);
    }
    for group in &status.groups {
        let lines: Vec<String> = group
            .attendees
            .iter()
            .map(|a| attendee_line(a, decorations))
            .collect();
        e = e.field(
            format!("{} {}", decorations.status(group.status), group.status.label()),
            capped(&lines),
            true,
        );
    }

    if let Some(info) = &status.location_info {
        e = e.field("Location Information", info, false);
    }
    e
}
