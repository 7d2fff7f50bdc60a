//! Venue lookup.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Venue {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub additional_information: Option<String>,
}

impl Venue {
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }

    pub fn directions_url(&self) -> String {
        format!(
            "https://www.google.com/maps/dir/Current+Location/{},{}",
            self.latitude, self.longitude
        )
    }
}

pub trait Venues: Send + Sync {
    fn venue(&self, id: u64) -> Option<Venue>;
}

/// Venues loaded once from a JSON array.
#[derive(Debug, Default)]
pub struct VenueTable {
    by_id: HashMap<u64, Venue>,
}

impl VenueTable {
    pub fn new(venues: impl IntoIterator<Item = Venue>) -> Self {
        Self {
            by_id: venues.into_iter().map(|v| (v.id, v)).collect(),
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let venues: Vec<Venue> = serde_json::from_str(json)?;
        Ok(Self::new(venues))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let table = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), venues = table.by_id.len(), "venues loaded");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Venues for VenueTable {
    fn venue(&self, id: u64) -> Option<Venue> {
        self.by_id.get(&id).cloned()
    }
}
