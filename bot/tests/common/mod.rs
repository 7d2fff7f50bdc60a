#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use raid_bot::config::Timings;
use raid_bot::engine::{RaidContext, RaidEngine};
use raid_bot::error::GatewayError;
use raid_bot::gateway::{ChannelInfo, Gateway, GatewayResult, MemberInfo, Reply};
use raid_bot::raid::{MessageRef, Raid, Subject};
use raid_bot::registry::Registry;
use raid_bot::scheduler::Scheduler;
use raid_bot::status::RaidStatus;
use raid_bot::store::{MemoryStore, RaidStore};
use raid_bot::venues::{Venue, VenueTable};

pub const SOURCE: u64 = 100;
pub const VENUE: u64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send { channel_id: u64, content: String },
    Edit { message: MessageRef, header: String, total: u32 },
    DeleteMessage(MessageRef),
    Pin(MessageRef),
    React(MessageRef, String),
    Rename { channel_id: u64, name: String },
    Clone { source: u64, name: String, created: u64 },
    DeleteChannel(u64),
    Ask { member_id: u64, prompt: String },
}

/// Records every call; entities are present unless marked missing.
#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<Call>>,
    missing_channels: Mutex<HashSet<u64>>,
    missing_messages: Mutex<HashSet<MessageRef>>,
    missing_members: Mutex<HashSet<u64>>,
    replies: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(10_000),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn remove_channel(&self, channel_id: u64) {
        self.missing_channels.lock().unwrap().insert(channel_id);
    }

    pub fn remove_message(&self, message: MessageRef) {
        self.missing_messages.lock().unwrap().insert(message);
    }

    pub fn remove_member(&self, member_id: u64) {
        self.missing_members.lock().unwrap().insert(member_id);
    }

    /// Members without a reply never answer.
    pub fn reply_with(&self, member_id: u64, content: &str) {
        self.replies.lock().unwrap().insert(member_id, content.to_string());
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { channel_id: id, content } if id == channel_id => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn asked(&self) -> Vec<u64> {
        let mut members: Vec<u64> = self
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ask { member_id, .. } => Some(member_id),
                _ => None,
            })
            .collect();
        members.sort_unstable();
        members
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_channel(&self, channel_id: u64) -> GatewayResult<()> {
        if self.missing_channels.lock().unwrap().contains(&channel_id) {
            return Err(GatewayError::ChannelNotFound(channel_id));
        }
        Ok(())
    }

    fn check_message(&self, message: MessageRef) -> GatewayResult<()> {
        if self.missing_messages.lock().unwrap().contains(&message) {
            return Err(GatewayError::MessageNotFound(message));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn channel(&self, channel_id: u64) -> GatewayResult<ChannelInfo> {
        self.check_channel(channel_id)?;
        Ok(ChannelInfo {
            id: channel_id,
            name: format!("channel-{channel_id}"),
        })
    }

    async fn message(&self, message: MessageRef) -> GatewayResult<()> {
        self.check_message(message)
    }

    async fn send_message(&self, channel_id: u64, content: &str) -> GatewayResult<MessageRef> {
        self.check_channel(channel_id)?;
        self.record(Call::Send {
            channel_id,
            content: content.to_string(),
        });
        Ok(MessageRef::new(channel_id, self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn edit_status(
        &self,
        message: MessageRef,
        header: &str,
        status: &RaidStatus,
    ) -> GatewayResult<()> {
        self.check_message(message)?;
        self.record(Call::Edit {
            message,
            header: header.to_string(),
            total: status.total,
        });
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> GatewayResult<()> {
        self.check_message(message)?;
        self.record(Call::DeleteMessage(message));
        Ok(())
    }

    async fn pin_message(&self, message: MessageRef) -> GatewayResult<()> {
        self.check_message(message)?;
        self.record(Call::Pin(message));
        Ok(())
    }

    async fn react(&self, message: MessageRef, emoji: &str) -> GatewayResult<()> {
        self.record(Call::React(message, emoji.to_string()));
        Ok(())
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> GatewayResult<()> {
        self.check_channel(channel_id)?;
        self.record(Call::Rename {
            channel_id,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn clone_channel(&self, source: u64, name: &str) -> GatewayResult<u64> {
        self.check_channel(source)?;
        let created = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Clone {
            source,
            name: name.to_string(),
            created,
        });
        Ok(created)
    }

    async fn delete_channel(&self, channel_id: u64) -> GatewayResult<()> {
        self.check_channel(channel_id)?;
        self.record(Call::DeleteChannel(channel_id));
        self.missing_channels.lock().unwrap().insert(channel_id);
        Ok(())
    }

    async fn member(&self, member_id: u64) -> GatewayResult<MemberInfo> {
        if self.missing_members.lock().unwrap().contains(&member_id) {
            return Err(GatewayError::MemberNotFound(member_id));
        }
        Ok(MemberInfo {
            id: member_id,
            display_name: format!("trainer{member_id}"),
            roles: Vec::new(),
        })
    }

    async fn ask(
        &self,
        member_id: u64,
        prompt: &str,
        timeout: std::time::Duration,
    ) -> GatewayResult<Option<Reply>> {
        self.record(Call::Ask {
            member_id,
            prompt: prompt.to_string(),
        });
        let reply = self.replies.lock().unwrap().get(&member_id).cloned();
        match reply {
            Some(content) => Ok(Some(Reply {
                message: MessageRef::new(900, self.next_id.fetch_add(1, Ordering::SeqCst)),
                content,
            })),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }
}

pub struct Harness {
    pub engine: Arc<RaidEngine>,
    pub gateway: Arc<MockGateway>,
    pub store: Arc<MemoryStore>,
    pub scheduler: Scheduler,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(store: Arc<MemoryStore>) -> Self {
        Self::with_backend(store.clone(), store).await
    }

    /// `store` is what assertions inspect; `backend` is what the registry writes to.
    pub async fn with_backend(store: Arc<MemoryStore>, backend: Arc<dyn RaidStore>) -> Self {
        let gateway = MockGateway::new();
        let registry = Arc::new(Registry::load(backend).await.unwrap());
        let venues = VenueTable::new([Venue {
            id: VENUE,
            name: "Fountain Square".to_string(),
            nickname: None,
            latitude: 52.23,
            longitude: 21.01,
            additional_information: None,
        }]);
        let timings = Timings {
            timezone: chrono_tz::UTC,
            ..Timings::default()
        };
        let engine = RaidEngine::new(RaidContext {
            registry,
            gateway: gateway.clone(),
            venues: Arc::new(venues),
            timings,
        });
        let scheduler = Scheduler::new(engine.clone());
        Self {
            engine,
            gateway,
            store,
            scheduler,
        }
    }

    pub async fn settle(&self) {
        self.engine.effects().settle().await;
    }

    /// Registers a raid directly, bypassing channel creation.
    pub async fn insert(&self, raid: Raid) -> Raid {
        self.engine.registry().put(raid.clone()).await.unwrap();
        raid
    }
}

pub fn boss(name: &str) -> Subject {
    Subject::Boss {
        name: name.to_string(),
        tier: 5,
    }
}

/// A raid created at `created` in channel `channel_id`.
pub fn raid_at(channel_id: u64, subject: Subject, created: DateTime<Utc>) -> Raid {
    let mut raid = Raid::new(SOURCE, 1, subject, VENUE, created, created + Duration::minutes(120));
    raid.channel_id = channel_id;
    raid
}
