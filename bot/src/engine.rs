//! The mutating raid API.
//!
//! Every operation validates and persists through the `Registry` first, then
//! spawns its platform side effects through the `EffectSink`. Lookups of
//! channels, messages and members go through the self-healing resolvers so
//! references to deleted entities are dropped as soon as they are noticed.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Timings;
use crate::effects::EffectSink;
use crate::error::{GatewayError, RaidError, Result};
use crate::gateway::{ChannelInfo, Gateway, MemberInfo};
use crate::raid::{attendance, channel_name, time, AttendeeStatus, MessageRef, Raid, Subject};
use crate::registry::Registry;
use crate::status::{clock, RaidStatus, RaidSummary};
use crate::venues::Venues;

const COMPLETE_REACTION: &str = "👍";
const TRUTHY: [&str; 9] = ["true", "t", "yes", "y", "on", "enable", "enabled", "1", "+"];

pub fn is_truthy(reply: &str) -> bool {
    let reply = reply.trim().to_lowercase();
    TRUTHY.contains(&reply.as_str())
}

/// Collaborators the engine is built from.
pub struct RaidContext {
    pub registry: Arc<Registry>,
    pub gateway: Arc<dyn Gateway>,
    pub venues: Arc<dyn Venues>,
    pub timings: Timings,
}

pub struct RaidEngine {
    registry: Arc<Registry>,
    gateway: Arc<dyn Gateway>,
    venues: Arc<dyn Venues>,
    timings: Timings,
    effects: Arc<EffectSink>,
}

impl RaidEngine {
    pub fn new(ctx: RaidContext) -> Arc<Self> {
        Arc::new(Self {
            registry: ctx.registry,
            gateway: ctx.gateway,
            venues: ctx.venues,
            timings: ctx.timings,
            effects: EffectSink::new(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn effects(&self) -> &Arc<EffectSink> {
        &self.effects
    }

    // ---- creation -------------------------------------------------------

    /// Opens a raid channel next to `source` and registers the raid in it.
    pub async fn create_raid(
        self: &Arc<Self>,
        source_channel_id: u64,
        created_by: u64,
        subject: Subject,
        venue_id: u64,
        end_in: Option<Duration>,
    ) -> Result<Raid> {
        let now = Utc::now();
        let venue = self.venues.venue(venue_id);
        let name = channel_name(&subject, venue.as_ref());

        let mut raid = Raid::new(
            source_channel_id,
            created_by,
            subject,
            venue_id,
            now,
            time::last_possible_time(now, &self.timings),
        );
        time::apply_end_time(&mut raid, now, end_in, &self.timings);

        self.channel(source_channel_id).await?;
        raid.channel_id = self.gateway.clone_channel(source_channel_id, &name).await?;

        if let Err(e) = self.registry.put(raid.clone()).await {
            let gateway = Arc::clone(&self.gateway);
            let channel_id = raid.channel_id;
            self.effects.spawn("delete orphaned channel", channel_id, async move {
                gateway.delete_channel(channel_id).await
            });
            return Err(e.into());
        }

        tracing::info!(
            channel_id = raid.channel_id,
            source_channel_id,
            venue_id,
            created_by,
            "raid created"
        );
        Ok(raid)
    }

    // ---- attendance -----------------------------------------------------

    pub async fn join(
        self: &Arc<Self>,
        channel_id: u64,
        member_id: u64,
        status: AttendeeStatus,
        extra: Option<u32>,
    ) -> Result<Raid> {
        let ((), raid) = self
            .registry
            .update(channel_id, |raid| attendance::join(raid, member_id, status, extra))
            .await?;
        tracing::debug!(channel_id, member_id, status = status.label(), "attendance updated");
        self.refresh(channel_id);
        Ok(raid)
    }

    pub async fn set_status(
        self: &Arc<Self>,
        channel_id: u64,
        member_id: u64,
        status: AttendeeStatus,
    ) -> Result<Raid> {
        self.join(channel_id, member_id, status, None).await
    }

    pub async fn leave(self: &Arc<Self>, channel_id: u64, member_id: u64) -> Result<Raid> {
        let (_, raid) = self
            .registry
            .update(channel_id, |raid| attendance::leave(raid, member_id))
            .await?;
        tracing::debug!(channel_id, member_id, "attendee left");
        self.refresh(channel_id);
        Ok(raid)
    }

    // ---- times, subject, location ---------------------------------------

    pub async fn set_start_time(self: &Arc<Self>, channel_id: u64, start_in: Duration) -> Result<Raid> {
        let now = Utc::now();
        let timings = self.timings.clone();
        let ((), raid) = self
            .registry
            .update(channel_id, move |raid| {
                time::apply_start_time(raid, now, start_in, &timings);
                // a new start time re-arms the window
                raid.start_clear_time = None;
                Ok(())
            })
            .await?;
        self.refresh(channel_id);
        Ok(raid)
    }

    pub async fn set_end_time(
        self: &Arc<Self>,
        channel_id: u64,
        end_in: Option<Duration>,
    ) -> Result<Raid> {
        let now = Utc::now();
        let timings = self.timings.clone();
        let ((), raid) = self
            .registry
            .update(channel_id, move |raid| {
                time::apply_end_time(raid, now, end_in, &timings);
                Ok(())
            })
            .await?;
        self.refresh(channel_id);
        Ok(raid)
    }

    pub async fn set_subject(self: &Arc<Self>, channel_id: u64, subject: Subject) -> Result<Raid> {
        let ((), raid) = self
            .registry
            .update(channel_id, move |raid| {
                if subject.name().is_some() {
                    raid.hatch_time = None;
                }
                raid.subject = subject;
                Ok(())
            })
            .await?;
        self.rename(&raid);
        self.refresh(channel_id);
        Ok(raid)
    }

    pub async fn set_location(self: &Arc<Self>, channel_id: u64, venue_id: u64) -> Result<Raid> {
        let ((), raid) = self
            .registry
            .update(channel_id, move |raid| {
                raid.venue_id = venue_id;
                Ok(())
            })
            .await?;
        self.rename(&raid);
        self.refresh(channel_id);
        Ok(raid)
    }

    fn rename(self: &Arc<Self>, raid: &Raid) {
        let name = channel_name(&raid.subject, self.venues.venue(raid.venue_id).as_ref());
        let engine = Arc::clone(self);
        let channel_id = raid.channel_id;
        self.effects.spawn("rename channel", channel_id, async move {
            engine.channel(channel_id).await?;
            engine.gateway.rename_channel(channel_id, &name).await?;
            Ok::<(), RaidError>(())
        });
    }

    // ---- status messages ------------------------------------------------

    /// Makes `message` the raid's pinned announcement.
    pub async fn set_announcement(self: &Arc<Self>, channel_id: u64, message: MessageRef) -> Result<Raid> {
        let ((), raid) = self
            .registry
            .update(channel_id, move |raid| {
                raid.messages.retain(|m| *m != message);
                raid.announcement = Some(message);
                Ok(())
            })
            .await?;

        let engine = Arc::clone(self);
        self.effects.spawn("pin announcement", channel_id, async move {
            engine.pin(message).await
        });
        self.refresh(channel_id);
        Ok(raid)
    }

    /// Registers another message mirroring the raid status.
    pub async fn add_message(
        self: &Arc<Self>,
        channel_id: u64,
        message: MessageRef,
        pin: bool,
    ) -> Result<Raid> {
        let raid = match self
            .registry
            .try_update(channel_id, move |raid| {
                if raid.message_refs().any(|m| m == message) {
                    return Ok(None);
                }
                raid.messages.push(message);
                Ok(Some(()))
            })
            .await?
        {
            Some(((), raid)) => raid,
            None => self
                .registry
                .get(channel_id)
                .ok_or(RaidError::RaidNotFound(channel_id))?,
        };

        if pin {
            let engine = Arc::clone(self);
            self.effects.spawn("pin message", channel_id, async move {
                engine.pin(message).await
            });
        }
        self.refresh(channel_id);
        Ok(raid)
    }

    async fn pin(&self, message: MessageRef) -> Result<()> {
        match self.gateway.pin_message(message).await {
            Err(GatewayError::MessageNotFound(_)) => {
                self.forget_message(message).await;
                Ok(())
            }
            other => Ok(other?),
        }
    }

    pub fn summaries_for_source(&self, source_channel_id: u64) -> Vec<RaidSummary> {
        self.registry
            .all_for_source(source_channel_id)
            .iter()
            .map(|raid| RaidSummary::of(raid, self.venues.venue(raid.venue_id).as_ref()))
            .collect()
    }

    // ---- status refresh -------------------------------------------------

    /// Schedules a rewrite of every status message of the raid.
    pub fn refresh(self: &Arc<Self>, channel_id: u64) {
        let engine = Arc::clone(self);
        self.effects.spawn("refresh status", channel_id, async move {
            engine.refresh_now(channel_id).await
        });
    }

    /// Rebuilds the status and spawns one edit per status message.
    pub async fn refresh_now(self: &Arc<Self>, channel_id: u64) -> Result<()> {
        let Some(raid) = self.registry.get(channel_id) else {
            return Ok(());
        };

        let mut members: HashMap<u64, MemberInfo> = HashMap::new();
        for member_id in raid.attendees.keys().copied() {
            match self.member(channel_id, member_id).await {
                Ok(info) => {
                    members.insert(member_id, info);
                }
                Err(RaidError::Gateway(GatewayError::MemberNotFound(_))) => {}
                Err(e) => {
                    tracing::debug!(channel_id, member_id, error = %e, "member lookup failed");
                }
            }
        }

        // member lookups may have removed attendees
        let Some(raid) = self.registry.get(channel_id) else {
            return Ok(());
        };
        let venue = self.venues.venue(raid.venue_id);
        let status = Arc::new(RaidStatus::build(
            &raid,
            venue.as_ref(),
            &members,
            Utc::now(),
            self.timings.timezone,
        ));

        let mut edits: Vec<(MessageRef, String)> = Vec::new();
        if let Some(announcement) = raid.announcement {
            edits.push((
                announcement,
                format!("Use <#{}> for the following raid:", raid.channel_id),
            ));
        }
        for message in &raid.messages {
            edits.push((
                *message,
                format!(
                    "Use <#{}> to return to this raid's regional channel.",
                    raid.source_channel_id
                ),
            ));
        }

        for (message, header) in edits {
            let engine = Arc::clone(self);
            let status = Arc::clone(&status);
            self.effects.spawn("edit status", channel_id, async move {
                match engine.gateway.edit_status(message, &header, &status).await {
                    Err(GatewayError::MessageNotFound(_)) => {
                        engine.forget_message(message).await;
                        Ok(())
                    }
                    other => other,
                }
            });
        }
        Ok(())
    }

    // ---- self-healing resolvers -----------------------------------------

    /// Resolves a channel; a vanished channel takes its raid records with it.
    pub async fn channel(&self, channel_id: u64) -> Result<ChannelInfo> {
        match self.gateway.channel(channel_id).await {
            Err(GatewayError::ChannelNotFound(id)) => {
                self.forget_channel(id).await;
                Err(GatewayError::ChannelNotFound(id).into())
            }
            other => Ok(other?),
        }
    }

    /// Checks a message still exists, dropping references to it if not.
    pub async fn message(&self, message: MessageRef) -> Result<()> {
        self.channel(message.channel_id).await?;
        match self.gateway.message(message).await {
            Err(GatewayError::MessageNotFound(m)) => {
                self.forget_message(m).await;
                Err(GatewayError::MessageNotFound(m).into())
            }
            other => Ok(other?),
        }
    }

    /// Resolves an attendee of the raid in `channel_id`; a member who left
    /// the guild is removed from the raid.
    pub async fn member(&self, channel_id: u64, member_id: u64) -> Result<MemberInfo> {
        match self.gateway.member(member_id).await {
            Err(GatewayError::MemberNotFound(id)) => {
                tracing::warn!(channel_id, member_id = id, "removing attendee no longer in the guild");
                let removed = self
                    .registry
                    .try_update(channel_id, |raid| Ok(raid.attendees.remove(&id).map(|_| ())))
                    .await;
                match removed {
                    Ok(_) | Err(RaidError::RaidNotFound(_)) => {}
                    Err(e) => {
                        tracing::error!(channel_id, member_id = id, error = %e, "could not remove attendee")
                    }
                }
                Err(GatewayError::MemberNotFound(id).into())
            }
            other => Ok(other?),
        }
    }

    /// Drops every record bound to or pointing into a channel that is gone.
    pub async fn forget_channel(&self, channel_id: u64) {
        match self.registry.remove(channel_id).await {
            Ok(Some(raid)) => {
                tracing::warn!(channel_id, "raid channel is gone, raid removed");
                if let Some(announcement) = raid.announcement {
                    let gateway = Arc::clone(&self.gateway);
                    self.effects.spawn("delete announcement", channel_id, async move {
                        gateway.delete_message(announcement).await
                    });
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(channel_id, error = %e, "could not remove raid"),
        }

        // records the registry never loaded
        if let Err(e) = self.registry.store().delete_active(channel_id).await {
            tracing::error!(channel_id, error = %e, "could not delete stale raid record");
        }

        for holder in self.registry.with_messages_in(channel_id) {
            let dropped = self
                .registry
                .try_update(holder, |raid| {
                    let before = raid.messages.len() + usize::from(raid.announcement.is_some());
                    raid.messages.retain(|m| m.channel_id != channel_id);
                    if raid.announcement.is_some_and(|m| m.channel_id == channel_id) {
                        raid.announcement = None;
                    }
                    let after = raid.messages.len() + usize::from(raid.announcement.is_some());
                    Ok((after != before).then_some(()))
                })
                .await;
            match dropped {
                Ok(Some(_)) => {
                    tracing::warn!(channel_id = holder, gone = channel_id, "dropped messages in deleted channel")
                }
                Ok(None) | Err(RaidError::RaidNotFound(_)) => {}
                Err(e) => tracing::error!(channel_id = holder, error = %e, "could not drop messages"),
            }
        }
    }

    /// Drops a deleted message from whichever raid references it.
    pub async fn forget_message(&self, message: MessageRef) {
        for holder in self.registry.holders_of(message) {
            match self
                .registry
                .try_update(holder, |raid| Ok(raid.drop_message(message).then_some(())))
                .await
            {
                Ok(Some(_)) => tracing::warn!(channel_id = holder, %message, "dropped deleted message"),
                Ok(None) | Err(RaidError::RaidNotFound(_)) => {}
                Err(e) => tracing::error!(channel_id = holder, %message, error = %e, "could not drop message"),
            }
        }
    }

    // ---- completion poll ------------------------------------------------

    /// Marks `requested_by` complete, then asks every present attendee
    /// whether they are done too. Each question is its own task.
    pub async fn complete_present(
        self: &Arc<Self>,
        channel_id: u64,
        requested_by: Option<u64>,
    ) -> Result<()> {
        if let Some(member_id) = requested_by {
            self.registry
                .update(channel_id, |raid| {
                    attendance::join(raid, member_id, AttendeeStatus::Complete, None)
                })
                .await?;
            self.refresh(channel_id);
        }

        let raid = self
            .registry
            .get(channel_id)
            .ok_or(RaidError::RaidNotFound(channel_id))?;
        self.channel(channel_id).await?;

        let mut present: Vec<u64> = raid
            .attendees
            .iter()
            .filter(|(id, a)| a.status == AttendeeStatus::Present && Some(**id) != requested_by)
            .map(|(id, _)| *id)
            .collect();
        present.sort_unstable();

        tracing::info!(channel_id, polled = present.len(), "asking present attendees about completion");
        for member_id in present {
            let engine = Arc::clone(self);
            self.effects.spawn("completion poll", channel_id, async move {
                engine.poll_completion(channel_id, member_id).await
            });
        }
        Ok(())
    }

    async fn poll_completion(self: Arc<Self>, channel_id: u64, member_id: u64) -> Result<()> {
        self.member(channel_id, member_id).await?;

        let prompt = format!("Have you completed raid <#{channel_id}>?");
        let Some(reply) = self
            .gateway
            .ask(member_id, &prompt, self.timings.complete_timeout)
            .await?
        else {
            tracing::debug!(channel_id, member_id, "no completion reply");
            return Ok(());
        };
        if !is_truthy(&reply.content) {
            return Ok(());
        }

        let gateway = Arc::clone(&self.gateway);
        self.effects.spawn("acknowledge reply", channel_id, async move {
            gateway.react(reply.message, COMPLETE_REACTION).await
        });

        let updated = self
            .registry
            .try_update(channel_id, |raid| {
                match raid.attendees.get_mut(&member_id) {
                    Some(a) if a.status == AttendeeStatus::Present => {
                        a.status = AttendeeStatus::Complete;
                        Ok(Some(()))
                    }
                    _ => Ok(None),
                }
            })
            .await;
        match updated {
            Ok(Some(_)) => {
                tracing::info!(channel_id, member_id, "attendee completed raid");
                self.refresh(channel_id);
                Ok(())
            }
            Ok(None) | Err(RaidError::RaidNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ---- lifecycle messages ---------------------------------------------

    /// Posts the deletion warning into the raid channel.
    pub async fn warn_deletion(&self, channel_id: u64, deletion: chrono::DateTime<Utc>) -> Result<()> {
        self.channel(channel_id).await?;
        let text = format!(
            "**WARNING** - this channel will be deleted automatically at {}!",
            clock(deletion, self.timings.timezone)
        );
        self.gateway.send_message(channel_id, &text).await?;
        Ok(())
    }
}
