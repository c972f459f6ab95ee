use serenity::{
    client::Context,
    gateway::ChunkGuildFilter,
    model::{application::Interaction, gateway::Ready, guild::Guild},
};

use super::{commands, registry::Registry};
use crate::prelude::*;

/// Large guilds arrive without their full member list, and autocomplete reads
/// members from the cache
#[inline]
fn needs_chunking(cached: usize, total: u64) -> bool { (cached as u64) < total }

#[derive(Debug)]
pub struct Handler {
    registry: Registry,
}

impl Handler {
    pub fn new_rc(opts: &commands::CommandOpts) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(commands::list(opts)),
        })
    }
}

#[async_trait]
impl serenity::client::EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.tag(), id = %ready.user.id, "Logged in");

        match self.registry.sync(&ctx).await {
            Ok(n) => info!("Successfully synced {n} command(s)"),
            Err(e) => error!("Error syncing commands: {e:?}"),
        }
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _: Option<bool>) {
        if !needs_chunking(guild.members.len(), guild.member_count) {
            return;
        }

        debug!(
            guild = %guild.id,
            cached = guild.members.len(),
            total = guild.member_count,
            "Requesting member chunks"
        );
        ctx.shard
            .chunk_guild(guild.id, None, false, ChunkGuildFilter::None, None);
    }

    async fn interaction_create(&self, ctx: Context, int: Interaction) {
        match int {
            Interaction::Command(aci) => self.registry.handle_command(&ctx, aci).await,
            Interaction::Autocomplete(ac) => self.registry.handle_autocomplete(&ctx, ac).await,
            i => debug!(id = %i.id(), kind = ?i.kind(), "Ignoring unhandled interaction"),
        }
    }
}
