//! The slice of the Discord API the commands depend on
//!
//! Commands are written against [`Platform`] rather than against serenity
//! directly so the webhook flow can be driven without a gateway connection.

use serenity::{
    builder::{
        CreateAttachment, CreateInteractionResponseFollowup, CreateWebhook, ExecuteWebhook,
    },
    client::Context,
    model::{
        application::CommandInteraction,
        channel::{Channel, ChannelType},
        error::Error as ModelError,
        guild,
        id::{ChannelId, GuildId, UserId},
        webhook::Webhook,
    },
};

use super::completion::{self, Completion};
use crate::prelude::*;

/// A snapshot of the parts of a guild member the commands read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub display_name: String,
    pub username: String,
    pub bot: bool,
    /// Guild avatar, then user avatar, then the default avatar
    pub avatar_url: String,
}

impl From<&guild::Member> for Member {
    fn from(member: &guild::Member) -> Self {
        Self {
            id: member.user.id,
            display_name: member.display_name().to_owned(),
            username: member.user.name.clone(),
            bot: member.user.bot,
            avatar_url: member.face(),
        }
    }
}

/// A classified failure from a Discord API call
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The bot lacks the permissions required for the request
    #[error("Missing permissions: {0}")]
    Forbidden(String),
    /// Discord rejected the request
    #[error("Discord API error: {0}")]
    Http(String),
    /// Anything else, e.g. gateway or (de)serialization failures
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn status_of(err: &serenity::Error) -> Option<u16> {
    match err {
        serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

/// Treat a 404 from a member lookup as "not in the guild"
fn member_or_none(
    res: Result<guild::Member, serenity::Error>,
) -> Result<Option<Member>, PlatformError> {
    match res {
        Ok(m) => Ok(Some(Member::from(&m))),
        Err(e) if status_of(&e) == Some(404) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl From<serenity::Error> for PlatformError {
    fn from(err: serenity::Error) -> Self {
        match (status_of(&err), err) {
            (Some(403), e) => Self::Forbidden(e.to_string()),
            (_, serenity::Error::Model(e @ ModelError::InvalidPermissions { .. })) => {
                Self::Forbidden(e.to_string())
            },
            (_, serenity::Error::Http(e)) => Self::Http(e.to_string()),
            (_, e) => Self::Other(anyhow::Error::new(e)),
        }
    }
}

/// Read access to guild member lists
#[async_trait]
pub trait Roster: Send + Sync {
    /// Completions for the cached members of a guild matching `prefix`, in
    /// cache iteration order
    fn suggest(&self, guild: GuildId, prefix: &str) -> Vec<Completion>;

    /// Look up a single member, returning `None` if they are not in the guild
    async fn member(&self, guild: GuildId, id: UserId) -> Result<Option<Member>, PlatformError>;
}

/// Everything the impersonation flow needs from the platform for one
/// interaction
#[async_trait]
pub trait Platform: Roster {
    /// Handle to a webhook created by [`Self::create_webhook`]
    type Webhook: fmt::Debug + Send + Sync;

    /// Acknowledge the interaction privately, buying time to respond
    async fn defer(&self) -> Result<(), PlatformError>;

    /// Send a private follow-up to a deferred interaction
    async fn reply(&self, content: &str) -> Result<(), PlatformError>;

    /// Get the kind of a channel, or `None` if it is not a guild channel
    async fn channel_kind(&self, channel: ChannelId) -> Result<Option<ChannelType>, PlatformError>;

    /// Create a webhook in `channel`, recording `reason` in the audit log
    async fn create_webhook(
        &self,
        channel: ChannelId,
        name: &str,
        avatar: Option<Vec<u8>>,
        reason: &str,
    ) -> Result<Self::Webhook, PlatformError>;

    /// Post `content` through a webhook, overriding its name and avatar, and
    /// wait for Discord to accept it
    async fn execute_webhook(
        &self,
        webhook: &Self::Webhook,
        content: &str,
        username: &str,
        avatar_url: &str,
    ) -> Result<(), PlatformError>;

    /// Delete a webhook created by [`Self::create_webhook`]
    async fn delete_webhook(&self, webhook: Self::Webhook) -> Result<(), PlatformError>;
}

/// [`Platform`] implementation backed by a live serenity context
#[derive(Clone, Copy)]
pub struct SerenityPlatform<'a> {
    ctx: &'a Context,
    aci: &'a CommandInteraction,
}

impl fmt::Debug for SerenityPlatform<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerenityPlatform")
            .field("interaction", &self.aci.id)
            .finish_non_exhaustive()
    }
}

impl<'a> SerenityPlatform<'a> {
    pub fn new(ctx: &'a Context, aci: &'a CommandInteraction) -> Self { Self { ctx, aci } }
}

#[async_trait]
impl Roster for SerenityPlatform<'_> {
    fn suggest(&self, guild: GuildId, prefix: &str) -> Vec<Completion> {
        self.ctx
            .cache
            .guild(guild)
            .map_or_else(Vec::new, |g| completion::suggest(prefix, g.members.values()))
    }

    async fn member(&self, guild: GuildId, id: UserId) -> Result<Option<Member>, PlatformError> {
        member_or_none(guild.member(self.ctx, id).await)
    }
}

#[async_trait]
impl Platform for SerenityPlatform<'_> {
    type Webhook = Webhook;

    async fn defer(&self) -> Result<(), PlatformError> {
        self.aci.defer_ephemeral(self.ctx).await?;
        Ok(())
    }

    async fn reply(&self, content: &str) -> Result<(), PlatformError> {
        self.aci
            .create_followup(
                self.ctx,
                CreateInteractionResponseFollowup::new()
                    .content(content)
                    .ephemeral(true),
            )
            .await?;
        Ok(())
    }

    async fn channel_kind(&self, channel: ChannelId) -> Result<Option<ChannelType>, PlatformError> {
        Ok(match channel.to_channel(self.ctx).await? {
            Channel::Guild(c) => Some(c.kind),
            _ => None,
        })
    }

    async fn create_webhook(
        &self,
        channel: ChannelId,
        name: &str,
        avatar: Option<Vec<u8>>,
        reason: &str,
    ) -> Result<Webhook, PlatformError> {
        let mut builder = CreateWebhook::new(name).audit_log_reason(reason);

        if let Some(bytes) = avatar {
            builder = builder.avatar(&CreateAttachment::bytes(bytes, "avatar.png"));
        }

        Ok(channel.create_webhook(self.ctx, builder).await?)
    }

    async fn execute_webhook(
        &self,
        webhook: &Webhook,
        content: &str,
        username: &str,
        avatar_url: &str,
    ) -> Result<(), PlatformError> {
        webhook
            .execute(
                self.ctx,
                true,
                ExecuteWebhook::new()
                    .content(content)
                    .username(username)
                    .avatar_url(avatar_url),
            )
            .await?;
        Ok(())
    }

    async fn delete_webhook(&self, webhook: Webhook) -> Result<(), PlatformError> {
        Ok(webhook.delete(&self.ctx.http).await?)
    }
}


#[cfg(test)]
mod tests {
    use serenity::{
        http::{ErrorResponse, HttpError},
        model::{ModelError, Permissions},
    };

    use super::{member_or_none, PlatformError};

    async fn unsuccessful(status: u16, body: &'static str) -> serenity::Error {
        let res = http::Response::builder().status(status).body(body).unwrap();
        let res = ErrorResponse::from_response(res.into(), reqwest::Method::POST).await;

        serenity::Error::Http(HttpError::UnsuccessfulRequest(res))
    }

    #[tokio::test]
    async fn test_classify_forbidden_status() {
        let err = unsuccessful(403, r#"{"code": 50013, "message": "Missing Permissions"}"#).await;

        let err = PlatformError::from(err);
        assert!(matches!(err, PlatformError::Forbidden(_)), "{err:?}");
        assert!(err.to_string().contains("Missing Permissions"), "{err}");
    }

    #[tokio::test]
    async fn test_classify_other_status() {
        let err = unsuccessful(500, "oops").await;

        let err = PlatformError::from(err);
        assert!(matches!(err, PlatformError::Http(_)), "{err:?}");
    }

    #[test]
    fn test_classify_invalid_permissions() {
        let err = PlatformError::from(serenity::Error::Model(ModelError::InvalidPermissions {
            required: Permissions::MANAGE_WEBHOOKS,
            present: Permissions::SEND_MESSAGES,
        }));

        assert!(matches!(err, PlatformError::Forbidden(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_unknown_member_is_none() {
        let err = unsuccessful(404, r#"{"code": 10007, "message": "Unknown Member"}"#).await;

        assert!(matches!(member_or_none(Err(err)), Ok(None)));
    }

    #[tokio::test]
    async fn test_member_lookup_failure() {
        let err = unsuccessful(403, r#"{"code": 50001, "message": "Missing Access"}"#).await;

        assert!(matches!(
            member_or_none(Err(err)),
            Err(PlatformError::Forbidden(_))
        ));
    }

    #[test]
    fn test_classify_non_http() {
        let err = PlatformError::from(serenity::Error::Other("shard went away"));

        assert!(matches!(err, PlatformError::Other(_)), "{err:?}");
        assert!(err.to_string().contains("shard went away"));
    }

    #[test]
    fn test_classify_url() {
        let err = PlatformError::from(serenity::Error::Url("not a url".into()));

        assert!(matches!(err, PlatformError::Other(_)), "{err:?}");
    }
}
