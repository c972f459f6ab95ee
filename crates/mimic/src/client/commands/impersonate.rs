use std::panic::AssertUnwindSafe;

use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    client::Context,
    model::{
        application::{CommandInteraction, CommandOptionType},
        channel::ChannelType,
        id::{ChannelId, GuildId, UserId},
    },
};

use super::CommandHandler;
use crate::{
    client::{
        completion::Completion,
        platform::{Platform, PlatformError, Roster, SerenityPlatform},
    },
    prelude::*,
    util::avatar::{AvatarFetch, HttpAvatarFetcher},
};

const NAME: &str = "impersonate";
const TARGET: &str = "target";
const MESSAGE: &str = "message";

#[derive(Debug, thiserror::Error)]
enum ImpersonateError {
    #[error("Command used outside a guild")]
    GuildRequired,
    #[error("Target {0:?} is not a user ID")]
    InvalidTarget(String),
    #[error("User {0} is not a member of this guild")]
    MemberNotFound(UserId),
    #[error("Channel is not a text channel (kind: {0:?})")]
    TextChannelRequired(Option<ChannelType>),
    #[error("Missing webhook permissions: {0}")]
    Forbidden(String),
    #[error("Discord API error: {0}")]
    Http(String),
    #[error("Unexpected error: {0:?}")]
    Other(anyhow::Error),
}

impl From<PlatformError> for ImpersonateError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Forbidden(m) => Self::Forbidden(m),
            PlatformError::Http(m) => Self::Http(m),
            PlatformError::Other(e) => Self::Other(e),
        }
    }
}

impl ImpersonateError {
    fn user_message(&self) -> &'static str {
        match self {
            Self::GuildRequired => "This command can only be used within a server.",
            Self::InvalidTarget(_) => "Invalid user selection.",
            Self::MemberNotFound(_) => "User not found.",
            Self::TextChannelRequired(_) => "This command can only be used in text channels.",
            Self::Forbidden(_) => "I don't have permission to manage webhooks in this channel.",
            Self::Http(_) => "An error occurred while sending the message.",
            Self::Other(_) => "An unexpected error occurred.",
        }
    }

    fn log(&self) {
        match self {
            Self::GuildRequired
            | Self::InvalidTarget(_)
            | Self::MemberNotFound(_)
            | Self::TextChannelRequired(_) => info!(err = %self, "Rejecting impersonation"),
            Self::Forbidden(_) => warn!(err = %self, "Impersonation blocked by permissions"),
            Self::Http(_) => error!(err = %self, "Discord API error during impersonation"),
            Self::Other(err) => error!(?err, "Unexpected error during impersonation"),
        }
    }
}

/// The parsed arguments of one invocation
#[derive(Debug)]
struct Request {
    guild: Option<GuildId>,
    channel: ChannelId,
    invoker: String,
    target: String,
    message: String,
}

impl Request {
    fn from_interaction(aci: &CommandInteraction) -> Result<Self> {
        let string_opt = |name: &str| {
            aci.data
                .options
                .iter()
                .find(|o| o.name == name)
                .and_then(|o| o.value.as_str())
                .map(ToOwned::to_owned)
                .ok_or_else(|| anyhow!("Missing string option {name:?}"))
        };

        Ok(Self {
            guild: aci.guild_id,
            channel: aci.channel_id,
            invoker: aci.user.tag(),
            target: string_opt(TARGET)?,
            message: string_opt(MESSAGE)?,
        })
    }
}

fn parse_target(target: &str) -> Result<UserId, ImpersonateError> {
    target
        .trim()
        .parse::<NonZeroU64>()
        .map(|id| UserId::new(id.get()))
        .map_err(|_| ImpersonateError::InvalidTarget(target.into()))
}

fn is_text(kind: Option<ChannelType>) -> bool {
    matches!(kind, Some(ChannelType::Text | ChannelType::News))
}

/// Validate the request and post the message, returning the display name the
/// message was posted under
async fn post_as<P: Platform, F: AvatarFetch + ?Sized>(
    platform: &P,
    fetcher: &F,
    req: &Request,
) -> Result<String, ImpersonateError> {
    let guild = req.guild.ok_or(ImpersonateError::GuildRequired)?;
    let id = parse_target(&req.target)?;
    let target = platform
        .member(guild, id)
        .await?
        .ok_or(ImpersonateError::MemberNotFound(id))?;

    let kind = platform.channel_kind(req.channel).await?;
    if !is_text(kind) {
        return Err(ImpersonateError::TextChannelRequired(kind));
    }

    // Failed or empty fetches leave the webhook without an icon
    let avatar = fetcher
        .fetch(&target.avatar_url)
        .await
        .ok()
        .filter(|b| !b.is_empty());

    debug!(
        member = %target.id,
        has_avatar = avatar.is_some(),
        "Creating temporary webhook"
    );
    let webhook = platform
        .create_webhook(
            req.channel,
            &target.display_name,
            avatar,
            &format!("Impersonation by {}", req.invoker),
        )
        .await?;

    let sent = platform
        .execute_webhook(
            &webhook,
            &req.message,
            &target.display_name,
            &target.avatar_url,
        )
        .await;
    let deleted = platform.delete_webhook(webhook).await;

    if let Err(ref err) = deleted {
        error!(%err, channel = %req.channel, "Failed to delete temporary webhook");
    }

    sent?;
    deleted?;

    Ok(target.display_name)
}

/// Run one invocation to completion, always ending in exactly one private
/// reply unless the interaction could not be acknowledged at all
///
/// The request is only inspected after the interaction is deferred, so a
/// malformed request still gets a reply.
async fn impersonate<P: Platform, F: AvatarFetch + ?Sized>(
    platform: &P,
    fetcher: &F,
    req: Result<Request>,
) {
    if let Err(err) = platform.defer().await {
        error!(%err, "Error deferring interaction");
        return;
    }

    let res = match req {
        Ok(ref req) => AssertUnwindSafe(post_as(platform, fetcher, req))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ImpersonateError::Other(anyhow!(
                    "Panicked while handling impersonation"
                )))
            }),
        Err(e) => Err(ImpersonateError::Other(e.context("Malformed impersonation request"))),
    };

    let msg = match res {
        Ok(name) => {
            info!(%name, "Impersonation message sent");
            Cow::Owned(format!("Message sent as {name}."))
        },
        Err(err) => {
            err.log();
            Cow::Borrowed(err.user_message())
        },
    };

    if let Err(err) = platform.reply(&msg).await {
        error!(%err, "Error sending impersonation result");
    }
}

#[derive(Debug)]
pub struct ImpersonateCommand {
    fetcher: HttpAvatarFetcher,
}

impl ImpersonateCommand {
    pub fn new(avatar_timeout: Duration) -> Self {
        Self {
            fetcher: HttpAvatarFetcher::new(avatar_timeout),
        }
    }
}

#[async_trait]
impl CommandHandler for ImpersonateCommand {
    fn name(&self) -> &'static str { NAME }

    fn register(&self) -> CreateCommand {
        CreateCommand::new(NAME)
            .description("Send a message as another user.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    TARGET,
                    "The user you want to impersonate.",
                )
                .required(true)
                .set_autocomplete(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    MESSAGE,
                    "The message you want to send as the specified user.",
                )
                .required(true),
            )
    }

    async fn complete(&self, ctx: &Context, aci: &CommandInteraction) -> Result<Vec<Completion>> {
        let Some(guild) = aci.guild_id else {
            return Ok(vec![]);
        };

        let prefix = aci
            .data
            .autocomplete()
            .filter(|o| o.name == TARGET)
            .map_or("", |o| o.value);

        Ok(SerenityPlatform::new(ctx, aci).suggest(guild, prefix))
    }

    async fn respond(&self, ctx: &Context, aci: &CommandInteraction) -> Result {
        impersonate(
            &SerenityPlatform::new(ctx, aci),
            &self.fetcher,
            Request::from_interaction(aci),
        )
        .await;

        Ok(())
    }
}
