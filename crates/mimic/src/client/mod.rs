use serenity::{model::gateway::GatewayIntents, Client};

use crate::{prelude::*, util::DebugShim};

mod commands;
mod completion;
mod handler;
mod platform;
mod registry;

#[derive(Debug, clap::Args)]
pub struct ClientOpts {
    /// The Discord API token to use
    #[arg(long, env)]
    discord_token: DebugShim<String>,

    #[command(flatten)]
    commands: commands::CommandOpts,
}

pub async fn build(opts: ClientOpts) -> Result<Client> {
    let ClientOpts {
        discord_token,
        commands,
    } = opts;

    // Member lookups and autocomplete read the guild member cache
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;
    let handler = handler::Handler::new_rc(&commands);

    Client::builder(discord_token.0, intents)
        .event_handler_arc(handler)
        .await
        .context("Error constructing Serenity client")
}
