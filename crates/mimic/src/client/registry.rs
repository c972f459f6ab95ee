use serenity::{
    builder::{
        CreateAutocompleteResponse, CreateInteractionResponse, CreateInteractionResponseMessage,
    },
    client::Context,
    model::application::{Command, CommandInteraction},
};

use super::commands::CommandHandler;
use crate::prelude::*;

#[inline]
fn issuer(aci: &CommandInteraction) -> String {
    let src = if aci.guild_id.is_some() {
        "in guild"
    } else {
        "in DM"
    };

    format!("@{} {src}", aci.user.tag())
}

type Handler = Arc<dyn CommandHandler>;

/// Dispatch table from command names to their handlers, fixed at startup
#[derive(Debug)]
pub struct Registry {
    list: Vec<Handler>,
    map: HashMap<&'static str, Handler>,
}

impl Registry {
    pub fn new(list: Vec<Handler>) -> Self {
        let mut map = HashMap::new();

        for cmd in &list {
            let prev = map.insert(cmd.name(), Arc::clone(cmd));
            assert!(prev.is_none(), "Duplicate command {:?}", cmd.name());
        }

        Self { list, map }
    }

    /// Overwrite the bot's global commands with the contents of this registry
    #[instrument(level = "debug", skip_all)]
    pub async fn sync(&self, ctx: &Context) -> Result<usize> {
        let builders = self.list.iter().map(|c| c.register()).collect();

        let synced = Command::set_global_commands(&ctx.http, builders)
            .await
            .context("Error overwriting global commands")?;

        for cmd in &synced {
            debug!(name = %cmd.name, id = %cmd.id, "Registered command");
        }

        Ok(synced.len())
    }

    #[instrument(
        level = "error",
        name = "handle_command",
        err,
        skip(self, ctx, aci),
        fields(
            name = %aci.data.name,
            id = %aci.id,
            issuer = %issuer(&aci),
        ),
    )]
    async fn try_handle_command(&self, ctx: &Context, aci: CommandInteraction) -> Result {
        trace!("Handling application command");

        let Some(handler) = self.map.get(aci.data.name.as_str()) else {
            warn!("Rejecting unknown command");

            return aci
                .create_response(
                    ctx,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("Unknown command - this may be a bug.")
                            .ephemeral(true),
                    ),
                )
                .await
                .context("Error rejecting unknown command");
        };

        debug!(?handler, "Handling command");

        handler.respond(ctx, &aci).await
    }

    #[instrument(
        level = "error",
        name = "handle_autocomplete",
        err,
        skip(self, ctx, ac),
        fields(
            name = %ac.data.name,
            id = %ac.id,
            issuer = %issuer(&ac),
        ),
    )]
    async fn try_handle_autocomplete(&self, ctx: &Context, ac: CommandInteraction) -> Result {
        trace!("Handling command autocomplete");

        let choices = match self.map.get(ac.data.name.as_str()) {
            Some(handler) => handler.complete(ctx, &ac).await?,
            None => {
                warn!("Autocomplete requested for unknown command");
                vec![]
            },
        };

        let res = choices
            .into_iter()
            .fold(CreateAutocompleteResponse::new(), |b, c| {
                b.add_string_choice(c.name, c.value)
            });

        ac.create_response(ctx, CreateInteractionResponse::Autocomplete(res))
            .await
            .context("Error sending autocomplete response")
    }

    #[inline]
    pub async fn handle_command(&self, ctx: &Context, aci: CommandInteraction) {
        self.try_handle_command(ctx, aci).await.ok();
    }

    #[inline]
    pub async fn handle_autocomplete(&self, ctx: &Context, ac: CommandInteraction) {
        self.try_handle_autocomplete(ctx, ac).await.ok();
    }
}

#[cfg(test)]
mod tests {
    use serenity::{builder::CreateCommand, client::Context, model::application::CommandInteraction};

    use super::Registry;
    use crate::{client::commands::CommandHandler, prelude::*};

    #[derive(Debug)]
    struct Dummy(&'static str);

    #[async_trait]
    impl CommandHandler for Dummy {
        fn name(&self) -> &'static str { self.0 }

        fn register(&self) -> CreateCommand { CreateCommand::new(self.0).description("dummy") }

        async fn respond(&self, _: &Context, _: &CommandInteraction) -> Result { Ok(()) }
    }

    #[test]
    fn test_dispatch_by_name() {
        let reg = Registry::new(vec![Arc::new(Dummy("a")), Arc::new(Dummy("b"))]);

        assert_eq!(reg.map.get("a").map(|h| h.name()), Some("a"));
        assert_eq!(reg.map.get("b").map(|h| h.name()), Some("b"));
        assert!(reg.map.get("c").is_none());
    }

    #[test]
    #[should_panic(expected = "Duplicate command")]
    fn test_duplicate_names() { Registry::new(vec![Arc::new(Dummy("a")), Arc::new(Dummy("a"))]); }
}
