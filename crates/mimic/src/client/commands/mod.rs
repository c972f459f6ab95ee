use serenity::{builder::CreateCommand, client::Context, model::application::CommandInteraction};

use super::completion::Completion;
use crate::prelude::*;

mod impersonate;

#[derive(Debug, clap::Args)]
pub struct CommandOpts {
    /// Timeout in seconds for downloading avatars
    #[arg(long, env, default_value_t = 10)]
    avatar_timeout: u64,
}

/// A handler for a command interaction and its associated autocomplete
/// interactions
#[async_trait]
pub trait CommandHandler: fmt::Debug + Send + Sync {
    /// The name this command is registered and dispatched under
    fn name(&self) -> &'static str;

    /// Provide registration data for this command
    fn register(&self) -> CreateCommand;

    /// Respond to an autocomplete interaction
    ///
    /// The default behavior of this method is to return an empty list.
    #[inline]
    async fn complete(&self, ctx: &Context, aci: &CommandInteraction) -> Result<Vec<Completion>> {
        // Use the variables to give the trait args a nice name without getting
        // dead code warnings
        #[allow(let_underscore_drop)]
        let _ = (ctx, aci);
        Ok(vec![])
    }

    /// Respond to a command interaction
    async fn respond(&self, ctx: &Context, aci: &CommandInteraction) -> Result;
}

pub fn list(opts: &CommandOpts) -> Vec<Arc<dyn CommandHandler>> {
    let CommandOpts { avatar_timeout } = *opts;

    vec![Arc::new(impersonate::ImpersonateCommand::new(
        Duration::from_secs(avatar_timeout),
    ))]
}

#[cfg(test)]
mod tests {
    use super::{list, CommandOpts};

    #[test]
    fn test_list() {
        let cmds = list(&CommandOpts { avatar_timeout: 10 });
        let names: Vec<_> = cmds.iter().map(|c| c.name()).collect();

        assert_eq!(names, ["impersonate"]);
    }
}
