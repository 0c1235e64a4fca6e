use anyhow::Context as _;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bot::{Data, Error, commands_fingerprint, get_commands};
use crate::data::kv;
use crate::services::Service;
use crate::state::{AppState, ServiceStatus, ServiceStatusRegistry};

pub struct BotService {
    client: serenity::Client,
    statuses: ServiceStatusRegistry,
}

impl BotService {
    pub fn new(client: serenity::Client, statuses: ServiceStatusRegistry) -> Self {
        Self { client, statuses }
    }

    pub async fn create_client(token: &str, app_state: AppState) -> Result<serenity::Client, anyhow::Error> {
        let intents = serenity::GatewayIntents::non_privileged();

        let framework = poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: get_commands(),
                on_error: |error| Box::pin(on_error(error)),
                pre_command: |ctx| {
                    Box::pin(async move {
                        debug!(command = %ctx.command().qualified_name, user = %ctx.author().name, "Command invoked");
                    })
                },
                ..Default::default()
            })
            .setup(move |ctx, ready, framework| {
                Box::pin(async move {
                    info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord bot connected");
                    register_commands(ctx, &framework.options().commands, &app_state).await?;
                    app_state
                        .service_statuses
                        .set("bot", ServiceStatus::Connected);
                    Ok(Data { app_state })
                })
            })
            .build();

        serenity::ClientBuilder::new(token, intents)
            .framework(framework)
            .await
            .context("Failed to build Discord client")
    }
}

/// Register slash commands globally, skipping the call when the command set is unchanged.
async fn register_commands(
    ctx: &serenity::Context,
    commands: &[poise::Command<Data, Error>],
    app_state: &AppState,
) -> Result<(), Error> {
    let fingerprint = commands_fingerprint(commands);

    if let Some(pool) = &app_state.db_pool {
        match kv::get(pool, kv::COMMANDS_FINGERPRINT).await {
            Ok(Some(stored)) if stored == fingerprint => {
                debug!("Command definitions unchanged, skipping registration");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!(error = ?e, "Failed to read command fingerprint"),
        }
    }

    poise::builtins::register_globally(ctx, commands).await?;
    info!(count = commands.len(), "Registered slash commands");

    if let Some(pool) = &app_state.db_pool
        && let Err(e) = kv::set(pool, kv::COMMANDS_FINGERPRINT, &fingerprint).await
    {
        warn!(error = ?e, "Failed to persist command fingerprint");
    }
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(command = %ctx.command().qualified_name, error = ?error, "Command failed");
            if let Err(e) = ctx.say("Something went wrong handling that command.").await {
                warn!(error = ?e, "Failed to send error reply");
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!(error = ?e, "Error while handling framework error");
            }
        }
    }
}

#[async_trait]
impl Service for BotService {
    fn name(&self) -> &'static str {
        "bot"
    }

    async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
        let shard_manager = self.client.shard_manager.clone();

        tokio::select! {
            result = self.client.start() => {
                self.statuses.set("bot", ServiceStatus::Error);
                result.context("Discord client stopped")
            }
            _ = shutdown_rx.recv() => {
                info!("Bot received shutdown signal");
                shard_manager.shutdown_all().await;
                Ok(())
            }
        }
    }
}
