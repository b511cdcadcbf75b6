use poise::serenity_prelude::{self as serenity, GatewayIntents, Http, UserId};
use std::sync::Arc;
use tracing::{error, info};
use wordwarden::config::{self, BotConfig};
use wordwarden::handlers::Handler;
use wordwarden::{BOT_NAME, Data, Error, GuildSettingsStore, commands, logging};

/// The id automated actions are attributed to
async fn system_actor(config: &BotConfig, http: &Http) -> Result<UserId, Error> {
    if let Some(id) = config.client_id {
        return Ok(UserId::new(id));
    }
    Ok(http.get_current_user().await?.id)
}

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let lookup = |key: &str| std::env::var(key).ok();
    let config = BotConfig::load(config::CONFIG_FILE).await?.with_env(lookup)?;
    let token = config::discord_token(lookup)?;

    let http = Arc::new(Http::new(&token));
    let actor = system_actor(&config, &http).await?;
    let settings = Arc::new(GuildSettingsStore::load(config.settings_file.clone()).await);

    let data = Data::build(config, Arc::clone(&http), actor, Arc::clone(&settings))?;
    let sweeper = data.locks.spawn_sweeper(data.config.lock_sweep_interval());
    let reversals = data
        .moderation
        .start_reversal_task(data.config.reversal_check_interval());

    let framework_data = data.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::ban(), commands::filterword()],
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console(format!("Registering {BOT_NAME} commands"));
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(framework_data)
            })
        })
        .build();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&token, intents)
        .event_handler(Handler { data: data.clone() })
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting {BOT_NAME}...");
    if let Err(err) = client.start().await {
        error!("Client stopped with error: {err}");
    }

    reversals.shutdown().await;
    sweeper.abort();
    settings.save().await?;
    info!(metrics = ?data.metrics.snapshot(), "Shut down cleanly");
    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error building runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
