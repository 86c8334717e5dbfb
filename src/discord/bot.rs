use crate::discord::bot_state::BotState;
use crate::discord::handlers;
use crate::discord::{
    ADD_SEEDS_CMD, CALC_SCORES_CMD, CLOSE_TOURNAMENT_CMD, CREATE_TOURNAMENT_CMD, DONE_CMD,
    EXTEND_TIMEOUT_CMD, NEW_RACE_CMD, PERMISSIONS_CMD, REATTEMPT_CMD, RECORD_LIVE_CMD, REVIEW_CMD,
    SUBMIT_VOD_CMD, UPDATE_RUN_CMD, WHITELIST_CMD,
};
use crate::shutdown::Shutdown;
use async_tourney_bot::config::CONFIG;
use async_tourney_bot::db::get_diesel_pool;
use log::{info, warn};
use std::sync::Arc;
use tokio_stream::StreamExt;
use twilight_cache_inmemory::InMemoryCache;
use twilight_gateway::{
    stream::{self, ShardEventStream},
    Config as GatewayConfig, Event, Intents,
};
use twilight_http::Client;
use twilight_model::application::command::{Command, CommandType};
use twilight_util::builder::command::{
    BooleanBuilder, CommandBuilder, IntegerBuilder, StringBuilder, UserBuilder,
};

pub async fn launch(shutdown: tokio::sync::broadcast::Receiver<Shutdown>) -> Arc<BotState> {
    let http = Arc::new(Client::new(CONFIG.discord_token.clone()));
    let cache = InMemoryCache::builder().build();
    let pool = get_diesel_pool().await;
    let state = Arc::new(BotState::new(
        cache,
        http,
        CONFIG.discord_application_id,
        pool,
    ));
    tokio::spawn(run_bot(state.clone(), shutdown));
    state
}

async fn run_bot(state: Arc<BotState>, mut shutdown: tokio::sync::broadcast::Receiver<Shutdown>) {
    let intents = Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::GUILD_MEMBERS;
    let cfg = GatewayConfig::builder(CONFIG.discord_token.clone(), intents).build();

    let mut shards = match stream::create_recommended(&state.discord_client, cfg, |_, builder| {
        builder.build()
    })
    .await
    {
        Ok(shards) => shards.collect::<Vec<_>>(),
        Err(e) => {
            warn!("Unable to start gateway shards: {e}");
            return;
        }
    };
    let mut events = ShardEventStream::new(shards.iter_mut());

    if let Err(e) = set_guild_commands(&state).await {
        warn!("Error setting guild commands: {e}");
    }

    loop {
        tokio::select! {
            Some((_shard_id, evt)) = events.next() => {
                match evt {
                    Ok(event) => {
                        state.cache.update(&event);
                        tokio::spawn(handle_event(event, state.clone()));
                    }
                    Err(e) => {
                        warn!("Got error receiving discord event: {e}");
                        if e.is_fatal() {
                            break;
                        }
                    }
                }
            }
            _sd = shutdown.recv() => {
                info!("Discord bot shutting down...");
                break;
            }
        }
    }
    info!("Discord bot done");
}

async fn set_guild_commands(state: &Arc<BotState>) -> Result<(), twilight_http::Error> {
    let commands = application_commands();
    state
        .interaction_client()
        .set_guild_commands(CONFIG.guild_id, &commands)
        .await?;
    Ok(())
}

fn application_commands() -> Vec<Command> {
    vec![
        CommandBuilder::new(
            NEW_RACE_CMD,
            "Start a new async run from a pool",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("pool", "Which pool to draw a seed from").required(true))
        .build(),
        CommandBuilder::new(DONE_CMD, "Finish the current race", CommandType::ChatInput).build(),
        CommandBuilder::new(
            REATTEMPT_CMD,
            "Void one of your races so you can replay its pool",
            CommandType::ChatInput,
        )
        .option(IntegerBuilder::new("race_id", "The race to void").required(true))
        .option(StringBuilder::new("reason", "Why you're voiding it"))
        .build(),
        CommandBuilder::new(
            CREATE_TOURNAMENT_CMD,
            "Create an async tournament bound to this channel",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("name", "Tournament name").required(true))
        .option(
            IntegerBuilder::new("runs_per_pool", "How many runs each player gets per pool")
                .required(true),
        )
        .option(
            IntegerBuilder::new("allowed_reattempts", "How many reattempts each player gets")
                .required(true),
        )
        .build(),
        CommandBuilder::new(
            ADD_SEEDS_CMD,
            "Generate seeds into a pool",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("pool", "Pool name").required(true))
        .option(StringBuilder::new("preset", "Generator preset").required(true))
        .option(IntegerBuilder::new("num", "How many seeds to generate"))
        .build(),
        CommandBuilder::new(
            CLOSE_TOURNAMENT_CMD,
            "Close the tournament in this channel",
            CommandType::ChatInput,
        )
        .build(),
        CommandBuilder::new(
            EXTEND_TIMEOUT_CMD,
            "Extend the start deadline of this thread's run",
            CommandType::ChatInput,
        )
        .option(IntegerBuilder::new("minutes", "Minutes to add").required(true))
        .build(),
        CommandBuilder::new(
            SUBMIT_VOD_CMD,
            "Submit the VOD for this thread's run",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("vod_url", "Link to your VOD").required(true))
        .option(StringBuilder::new("notes", "Anything the reviewers should know"))
        .build(),
        CommandBuilder::new(
            REVIEW_CMD,
            "Accept or reject a finished run",
            CommandType::ChatInput,
        )
        .option(IntegerBuilder::new("race_id", "The race to review").required(true))
        .option(StringBuilder::new("status", "accepted or rejected").required(true))
        .option(StringBuilder::new("notes", "Reviewer notes"))
        .build(),
        CommandBuilder::new(
            UPDATE_RUN_CMD,
            "Fix a run that was recorded incorrectly",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new(
            "status",
            "New status (finished/forfeit/disqualified)",
        ))
        .option(StringBuilder::new("elapsed_time", "Elapsed time as H:MM:SS"))
        .option(StringBuilder::new("vod_url", "VOD URL"))
        .build(),
        CommandBuilder::new(
            PERMISSIONS_CMD,
            "Grant tournament admin or mod permissions",
            CommandType::ChatInput,
        )
        .option(UserBuilder::new("user", "Who to grant").required(true))
        .option(StringBuilder::new("role", "admin or mod").required(true))
        .build(),
        CommandBuilder::new(
            WHITELIST_CMD,
            "Exempt a user from the account age gate",
            CommandType::ChatInput,
        )
        .option(UserBuilder::new("user", "Who to whitelist").required(true))
        .build(),
        CommandBuilder::new(
            RECORD_LIVE_CMD,
            "Record the results of a live qualifier race",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("racetime_slug", "Race room slug").required(true))
        .option(BooleanBuilder::new(
            "force",
            "Record even if the live race isn't marked in progress",
        ))
        .build(),
        CommandBuilder::new(
            CALC_SCORES_CMD,
            "Recalculate the scores for this tournament",
            CommandType::ChatInput,
        )
        .option(BooleanBuilder::new(
            "only_approved",
            "Restrict scoring to runs that passed review",
        ))
        .build(),
    ]
}

async fn handle_event(event: Event, state: Arc<BotState>) {
    match event {
        Event::InteractionCreate(ic) => {
            handlers::handle_interaction(ic, &state).await;
        }
        Event::Ready(_) => {
            info!("Bot connected and ready");
        }
        _ => {}
    }
}
