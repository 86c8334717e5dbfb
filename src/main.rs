use async_tourney_bot::constants::LOG4RS_CONF_FILE_VAR;
use async_tourney_bot::db::{raw_diesel_cxn_from_env, run_migrations};
use log::info;
use shutdown::Shutdown;

mod discord;
mod shutdown;
mod web;
mod workers;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let log4rs_conf =
        std::env::var(LOG4RS_CONF_FILE_VAR).unwrap_or_else(|_| "log4rs.yaml".to_string());
    log4rs::init_file(&log4rs_conf, Default::default()).expect("Unable to initialize logging");

    {
        let mut conn = raw_diesel_cxn_from_env().expect("Unable to open database");
        run_migrations(&mut conn).expect("Unable to run migrations");
    }

    let (shutdown_send, _) = tokio::sync::broadcast::channel::<Shutdown>(1);
    let state = discord::bot::launch(shutdown_send.subscribe()).await;
    tokio::spawn(workers::pending_timeout_worker::cron(
        shutdown_send.subscribe(),
        state.clone(),
    ));
    tokio::spawn(workers::in_progress_timeout_worker::cron(
        shutdown_send.subscribe(),
        state.clone(),
    ));
    tokio::spawn(workers::score_worker::cron(
        shutdown_send.subscribe(),
        state.clone(),
    ));
    tokio::spawn(web::launch(state.diesel_pool(), shutdown_send.subscribe()));

    tokio::signal::ctrl_c().await.ok();
    let (shutdown_signal_send, mut shutdown_signal_recv) = tokio::sync::mpsc::channel(1);
    // send a copy of an mpsc sender to each watcher of the shutdown channel...
    shutdown_send
        .send(Shutdown {
            _handle: shutdown_signal_send.clone(),
        })
        .ok();

    drop(shutdown_signal_send);
    shutdown_signal_recv.recv().await;
    info!("Shutting down gracefully");
}
