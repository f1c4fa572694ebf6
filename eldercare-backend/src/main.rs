use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod config;
mod controllers;
mod db;
mod gateway;
mod matching;
mod middleware;
mod models;
mod proximity;
mod relay;

use config::Config;
use db::Database;
use gateway::Gateway;
use relay::{RelayConsumer, SqliteRelayLog, CHAT_TOPIC};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub gateway: Arc<Gateway>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Arc::new(Database::new(&config.database_url).map_err(std::io::Error::other)?);

    match db.purge_expired_sessions() {
        Ok(0) => {}
        Ok(n) => log::info!("Purged {} expired sessions", n),
        Err(e) => log::warn!("Could not purge expired sessions: {}", e),
    }

    let shutdown = CancellationToken::new();
    let relay_log = Arc::new(SqliteRelayLog::new(db.clone(), CHAT_TOPIC));

    log::info!("Starting chat fan-out loop");
    let (gateway, fanout_task) = Gateway::start(
        &db,
        relay_log.clone(),
        config.chat_outbound_buffer,
        shutdown.clone(),
    )
    .map_err(std::io::Error::other)?;
    let gateway = Arc::new(gateway);

    log::info!("Starting relay consumer on topic {}", CHAT_TOPIC);
    let consumer = RelayConsumer::new(
        relay_log,
        db.clone(),
        config.relay_retry_policy(),
        config.relay_poll_interval(),
    )
    .with_retention(config.relay_retention());
    let consumer_task = tokio::spawn(consumer.run(shutdown.clone()));

    log::info!("Starting eldercare backend on port {}", port);
    log::info!("Chat WebSocket available at /api/chat/ws");

    let server_config = config.clone();
    let server_db = db.clone();
    let server_gateway = gateway.clone();

    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&server_db),
                config: server_config.clone(),
                gateway: Arc::clone(&server_gateway),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::auth::config)
            .configure(controllers::accounts::config)
            .configure(controllers::tasks::config)
            .configure(controllers::sos::config)
            .configure(controllers::location::config)
            .configure(controllers::chat::config)
            .configure(controllers::evaluation::config)
            .configure(controllers::relay::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    // HTTP is down: stop the background loops and wait for them
    log::info!("Shutting down background tasks");
    shutdown.cancel();
    if let Err(e) = fanout_task.await {
        log::error!("Fan-out loop ended abnormally: {}", e);
    }
    if let Err(e) = consumer_task.await {
        log::error!("Relay consumer ended abnormally: {}", e);
    }

    result
}
