mod api;
mod blockchain;
mod config;
mod connector;
mod document;
mod processor;
mod store;
mod sync_loop;
mod wallet;

#[cfg(test)]
mod testing;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use std::io;
use std::sync::Arc;

use api::AppState;
use config::Config;
use connector::BmaConnector;
use processor::BlockchainProcessor;
use store::Database;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let db = Database::open(&config.data_dir).map_err(io::Error::other)?;
    let connector = BmaConnector::new(config.endpoints.clone(), config.request_timeout)
        .map_err(io::Error::other)?;
    let processor = Arc::new(BlockchainProcessor::new(
        db.blockchains().map_err(io::Error::other)?,
        Arc::new(connector),
    ));

    let currencies = config.currencies();
    actix_web::rt::spawn(sync_loop::run(
        processor.clone(),
        currencies.clone(),
        config.sync_interval,
    ));

    info!(
        "Starting wallet sync API at http://{}:{}",
        config.host, config.port
    );

    let state = web::Data::new(AppState {
        processor,
        connections: db.connections().map_err(io::Error::other)?,
        currencies,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
