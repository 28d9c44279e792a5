use actix_web::{HttpResponse, Responder, delete, get, post, web};
use log::info;

use super::connection_error_response;
use super::models::{AppState, ConnectionKey, ConnectionsQuery, NewConnectionRequest};
use crate::wallet::Connection;

/// Stored wallet connections, optionally for one currency.
#[get("/connections/")]
pub async fn list_connections(
    state: web::Data<AppState>,
    query: web::Query<ConnectionsQuery>,
) -> impl Responder {
    let result = match &query.currency {
        Some(currency) => state.connections.get_by_currency(currency),
        None => state.connections.get_all(),
    };
    match result {
        Ok(connections) => HttpResponse::Ok().json(connections),
        Err(e) => connection_error_response(e),
    }
}

#[post("/connections/")]
pub async fn create_connection(
    state: web::Data<AppState>,
    req: web::Json<NewConnectionRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let currency = req.currency.trim();
    let pubkey = req.pubkey.trim();
    if currency.is_empty() || pubkey.is_empty() {
        return HttpResponse::BadRequest().body("currency and pubkey required");
    }

    let mut connection = Connection::new(currency, pubkey, req.salt);
    connection.uid = req.uid;
    connection.blockstamp = req.blockstamp;
    match state.connections.insert(&connection) {
        Ok(()) => {
            if connection.has_identity() {
                info!(
                    "API - new connection {} ({}) on {}",
                    connection.pubkey, connection.uid, connection.currency
                );
            } else {
                info!("API - new connection {} on {}", connection.pubkey, connection.currency);
            }
            HttpResponse::Created().json(connection)
        }
        Err(e) => connection_error_response(e),
    }
}

#[delete("/connections/")]
pub async fn delete_connection(
    state: web::Data<AppState>,
    req: web::Json<ConnectionKey>,
) -> impl Responder {
    let req = req.into_inner();
    let connection = Connection::new(req.currency, req.pubkey, req.salt);
    match state.connections.remove(&connection) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => HttpResponse::NotFound().body("unknown connection"),
        Err(e) => connection_error_response(e),
    }
}
