mod blockchains;
mod connections;
mod health;
pub mod models;

use actix_web::HttpResponse;
use actix_web::web::{self, ServiceConfig};
use log::error;

use crate::processor::SyncError;
use crate::store::StoreError;

pub use models::AppState;
use models::ErrorResponse;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(blockchains::list_blockchains)
            .service(blockchains::get_blockchain)
            .service(blockchains::reset_blockchain)
            .service(blockchains::get_money)
            .service(blockchains::get_status)
            .service(blockchains::sync_blockchain)
            .service(blockchains::get_new_blocks)
            .service(blockchains::get_blocks)
            .service(connections::list_connections)
            .service(connections::create_connection)
            .service(connections::delete_connection),
    );
}

fn error_body(e: &impl ToString) -> ErrorResponse {
    ErrorResponse {
        error: e.to_string(),
    }
}

/// HTTP answer for a failed processor operation.
fn sync_error_response(e: SyncError) -> HttpResponse {
    match &e {
        SyncError::NotInitialized(_) => HttpResponse::NotFound().json(error_body(&e)),
        SyncError::AlreadyInitialized(_) => HttpResponse::Conflict().json(error_body(&e)),
        SyncError::InvalidRange { .. } => HttpResponse::BadRequest().json(error_body(&e)),
        SyncError::Store(_) => store_error_response(&e),
        _ if e.is_retryable() => HttpResponse::ServiceUnavailable().json(error_body(&e)),
        _ => HttpResponse::BadGateway().json(error_body(&e)),
    }
}

fn store_error_response(e: &impl ToString) -> HttpResponse {
    let message = e.to_string();
    error!("API - store failure: {message}");
    HttpResponse::InternalServerError().json(ErrorResponse { error: message })
}

fn connection_error_response(e: StoreError) -> HttpResponse {
    match e {
        StoreError::AlreadyExists(_) => HttpResponse::Conflict().json(error_body(&e)),
        other => store_error_response(&other),
    }
}

#[cfg(test)]
mod tests;
