use actix_web::{HttpResponse, Responder, delete, get, post, web};
use log::info;
use std::collections::BTreeSet;

use super::models::{
    AppState, BlocksQuery, CurrenciesResponse, CurrencyStatus, MoneyResponse, NewBlocksResponse,
};
use super::{store_error_response, sync_error_response};
use crate::processor::SyncError;

/// Configured and stored currencies with their sync state.
#[get("/blockchains/")]
pub async fn list_blockchains(state: web::Data<AppState>) -> impl Responder {
    let stored = match state.processor.currencies() {
        Ok(currencies) => currencies,
        Err(e) => return sync_error_response(e),
    };
    let connected = match state.connections.currencies() {
        Ok(currencies) => currencies,
        Err(e) => return store_error_response(&e),
    };
    let all: BTreeSet<String> = stored
        .into_iter()
        .chain(connected)
        .chain(state.currencies.iter().cloned())
        .collect();

    let mut currencies = Vec::with_capacity(all.len());
    for currency in all {
        match status(&state, &currency) {
            Ok(status) => currencies.push(status),
            Err(e) => return sync_error_response(e),
        }
    }
    HttpResponse::Ok().json(CurrenciesResponse { currencies })
}

/// Stored snapshot of one currency.
#[get("/blockchains/{currency}/")]
pub async fn get_blockchain(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.processor.snapshot(&path) {
        Ok(blockchain) => HttpResponse::Ok().json(blockchain),
        Err(e) => sync_error_response(e),
    }
}

#[get("/blockchains/{currency}/money/")]
pub async fn get_money(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match money(&state, &path) {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => sync_error_response(e),
    }
}

/// Drop the stored snapshot; the next sync starts from scratch.
#[delete("/blockchains/{currency}/")]
pub async fn reset_blockchain(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.processor.reset(&path).await {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => sync_error_response(SyncError::NotInitialized(path.to_string())),
        Err(e) => sync_error_response(e),
    }
}

#[get("/blockchains/{currency}/status/")]
pub async fn get_status(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match status(&state, &path) {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => sync_error_response(e),
    }
}

/// Run one reconciliation unit now: initialize or refresh.
#[post("/blockchains/{currency}/sync/")]
pub async fn sync_blockchain(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let currency = path.into_inner();
    let progress = |message: &str| info!("API - sync {currency}: {message}");
    match state.processor.sync(&currency, &progress).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => sync_error_response(e),
    }
}

/// Heights past the local cursor with identity or money events.
#[get("/blockchains/{currency}/new-blocks/")]
pub async fn get_new_blocks(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let currency = path.into_inner();
    let processor = &state.processor;
    let result = async {
        let cursor = processor.current_buid(&currency)?;
        let (identities, money) = futures::try_join!(
            processor.new_blocks_with_identities(&currency),
            processor.new_blocks_with_money(&currency),
        )?;
        Ok::<_, SyncError>(NewBlocksResponse {
            cursor,
            identities,
            money,
        })
    }
    .await;
    match result {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => sync_error_response(e),
    }
}

/// Parsed block documents at the requested heights.
#[get("/blockchains/{currency}/blocks/")]
pub async fn get_blocks(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<BlocksQuery>,
) -> impl Responder {
    let numbers: Result<Vec<u64>, _> = query
        .numbers
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::parse::<u64>)
        .collect();
    let Ok(numbers) = numbers else {
        return HttpResponse::BadRequest().body("numbers must be a comma separated list of heights");
    };
    match state.processor.blocks(&numbers, &path).await {
        Ok(blocks) => HttpResponse::Ok().json(blocks),
        Err(e) => sync_error_response(e),
    }
}

fn money(state: &AppState, currency: &str) -> Result<MoneyResponse, SyncError> {
    let p = &state.processor;
    let (last_ud, last_ud_base) = p.last_ud(currency)?;
    let (previous_ud, previous_ud_base) = p.previous_ud(currency)?;
    let parameters = p.parameters(currency)?;
    Ok(MoneyResponse {
        median_time: p.time(currency)?,
        members_count: p.members_count(currency)?,
        monetary_mass: p.monetary_mass(currency)?,
        last_ud,
        last_ud_base,
        last_ud_time: p.last_ud_time(currency)?,
        previous_monetary_mass: p.previous_monetary_mass(currency)?,
        previous_members_count: p.previous_members_count(currency)?,
        previous_ud,
        previous_ud_base,
        previous_ud_time: p.previous_ud_time(currency)?,
        ud_growth: parameters.c,
    })
}

fn status(state: &AppState, currency: &str) -> Result<CurrencyStatus, SyncError> {
    let current_buid = match state.processor.current_buid(currency) {
        Ok(buid) => Some(buid),
        Err(SyncError::NotInitialized(_)) => None,
        Err(e) => return Err(e),
    };
    Ok(CurrencyStatus {
        currency: currency.to_string(),
        state: state.processor.state(currency)?,
        current_buid,
    })
}
