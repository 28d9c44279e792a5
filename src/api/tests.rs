use actix_web::{App, http::StatusCode, test, web};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{AppState, init_routes};
use crate::connector::{ConnectorError, Request};
use crate::processor::BlockchainProcessor;
use crate::store::Database;
use crate::testing::{BlockFixture, ScriptedConnector, TEST_CURRENCY};

fn state(connector: ScriptedConnector) -> web::Data<AppState> {
    shared_state(Arc::new(connector))
}

fn shared_state(connector: Arc<ScriptedConnector>) -> web::Data<AppState> {
    let db = Database::temporary();
    let processor = BlockchainProcessor::new(db.blockchains().unwrap(), connector);
    web::Data::new(AppState {
        processor: Arc::new(processor),
        connections: db.connections().unwrap(),
        currencies: vec![TEST_CURRENCY.to_string()],
    })
}

fn chain_at(number: u64) -> ScriptedConnector {
    ScriptedConnector::new()
        .current(&BlockFixture::new(number).members(3))
        .fail(Request::Parameters, crate::testing::no_current_block())
        .heights(Request::Ud, &[])
}

#[actix_web::test]
async fn health_is_served_under_the_api_scope() {
    let app = test::init_service(App::new().configure(init_routes)).await;
    let req = test::TestRequest::get().uri("/api/v1/health/").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn unknown_currency_is_not_found_until_synced() {
    let app = test::init_service(App::new().app_data(state(chain_at(12))).configure(init_routes)).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/status/"))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["state"], "uninitialized");
    assert_eq!(status["current_buid"], Value::Null);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/sync/"))
        .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["blocks_folded"], 0);
    assert!(report["current_buid"].as_str().unwrap().starts_with("12-"));

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/"))
        .to_request();
    let blockchain: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(blockchain["currency"], TEST_CURRENCY);
    assert_eq!(blockchain["nb_members"], 0);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/money/"))
        .to_request();
    let money: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(money["monetary_mass"], 0);
    assert_eq!(money["last_ud"], 0);

    let req = test::TestRequest::get().uri("/api/v1/blockchains/").to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["currencies"][0]["state"], "synced");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unreachable_nodes_answer_service_unavailable() {
    let connector = ScriptedConnector::new().fail(
        Request::Current,
        ConnectorError::EndpointUnavailable {
            currency: TEST_CURRENCY.into(),
        },
    );
    let app = test::init_service(App::new().app_data(state(connector)).configure(init_routes)).await;
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/sync/"))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[actix_web::test]
async fn new_blocks_lists_both_kinds_past_cursor() {
    let connector = Arc::new(chain_at(12));
    let data = shared_state(connector.clone());
    let app = test::init_service(App::new().app_data(data.clone()).configure(init_routes)).await;
    data.processor
        .initialize(TEST_CURRENCY, &|_: &str| {})
        .await
        .unwrap();

    connector.set_heights(Request::Ud, &[10, 20]);
    connector.set_heights(Request::Tx, &[13]);
    connector.set_heights(Request::Joiners, &[14]);
    connector.set_heights(Request::Leavers, &[]);
    connector.set_heights(Request::Actives, &[]);
    connector.set_heights(Request::Excluded, &[]);
    connector.set_heights(Request::Newcomers, &[12]);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/new-blocks/"))
        .to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["identities"], json!([14]));
    assert_eq!(resp["money"], json!([13, 20]));
    assert!(resp["cursor"].as_str().unwrap().starts_with("12-"));
}

#[actix_web::test]
async fn blocks_are_served_as_parsed_documents() {
    let connector = ScriptedConnector::new()
        .block(&BlockFixture::new(4).members(2))
        .block(&BlockFixture::new(6).dividend(100, 0));
    let app = test::init_service(App::new().app_data(state(connector)).configure(init_routes)).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/blocks/?numbers=6,4"))
        .to_request();
    let blocks: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(blocks[0]["number"], 4);
    assert_eq!(blocks[0]["members_count"], 2);
    assert_eq!(blocks[1]["dividend"], 100);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/blocks/?numbers=4,5"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_GATEWAY);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/blockchains/{TEST_CURRENCY}/blocks/?numbers=four"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn oversized_block_range_is_a_bad_request() {
    let connector = Arc::new(ScriptedConnector::new());
    let app = test::init_service(
        App::new()
            .app_data(shared_state(connector.clone()))
            .configure(init_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/blockchains/{TEST_CURRENCY}/blocks/?numbers=0,18446744073709551615"
        ))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(connector.call_count(), 0);
}

#[actix_web::test]
async fn connections_are_created_once_and_listed() {
    let app = test::init_service(
        App::new()
            .app_data(state(ScriptedConnector::new()))
            .configure(init_routes),
    )
    .await;

    let body = json!({"currency": "g1", "pubkey": "ALICE", "salt": "s", "uid": "alice"});
    let req = test::TestRequest::post()
        .uri("/api/v1/connections/")
        .set_json(&body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/")
        .set_json(&body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/v1/connections/")
        .set_json(json!({"currency": "", "pubkey": "BOB", "salt": "s"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/v1/connections/?currency=g1")
        .to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["uid"], "alice");
    assert!(list[0].get("password").is_none());

    let req = test::TestRequest::get()
        .uri("/api/v1/connections/?currency=g1-test")
        .to_request();
    let list: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list, json!([]));

    let key = json!({"currency": "g1", "pubkey": "ALICE", "salt": "s"});
    let req = test::TestRequest::delete()
        .uri("/api/v1/connections/")
        .set_json(&key)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    let req = test::TestRequest::delete()
        .uri("/api/v1/connections/")
        .set_json(&key)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
