use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::integration::common::setup_test_app;

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn harvest_for_unknown_target_returns_404() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(post_json("/v1/harvests", serde_json::json!({ "target_id": 99 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn harvest_is_accepted_with_callers_run_id() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(post_json(
            "/v1/harvests",
            serde_json::json!({ "target_id": 1, "run_id": "run-42" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["run_id"], "run-42");
    assert_eq!(json["target_id"], 1);
}

#[tokio::test]
async fn progress_stream_relays_messages_until_end() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(Request::get("/v1/progress/run-7").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let hub = &app.state.progress;
    hub.publish("run-7", "Page 1: 20 rows (1 pages left)");
    hub.publish("other-run", "not for this stream");
    hub.finish("run-7");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("data: Page 1: 20 rows (1 pages left)\n\n"));
    assert!(text.ends_with("data: END\n\n"));
    assert!(!text.contains("not for this stream"));
    assert!(!hub.is_open("run-7"));
}

#[tokio::test]
async fn staged_lines_in_crawl_order() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/v1/targets/1/harvest").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["lines"][0]["origin"], 1);
    assert_eq!(json["lines"][1]["output_price"], 700.0);

    let missing = app
        .router
        .oneshot(Request::get("/v1/targets/5/harvest").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lists_targets_and_sources() {
    let app = setup_test_app().await;

    let targets = app
        .router
        .clone()
        .oneshot(Request::get("/v1/targets").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(targets).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["targets"][0]["source"], "acme");

    let sources = app
        .router
        .oneshot(Request::get("/v1/sources").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_body(sources).await;
    assert_eq!(json["sources"], serde_json::json!(["acme"]));
}

#[tokio::test]
async fn diff_classifies_and_validates() {
    let app = setup_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(post_json("/v1/diff", serde_json::json!({ "path_ids": [10] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let items = json[0]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["status"], "equal");
    assert_eq!(items[1]["status"], "hub_higher");

    let empty = app
        .router
        .clone()
        .oneshot(post_json("/v1/diff", serde_json::json!({ "path_ids": [] })))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .router
        .oneshot(post_json("/v1/diff", serde_json::json!({ "path_ids": [404] })))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn commit_reports_updates_hub_and_echoes_input() {
    let app = setup_test_app().await;

    let diff = app
        .router
        .clone()
        .oneshot(post_json("/v1/diff", serde_json::json!({ "path_ids": [10] })))
        .await
        .unwrap();
    let reports = json_body(diff).await;

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/v1/commit",
            serde_json::json!({ "reports": reports.clone() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["updated"], true);
    assert_eq!(json["reports"], reports);

    let (output,): (Option<f64>,) =
        sqlx::query_as("SELECT output_price FROM hub_stocks WHERE origin = 2")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(output, Some(700.0));
}

#[tokio::test]
async fn commit_explicit_changes() {
    let app = setup_test_app().await;
    let changes = serde_json::json!([
        { "origin": 1, "input_price": 400.0, "output_price": 600.0, "warranty": "6 months" }
    ]);

    let response = app
        .router
        .clone()
        .oneshot(post_json("/v1/commit", serde_json::json!({ "changes": changes })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["updated"], true);
    assert_eq!(json["changes"][0]["origin"], 1);

    let (output, warranty): (Option<f64>, Option<String>) =
        sqlx::query_as("SELECT output_price, warranty FROM hub_stocks WHERE origin = 1")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(output, Some(600.0));
    assert_eq!(warranty.as_deref(), Some("6 months"));

    let nothing = app
        .router
        .oneshot(post_json("/v1/commit", serde_json::json!({ "changes": [] })))
        .await
        .unwrap();
    assert_eq!(json_body(nothing).await["updated"], false);
}
