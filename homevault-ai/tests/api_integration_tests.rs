//! Integration tests for homevault-ai HTTP endpoints
//!
//! Health, single-image analysis, asset records, blobs and settings.

mod helpers;

use axum::http::{Method, StatusCode};
use helpers::*;
use homevault_ai::models::{EstimatedValue, ItemAnalysis};
use serde_json::json;
use uuid::Uuid;

fn analysis(name: &str, amount: f64) -> ItemAnalysis {
    ItemAnalysis {
        name: name.to_string(),
        estimated_value: EstimatedValue::usd(amount),
        ..Default::default()
    }
}

async fn create_asset(app: &TestApp, user_id: &str, name: &str, amount: f64) -> Uuid {
    app.state
        .assets
        .save(user_id, &analysis(name, amount), None)
        .await
        .unwrap()
        .asset_id
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::offline().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "homevault-ai");
    assert!(body["version"].is_string());
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_health_degraded_without_api_key() {
    let app = TestApp::offline().await;
    *app.state.api_key.write().await = None;

    let body = body_json(app.get("/health").await).await;
    assert_eq!(body["status"], "degraded");
}

// =============================================================================
// Single-image analysis
// =============================================================================

#[tokio::test]
async fn test_analyze_image_returns_analysis() {
    let app = TestApp::new(
        ScriptedModel::always(item_reply("Laptop", 1200.0)),
        ScriptedModel::new(vec![]),
    )
    .await;

    let response = app
        .send(multipart_request(
            "/api/analyze-image",
            &[Part::jpeg("image", "laptop.jpg", 1)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Laptop");
    assert_eq!(body["category"], "electronics");
    assert_eq!(body["estimatedValue"]["amount"], 1200.0);
    assert_eq!(body["estimatedValue"]["currency"], "USD");

    // Analysis alone never creates a record
    assert!(app.state.assets.list("anyone").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_analyze_image_without_image() {
    let app = TestApp::offline().await;

    let response = app
        .send(multipart_request(
            "/api/analyze-image",
            &[Part::text("note", "no file here")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "No image provided");
}

#[tokio::test]
async fn test_analyze_image_unsupported_type() {
    let app = TestApp::offline().await;

    let response = app
        .send(multipart_request(
            "/api/analyze-image",
            &[Part::file("image", "anim.gif", "image/gif", b"GIF89a".to_vec())],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["receivedType"], "image/gif");
    assert_eq!(body["fileName"], "anim.gif");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported image format: image/gif"));
}

#[tokio::test]
async fn test_analyze_image_model_failure_is_bad_gateway() {
    let app = TestApp::offline().await;

    let response = app
        .send(multipart_request(
            "/api/analyze-image",
            &[Part::jpeg("image", "tv.jpg", 2)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to analyze image");
    assert!(body["details"].as_str().unwrap().contains("Analysis failed"));

    // Upstream failure surfaces on /health
    let health = body_json(app.get("/health").await).await;
    assert!(health["last_error"].is_string());
}

#[tokio::test]
async fn test_analyze_image_unparsable_reply() {
    let app = TestApp::new(
        ScriptedModel::always("I cannot identify this item."),
        ScriptedModel::new(vec![]),
    )
    .await;

    let response = app
        .send(multipart_request(
            "/api/analyze-image",
            &[Part::jpeg("image", "blur.jpg", 3)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

// =============================================================================
// Asset records
// =============================================================================

#[tokio::test]
async fn test_list_assets_newest_first() {
    let app = TestApp::offline().await;
    create_asset(&app, "user-1", "Couch", 800.0).await;
    create_asset(&app, "user-1", "Lamp", 40.0).await;
    create_asset(&app, "user-2", "Bike", 500.0).await;

    let response = app.get("/users/user-1/assets").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Lamp", "Couch"]);
    assert_eq!(body[0]["userId"], "user-1");
    assert_eq!(body[0]["imageUrl"], "");
}

#[tokio::test]
async fn test_inventory_totals() {
    let app = TestApp::offline().await;
    create_asset(&app, "user-1", "Couch", 800.0).await;
    create_asset(&app, "user-1", "Lamp", 40.5).await;

    let body = body_json(app.get("/users/user-1/inventory").await).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["totalValue"], 840.5);

    let empty = body_json(app.get("/users/nobody/inventory").await).await;
    assert_eq!(empty["count"], 0);
}

#[tokio::test]
async fn test_get_asset_scoped_by_user() {
    let app = TestApp::offline().await;
    let asset_id = create_asset(&app, "user-1", "Watch", 250.0).await;

    let response = app.get(&format!("/users/user-1/assets/{}", asset_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], asset_id.to_string());

    let response = app.get(&format!("/users/user-2/assets/{}", asset_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .get(&format!("/users/user-1/assets/{}", Uuid::new_v4()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_update_asset() {
    let app = TestApp::offline().await;
    let asset_id = create_asset(&app, "user-1", "Chair", 100.0).await;
    let before = body_json(app.get(&format!("/users/user-1/assets/{}", asset_id)).await).await;

    let response = app
        .send_json(
            Method::PATCH,
            &format!("/users/user-1/assets/{}", asset_id),
            json!({
                "name": "Office Chair",
                "room": "Study",
                "estimatedValue": { "amount": 150, "currency": "usd" }
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = body_json(response).await;
    assert_eq!(after["name"], "Office Chair");
    assert_eq!(after["room"], "Study");
    assert_eq!(after["estimatedValue"]["amount"], 150.0);
    assert_eq!(after["estimatedValue"]["currency"], "USD");
    assert_eq!(after["createdAt"], before["createdAt"]);
    assert_ne!(after["updatedAt"], before["updatedAt"]);
}

#[tokio::test]
async fn test_update_asset_rejects_empty_and_unknown_fields() {
    let app = TestApp::offline().await;
    let asset_id = create_asset(&app, "user-1", "Chair", 100.0).await;
    let uri = format!("/users/user-1/assets/{}", asset_id);

    let response = app.send_json(Method::PATCH, &uri, json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send_json(Method::PATCH, &uri, json!({ "userId": "someone-else" }))
        .await;
    assert!(response.status().is_client_error());

    let response = app
        .send_json(
            Method::PATCH,
            &format!("/users/user-2/assets/{}", asset_id),
            json!({ "name": "Stolen" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_image_and_serve_blob() {
    let app = TestApp::offline().await;
    let asset_id = create_asset(&app, "user-1", "Guitar", 900.0).await;

    let response = app
        .send(multipart_request(
            &format!("/users/user-1/assets/{}/image", asset_id),
            &[Part::jpeg("image", "guitar.jpg", 7)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let asset = body_json(response).await;
    let image_url = asset["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with(&format!(
        "{}/blobs/users/user-1/assets/images/{}-",
        PUBLIC_BASE_URL, asset_id
    )));

    let response = app.get(&blob_uri(image_url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/jpeg"
    );
    assert_eq!(body_bytes(response).await, jpeg_bytes(7));
}

#[tokio::test]
async fn test_image_url_for_user_id_with_reserved_characters() {
    let app = TestApp::offline().await;
    let asset_id = create_asset(&app, "jane doe/#?", "Cello", 2400.0).await;

    let response = app
        .send(multipart_request(
            &format!("/users/jane%20doe%2F%23%3F/assets/{}/image", asset_id),
            &[Part::jpeg("image", "cello.jpg", 11)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let asset = body_json(response).await;
    let image_url = asset["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with(&format!(
        "{}/blobs/users/jane%2520doe%252F%2523%253F/assets/images/{}-",
        PUBLIC_BASE_URL, asset_id
    )));

    let response = app.get(&blob_uri(image_url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, jpeg_bytes(11));
}

#[tokio::test]
async fn test_upload_image_for_missing_asset() {
    let app = TestApp::offline().await;

    let response = app
        .send(multipart_request(
            &format!("/users/user-1/assets/{}/image", Uuid::new_v4()),
            &[Part::jpeg("image", "ghost.jpg", 8)],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_asset_removes_image() {
    let app = TestApp::offline().await;
    let asset_id = create_asset(&app, "user-1", "Drone", 600.0).await;

    let asset = body_json(
        app.send(multipart_request(
            &format!("/users/user-1/assets/{}/image", asset_id),
            &[Part::jpeg("image", "drone.jpg", 9)],
        ))
        .await,
    )
    .await;
    let blob = blob_uri(asset["imageUrl"].as_str().unwrap());

    let response = app
        .send_json(
            Method::DELETE,
            &format!("/users/user-1/assets/{}", asset_id),
            json!(null),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["assetId"], asset_id.to_string());
    assert_eq!(body["imageDeleted"], true);

    assert_eq!(
        app.get(&format!("/users/user-1/assets/{}", asset_id))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.get(&blob).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blob_path_traversal_rejected() {
    let app = TestApp::offline().await;

    let response = app.get("/blobs/users/../secrets").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_set_model_api_key() {
    let app = TestApp::offline().await;
    *app.state.api_key.write().await = None;

    let response = app
        .send_json(
            Method::POST,
            "/api/settings/model_api_key",
            json!({ "api_key": "  new-key  " }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    assert_eq!(app.state.api_key.read().await.as_deref(), Some("new-key"));
    assert_eq!(
        homevault_ai::db::settings::get_model_api_key(&app.state.db)
            .await
            .unwrap()
            .as_deref(),
        Some("new-key")
    );
    assert_eq!(body_json(app.get("/health").await).await["status"], "ok");
}

#[tokio::test]
async fn test_set_model_api_key_rejects_blank() {
    let app = TestApp::offline().await;

    let response = app
        .send_json(
            Method::POST,
            "/api/settings/model_api_key",
            json!({ "api_key": "   " }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.state.api_key.read().await.as_deref(), Some("test-key"));
}
