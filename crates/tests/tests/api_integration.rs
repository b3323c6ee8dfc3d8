use std::io::Cursor;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{ImageFormat, Rgb, RgbImage};
use sanitation_api::{build_app_with_vision, ApiConfig};
use sanitation_core::{ClassId, SanitationResult};
use sanitation_ml::{ClassPrediction, ImageClassifier, ImageTensor, VisionStack};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "dev-sanitation-key";
const BOUNDARY: &str = "sanitation-test-boundary";

struct FixedClassifier(ClassId);

impl ImageClassifier for FixedClassifier {
    fn model_name(&self) -> &str {
        "fixed-test"
    }

    fn classify(&self, _input: &ImageTensor) -> SanitationResult<ClassPrediction> {
        Ok(ClassPrediction {
            class_id: self.0,
            score: 0.9,
            model: "fixed-test".to_string(),
        })
    }
}

async fn app_with(class_id: ClassId, config: ApiConfig) -> Router {
    build_app_with_vision(
        config,
        VisionStack::new(Arc::new(FixedClassifier(class_id))),
    )
    .await
    .expect("app should build")
}

async fn app(class_id: ClassId) -> Router {
    app_with(class_id, ApiConfig::default()).await
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

fn png() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(300, 200, Rgb([30, 140, 70]))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn multipart_upload(image: Option<&[u8]>, draft_id: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(draft_id) = draft_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"draft_id\"\r\n\r\n{draft_id}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/v1/upload_image")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-api-key", API_KEY)
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app(483)
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["model"], "fixed-test");
    assert_eq!(parsed["store"], "memory");
}

#[tokio::test]
async fn requests_require_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/process_text")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "garbage" }).to_string()))
        .unwrap();

    let response = app(483).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn process_text_detects_intent_and_language() {
    let app = app(483).await;

    let cases = [
        ("there is a lot of garbage here", "file_complaint", "en"),
        ("कचरा की समस्या है", "file_complaint", "hi"),
        ("hello world", "unknown", "en"),
        ("garbage and कचरा", "file_complaint", "en"),
    ];

    for (text, intent, language) in cases {
        let response = app
            .clone()
            .oneshot(post_json("/v1/process_text", json!({ "text": text })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{text}");

        let parsed = json_body(response).await;
        assert_eq!(parsed["intent"], intent, "{text}");
        assert_eq!(parsed["language"], language, "{text}");
        // Only complaint text opens a draft.
        assert_eq!(
            parsed["draft_id"].as_str().is_some_and(|id| !id.is_empty()),
            intent == "file_complaint",
            "{text}"
        );
    }
}

#[tokio::test]
async fn unknown_text_falls_back_to_requested_default_language() {
    let response = app(483)
        .await
        .oneshot(post_json(
            "/v1/process_text",
            json!({ "text": "hello world", "default_language": "bn" }),
        ))
        .await
        .unwrap();

    let parsed = json_body(response).await;
    assert_eq!(parsed["intent"], "unknown");
    assert_eq!(parsed["language"], "bn");
    assert!(parsed.get("keyword").is_none());
    assert!(parsed.get("draft_id").is_none());
}

#[tokio::test]
async fn upload_image_resolves_disposal() {
    let response = app(937)
        .await
        .oneshot(multipart_upload(Some(&png()), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["detected_issue"], "other");
    assert_eq!(parsed["bin_type"], "green");
    assert_eq!(parsed["waste_type"], "decomposable");
    assert_eq!(parsed["class_id"], 937);
    assert!(parsed["guidance"].as_str().is_some());
}

#[tokio::test]
async fn upload_without_image_is_bad_request() {
    let response = app(937)
        .await
        .oneshot(multipart_upload(None, Some("draft-without-photo")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "no_file_uploaded");
}

#[tokio::test]
async fn corrupt_image_is_bad_request() {
    let response = app(937)
        .await
        .oneshot(multipart_upload(Some(b"definitely not a png"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_image");
}

#[tokio::test]
async fn tamil_complaint_round_trip() {
    let app = app(483).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/process_text",
            json!({ "text": "garbage is piling up near the market" }),
        ))
        .await
        .unwrap();
    let draft_id = json_body(response).await["draft_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/set_location",
            json!({ "location": "MG Road", "draft_id": draft_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/set_language",
            json!({ "language": "ta", "draft_id": draft_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let filed = json_body(response).await;
    let complaint_text = filed["complaint_text"].as_str().unwrap();
    assert!(complaint_text.contains("garbage"));
    assert!(complaint_text.contains("MG Road"));
    assert_eq!(filed["language"], "ta");

    let submission_link = filed["submission_link"].as_str().unwrap();
    let response = app.clone().oneshot(get(submission_link)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = json_body(response).await;
    assert_eq!(stored["id"], filed["complaint_id"]);
    assert_eq!(stored["issue"], "garbage");
    assert_eq!(stored["location"], "MG Road");
    assert_eq!(stored["language"], "ta");
    assert_eq!(stored["status"], "Filed");
    assert_eq!(stored["complaint_text"], filed["complaint_text"]);

    let response = app.oneshot(get("/v1/complaints?limit=5")).await.unwrap();
    let listed = json_body(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn image_then_letter_uses_draft_fields() {
    let app = app(568).await;

    let response = app
        .clone()
        .oneshot(multipart_upload(Some(&png()), None))
        .await
        .unwrap();
    let draft_id = json_body(response).await["draft_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/set_location",
            json!({ "location": "Lake View", "draft_id": draft_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            "/v1/generate_application",
            json!({ "draft_id": draft_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let letter = json_body(response).await;
    assert!(letter["application_template"]
        .as_str()
        .unwrap()
        .contains("sewage at Lake View"));
    assert!(letter["municipal_link"].as_str().unwrap().starts_with("https://"));
}

#[tokio::test]
async fn concurrent_filing_of_one_draft_files_once() {
    let config = ApiConfig {
        database_url: Some("sqlite::memory:".to_string()),
        ..ApiConfig::default()
    };
    let app = app_with(483, config).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/set_location",
            json!({ "location": "MG Road" }),
        ))
        .await
        .unwrap();
    let draft_id = json_body(response).await["draft_id"]
        .as_str()
        .unwrap()
        .to_string();

    let body = json!({ "language": "en", "draft_id": draft_id });
    let (first, second) = tokio::join!(
        app.clone().oneshot(post_json("/v1/set_language", body.clone())),
        app.clone().oneshot(post_json("/v1/set_language", body))
    );
    let mut statuses = vec![first.unwrap().status(), second.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::NOT_FOUND]);

    let response = app.oneshot(get("/v1/complaints")).await.unwrap();
    assert_eq!(json_body(response).await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn unknown_complaint_is_not_found() {
    let response = app(483).await.oneshot(get("/v1/complaints/ffffffff")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "complaint_not_found");
}

#[tokio::test]
async fn unknown_draft_is_not_found() {
    let response = app(483)
        .await
        .oneshot(post_json(
            "/v1/set_location",
            json!({ "location": "Ward 4", "draft_id": "no-such-draft" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "draft_not_found");
}

#[tokio::test]
async fn sqlite_store_persists_filed_complaints() {
    let config = ApiConfig {
        database_url: Some("sqlite::memory:".to_string()),
        ..ApiConfig::default()
    };
    let app = app_with(483, config).await;

    let response = app
        .clone()
        .oneshot(post_json("/v1/set_language", json!({ "language": "ur" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let filed = json_body(response).await;

    let id = filed["complaint_id"].as_str().unwrap();
    let response = app
        .oneshot(get(&format!("/v1/complaints/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = json_body(response).await;
    assert_eq!(stored["issue"], "unspecified");
    assert_eq!(stored["language"], "ur");
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let config = ApiConfig {
        rate_limit_max_requests: 1,
        ..ApiConfig::default()
    };
    let app = app_with(483, config).await;

    let first = app.clone().oneshot(get("/v1/complaints")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(get("/v1/complaints")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}
