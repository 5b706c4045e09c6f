use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;

use super::health::HEALTH_MESSAGE;
use super::test_helpers::{start_gateway, test_state, StubBackend};
use super::handle_health;

/// ヘルスチェックは解決済みバックエンドの種別を含む
#[tokio::test]
async fn test_health_reports_backend() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::sandboxed());
    let state = test_state(dir.path(), backend.clone());

    let response = handle_health(State(state)).await.0;

    assert!(response.ok);
    assert_eq!(response.message, HEALTH_MESSAGE);
    assert_eq!(response.backend.as_deref(), Some("sandboxed"));
    // ヘルスチェックでは準備しない
    assert_eq!(backend.prepare_count(), 0);
}

/// /health と /api/health の両方で応答する
#[tokio::test]
async fn test_health_paths() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_gateway(test_state(dir.path(), Arc::new(StubBackend::local())), None).await;
    let client = reqwest::Client::new();

    for path in ["/health", "/api/health"] {
        let response = client
            .get(format!("http://127.0.0.1:{port}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["message"], HEALTH_MESSAGE);
    }
}

/// プリフライトはどのパスでも204 + CORSヘッダ、ボディなし
#[tokio::test]
async fn test_preflight() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::sandboxed());
    let port = start_gateway(test_state(dir.path(), backend.clone()), None).await;
    let client = reqwest::Client::new();

    for path in ["/api/sign", "/api/verify", "/anything"] {
        let response = client
            .request(
                reqwest::Method::OPTIONS,
                format!("http://127.0.0.1:{port}{path}"),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT.as_u16());
        let headers = response.headers();
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Content-Type"
        );
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "OPTIONS,GET,POST"
        );
        assert!(response.bytes().await.unwrap().is_empty());
    }
    assert_eq!(backend.prepare_count(), 0);
}

/// エラーレスポンスにもCORSヘッダが付く
#[tokio::test]
async fn test_cors_on_error_response() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_gateway(test_state(dir.path(), Arc::new(StubBackend::local())), None).await;

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/sign"))
        .json(&serde_json::json!({"imageName": "a.jpg", "imageData": "not-base64!!"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["ok"], false);
}

/// 静的ファイルのルートが無ければ404 "Not found"
#[tokio::test]
async fn test_not_found_without_static_dir() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_gateway(test_state(dir.path(), Arc::new(StubBackend::local())), None).await;

    let response = reqwest::get(format!("http://127.0.0.1:{port}/some/page"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    assert_eq!(response.text().await.unwrap(), "Not found");
}

/// 静的ファイルを配信し、未知のパスはindex.htmlにフォールバックする
#[tokio::test]
async fn test_static_files_with_spa_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let dist = dir.path().join("dist");
    std::fs::create_dir_all(dist.join("assets")).unwrap();
    std::fs::write(dist.join("index.html"), "<html>app</html>").unwrap();
    std::fs::write(dist.join("assets/app.js"), "console.log(1)").unwrap();

    let port = start_gateway(
        test_state(dir.path(), Arc::new(StubBackend::local())),
        Some(dist),
    )
    .await;

    for (path, expected) in [
        ("/", "<html>app</html>"),
        ("/assets/app.js", "console.log(1)"),
        ("/settings/profile", "<html>app</html>"),
    ] {
        let response = reqwest::get(format!("http://127.0.0.1:{port}{path}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16(), "{path}");
        assert_eq!(response.text().await.unwrap(), expected, "{path}");
    }

    // APIルートは静的ファイルより優先される
    let response = reqwest::get(format!("http://127.0.0.1:{port}/api/health"))
        .await
        .unwrap();
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["ok"], true);
}

/// APIパスへのGETは405にせず、静的ファイルのフォールバックに回す
#[tokio::test]
async fn test_wrong_method_on_api_path_falls_through() {
    let dir = tempfile::tempdir().unwrap();
    let dist = dir.path().join("dist");
    std::fs::create_dir_all(&dist).unwrap();
    std::fs::write(dist.join("index.html"), "<html>app</html>").unwrap();
    let with_static = start_gateway(
        test_state(dir.path(), Arc::new(StubBackend::local())),
        Some(dist),
    )
    .await;
    let without_static =
        start_gateway(test_state(dir.path(), Arc::new(StubBackend::local())), None).await;

    let response = reqwest::get(format!("http://127.0.0.1:{with_static}/api/sign"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK.as_u16());
    assert_eq!(response.text().await.unwrap(), "<html>app</html>");

    for path in ["/api/sign", "/api/verify"] {
        let response = reqwest::get(format!("http://127.0.0.1:{without_static}{path}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16(), "{path}");
        assert_eq!(response.text().await.unwrap(), "Not found");
    }
}

/// 未知のパスへのGET以外は、静的ファイルの有無にかかわらず404 "Not found"
#[tokio::test]
async fn test_non_get_unknown_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let dist = dir.path().join("dist");
    std::fs::create_dir_all(&dist).unwrap();
    std::fs::write(dist.join("index.html"), "<html>app</html>").unwrap();
    let client = reqwest::Client::new();

    for static_dir in [Some(dist), None] {
        let port = start_gateway(
            test_state(dir.path(), Arc::new(StubBackend::local())),
            static_dir,
        )
        .await;

        for path in ["/nope", "/api/health", "/"] {
            let response = client
                .post(format!("http://127.0.0.1:{port}{path}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16(), "{path}");
            assert_eq!(
                response
                    .headers()
                    .get("access-control-allow-origin")
                    .unwrap(),
                "*"
            );
            assert_eq!(response.text().await.unwrap(), "Not found");
        }
    }
}

/// パース可能なJSONでもフィールドの型が違えば400
#[test]
fn test_parse_image_request_type_mismatch() {
    let result = super::parse_image_request(br#"{"imageData": 42}"#);
    assert!(matches!(result, Err(crate::error::GatewayError::BadRequest(_))));
}

#[test]
fn test_parse_image_request_blank_body() {
    let request = super::parse_image_request(b"  \n").unwrap();
    assert!(request.image_name.is_none());
    assert!(request.image_data.is_none());
}

/// ハンドラ内のパニックはJSONの500になる
#[tokio::test]
async fn test_panic_becomes_json_error() {
    let response = super::fallback::panic_response(Box::new("boom"));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap().contains("boom"));
}
