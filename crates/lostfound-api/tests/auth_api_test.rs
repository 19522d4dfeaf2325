//! End-user auth endpoints: OTP login, identity-verified submit, profile
//! upload, plus the global rate limit.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use lostfound_notify::RecordingMailer;

use common::{spawn_app, spawn_app_with, test_config, wait_for_mail, MultipartForm, GOOD_ID_TOKEN, PNG};

fn code_from(body: &str) -> String {
    body.lines()
        .find_map(|line| line.strip_prefix("Your OTP is: "))
        .expect("OTP line present")
        .trim()
        .to_string()
}

#[tokio::test]
async fn test_otp_login_flow() {
    let app = spawn_app();

    let (status, body) = app
        .json(
            Method::POST,
            "/api/auth/send-otp",
            json!({ "email": " Zoe@Campus.edu " }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OTP sent");

    let mail = wait_for_mail(&app.mailer, "zoe@campus.edu", 1).await;
    assert_eq!(mail[0].subject, "🔐 Your OTP for Login");
    assert!(mail[0].body.contains("valid for 5 minutes"));
    let code = code_from(&mail[0].body);
    assert_eq!(code.len(), 6);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "zoe@campus.edu", "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let session = app
        .state
        .stores
        .sessions
        .validate(token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.subject, "zoe@campus.edu");

    // Codes are single use.
    let (status, body) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "zoe@campus.edu", "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired OTP");
}

#[tokio::test]
async fn test_new_code_replaces_old_one() {
    let app = spawn_app();
    for _ in 0..2 {
        let (status, _) = app
            .json(Method::POST, "/api/auth/send-otp", json!({ "email": "kim@campus.edu" }), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let mail = wait_for_mail(&app.mailer, "kim@campus.edu", 2).await;
    let first = code_from(&mail[0].body);
    let second = code_from(&mail[1].body);

    if first != second {
        let (status, _) = app
            .json(
                Method::POST,
                "/api/auth/verify-otp",
                json!({ "email": "kim@campus.edu", "otp": first }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "kim@campus.edu", "otp": second }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_send_otp_validation() {
    let app = spawn_app();
    for body in [json!({}), json!({ "email": "" }), json!({ "email": "nobody" })] {
        let (status, resp) = app
            .json(Method::POST, "/api/auth/send-otp", body, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["message"], "Invalid email");
    }
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_send_otp_delivery_failure() {
    let app = spawn_app_with(test_config(), RecordingMailer::new().fail_for("down@campus.edu"));

    let (status, body) = app
        .json(Method::POST, "/api/auth/send-otp", json!({ "email": "down@campus.edu" }), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to send OTP");
}

#[tokio::test]
async fn test_verify_otp_rejects_wrong_and_missing_codes() {
    let app = spawn_app();

    let (status, _) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "ghost@campus.edu", "otp": "123456" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.json(Method::POST, "/api/auth/send-otp", json!({ "email": "eli@campus.edu" }), None)
        .await;
    wait_for_mail(&app.mailer, "eli@campus.edu", 1).await;
    // Issued codes are always six digits starting at 100000.
    let wrong = "000000";

    let (status, body) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "eli@campus.edu", "otp": wrong }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired OTP");

    let (status, _) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "eli@campus.edu" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_otp_locks_after_repeated_failures() {
    let app = spawn_app();
    app.json(Method::POST, "/api/auth/send-otp", json!({ "email": "max@campus.edu" }), None)
        .await;
    let mail = wait_for_mail(&app.mailer, "max@campus.edu", 1).await;
    let code = code_from(&mail[0].body);
    let wrong = "000000";

    for _ in 0..5 {
        app.json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "max@campus.edu", "otp": wrong }),
            None,
        )
        .await;
    }

    let (status, _) = app
        .json(
            Method::POST,
            "/api/auth/verify-otp",
            json!({ "email": "max@campus.edu", "otp": code }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_identity_submit() {
    let app = spawn_app();

    let (status, body) = app
        .json(Method::POST, "/api/auth/submit", json!({}), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Token missing");

    let (status, body) = app
        .json(Method::POST, "/api/auth/submit", json!({}), Some("expired"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");

    let (status, body) = app
        .json(Method::POST, "/api/auth/submit", json!({}), Some(GOOD_ID_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Report submitted successfully");
    assert_eq!(body["user"]["email"], "lena@campus.edu");
    assert_eq!(body["user"]["uid"], "uid-123");
    assert_eq!(body["user"]["name"], "Lena");
    assert!(body["user"]["picture"].is_null());
}

#[tokio::test]
async fn test_upload_profile() {
    let app = spawn_app();

    let request = MultipartForm::new()
        .text("note", "no file here")
        .into_request("/api/auth/upload-profile");
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file uploaded");

    let request = MultipartForm::new()
        .file("profile", "me.png", "image/png", &PNG)
        .into_request("/api/auth/upload-profile");
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], "https://img.test/lost-and-found/1.png");
}

#[tokio::test]
async fn test_upload_profile_without_multipart_body_is_json_error() {
    let app = spawn_app();
    let (status, body) = app
        .json(Method::POST, "/api/auth/upload-profile", json!({}), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "expected a JSON message: {}", body);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let config = lostfound_api::AppConfig {
        rate_limit_enabled: true,
        rate_limit_requests: 2,
        rate_limit_period_secs: 3600,
        ..test_config()
    };
    let app = spawn_app_with(config, RecordingMailer::new());

    assert_eq!(app.get("/health", None).await.0, StatusCode::OK);
    assert_eq!(app.get("/health", None).await.0, StatusCode::OK);
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["message"],
        "Too many requests. Please wait before retrying."
    );
}
