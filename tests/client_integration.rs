//! Integration tests for the request executor
//!
//! Drives `ApiClient::execute` end to end against a scripted transport and a
//! counting credential: retries, the CAE challenge, telemetry headers,
//! cancellation and deadlines.

mod common;

use common::{
    BAPI_URL, CountingCredential, FakeTransport, client, response, response_with_headers,
    test_config,
};
use powerplatform_client::api::{
    ApiClient, ApiError, ApiRequest, ErrorKind, RequestContext, RequestMetadata,
};
use powerplatform_client::config::ProviderConfig;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CAE_CHALLENGE: &str = r#"Bearer realm="", error="insufficient_claims", claims="eyJhY2Nlc3NfdG9rZW4iOnsibmJmIjp7ImVzc2VudGlhbCI6dHJ1ZX19fQ==""#;

#[tokio::test]
async fn test_relative_url_fails_before_any_call() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(200, "{}")]);
    let client = client(test_config(), credential.clone(), transport.clone());

    let err = client
        .execute(&client.context(), ApiRequest::get("/environments"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InputValidation);
    assert_eq!(transport.calls(), 0);
    assert_eq!(credential.acquisitions(), 0);
}

#[tokio::test]
async fn test_each_retryable_status_is_retried() {
    for status in [401, 408, 425, 429, 500, 502, 503, 504] {
        let credential = CountingCredential::new();
        let transport = FakeTransport::new(vec![response(status, ""), response(200, "{}")]);
        let client = client(test_config(), credential.clone(), transport.clone());

        let resp = client
            .execute(&client.context(), ApiRequest::get(BAPI_URL).accept(&[200]))
            .await
            .unwrap_or_else(|e| panic!("status {} was not retried: {}", status, e));

        assert_eq!(resp.status.as_u16(), 200);
        assert_eq!(transport.calls(), 2, "status {}", status);
    }
}

#[tokio::test]
async fn test_non_retryable_status_fails_on_first_attempt() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(404, r#"{"error":"missing"}"#)]);
    let client = client(test_config(), credential.clone(), transport.clone());

    let err = client
        .execute(&client.context(), ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    match err {
        ApiError::UnexpectedStatus {
            expected,
            status,
            status_text,
            body,
        } => {
            assert_eq!(expected, vec![200]);
            assert_eq!(status.as_u16(), 404);
            assert_eq!(status_text, "404 Not Found");
            assert_eq!(body, br#"{"error":"missing"}"#.to_vec());
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_acceptable_set_accepts_any_status() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(503, "")]);
    let client = client(test_config(), credential, transport.clone());

    let resp = client
        .execute(&client.context(), ApiRequest::get(BAPI_URL))
        .await
        .unwrap();

    assert_eq!(resp.status.as_u16(), 503);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_rate_limited_then_ok_reacquires_token() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![
        response_with_headers(429, &[("Retry-After", "0")], ""),
        response(200, r#"{"value":[]}"#),
    ]);
    let client = client(test_config(), credential.clone(), transport.clone());

    let resp = client
        .execute(&client.context(), ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap();

    assert_eq!(resp.status.as_u16(), 200);
    assert_eq!(transport.calls(), 2);
    assert_eq!(credential.acquisitions(), 2);

    let requests = transport.requests();
    assert_eq!(requests[0].headers["authorization"], "Bearer token-1");
    assert_eq!(requests[1].headers["authorization"], "Bearer token-2");
}

#[tokio::test]
async fn test_scope_resolved_from_url() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(200, "{}")]);
    let client = client(test_config(), credential.clone(), transport);

    client
        .execute(&client.context(), ApiRequest::get(BAPI_URL))
        .await
        .unwrap();
    client
        .execute(
            &client.context(),
            ApiRequest::get("https://example.com/custom").scope("api://custom/.default"),
        )
        .await
        .unwrap();

    assert_eq!(
        credential.scopes(),
        vec![
            vec!["https://service.powerapps.com/.default".to_string()],
            vec!["api://custom/.default".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_unauthorized_invalidates_cached_token() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(401, ""), response(200, "{}")]);
    let client = client(test_config(), credential.clone(), transport.clone());

    client
        .execute(&client.context(), ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap();

    assert_eq!(credential.invalidations(), 1);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_cae_challenge_is_a_policy_violation() {
    let mut config = test_config();
    config.enable_cae = true;

    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![
        response_with_headers(401, &[("WWW-Authenticate", CAE_CHALLENGE)], ""),
        response(200, "{}"),
    ]);
    let client = client(config, credential, transport.clone());

    let err = client
        .execute(&client.context(), ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
    assert_eq!(transport.calls(), 1);
    match err {
        ApiError::PolicyViolation { message, status, .. } => {
            assert_eq!(message, CAE_CHALLENGE);
            assert_eq!(status.as_u16(), 401);
        }
        other => panic!("expected PolicyViolation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cae_challenge_ignored_when_disabled() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![
        response_with_headers(401, &[("WWW-Authenticate", CAE_CHALLENGE)], ""),
        response(200, "{}"),
    ]);
    let client = client(test_config(), credential, transport.clone());

    client
        .execute(&client.context(), ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap();

    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_telemetry_headers_attached() {
    let mut config = test_config();
    config.partner_id = Some("00000000-0000-0000-0000-000000000001".into());

    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(503, ""), response(200, "{}")]);
    let client = client(config, credential, transport.clone());

    let ctx = client
        .context()
        .with_metadata(RequestMetadata::new("environment", "create"));
    client
        .execute(&ctx, ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    let first = &requests[0].headers;
    let agent = first["user-agent"].to_str().unwrap();
    assert!(agent.starts_with("powerplatform-client/"));
    assert!(agent.contains(" environment create"));
    assert!(agent.ends_with(" pid-00000000-0000-0000-0000-000000000001"));
    assert_eq!(first["x-ms-correlation-id"], ctx.correlation_id());
    assert_eq!(
        first["correlation-context"],
        "objectName=environment,requestType=create"
    );
    assert_eq!(first["content-type"], "application/json");

    // one correlation id per operation, a fresh request id per attempt
    let second = &requests[1].headers;
    assert_eq!(second["x-ms-correlation-id"], first["x-ms-correlation-id"]);
    assert_ne!(second["request-id"], first["request-id"]);
    assert!(
        first["request-id"]
            .to_str()
            .unwrap()
            .starts_with(&format!("|{}.", ctx.correlation_id()))
    );
}

#[tokio::test]
async fn test_telemetry_optout_omits_headers() {
    let mut config = test_config();
    config.telemetry_optout = true;

    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(200, "{}")]);
    let client = client(config, credential, transport.clone());

    client
        .execute(&client.context(), ApiRequest::get(BAPI_URL))
        .await
        .unwrap();

    let headers = &transport.requests()[0].headers;
    assert!(headers.get("user-agent").is_none());
    assert!(headers.get("x-ms-correlation-id").is_none());
    assert!(headers.get("request-id").is_none());
    assert!(headers.get("authorization").is_some());
}

#[tokio::test]
async fn test_canceled_context_stops_before_sending() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(200, "{}")]);
    let client = client(test_config(), credential, transport.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = client.context().with_cancellation(cancel);

    let err = client
        .execute(&ctx, ApiRequest::get(BAPI_URL))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_wait() {
    // not test mode: the executor really waits out the default window
    let config = ProviderConfig::default();

    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(503, "")]);
    let client = ApiClient::with_parts(config, credential, transport.clone());

    let cancel = CancellationToken::new();
    let ctx = client.context().with_cancellation(cancel.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .execute(&ctx, ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Canceled);
    assert_eq!(transport.calls(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_deadline_bounds_retry_loop() {
    let config = ProviderConfig::default();

    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(503, "")]);
    let client = client(config, credential, transport.clone());

    let ctx = RequestContext::with_timeout(Duration::from_millis(100));
    let err = client
        .execute(&ctx, ApiRequest::get(BAPI_URL).accept(&[200]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(transport.calls() > 1);
}

#[tokio::test]
async fn test_execute_into_decodes_body() {
    #[derive(Debug, Default, Deserialize)]
    struct Environments {
        value: Vec<Environment>,
    }

    #[derive(Debug, Deserialize)]
    struct Environment {
        name: String,
    }

    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(
        200,
        r#"{"value":[{"name":"Default-1"},{"name":"dev"}]}"#,
    )]);
    let client = client(test_config(), credential, transport);

    let mut environments = Environments::default();
    let resp = client
        .execute_into(
            &client.context(),
            ApiRequest::get(BAPI_URL).accept(&[200]),
            &mut environments,
        )
        .await
        .unwrap();

    assert_eq!(resp.status.as_u16(), 200);
    let names: Vec<_> = environments.value.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Default-1", "dev"]);
}

#[tokio::test]
async fn test_json_body_is_sent() {
    let credential = CountingCredential::new();
    let transport = FakeTransport::new(vec![response(202, "")]);
    let client = client(test_config(), credential, transport.clone());

    let request = ApiRequest::post(BAPI_URL)
        .json_body(&serde_json::json!({"location": "unitedstates"}))
        .unwrap()
        .accept(&[202]);
    client.execute(&client.context(), request).await.unwrap();

    let sent = &transport.requests()[0];
    assert_eq!(sent.method, reqwest::Method::POST);
    assert_eq!(
        sent.body.as_deref(),
        Some(br#"{"location":"unitedstates"}"#.as_slice())
    );
}
