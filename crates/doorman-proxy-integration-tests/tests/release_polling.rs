//! Release polling through the full router.

mod common;

use axum::http::StatusCode;
use common::*;
use std::sync::Arc;

async fn queue_folders(harness: &TestHarness, folders: &[&str]) {
    for folder in folders {
        let key = format!("{}%2Fspec.yaml", folder.replace('/', "%2F"));
        let response = harness
            .send(event_request(
                &event_for_key("b1", &key),
                Some(&bearer(OPEN_TOKEN)),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

async fn poll_folder(harness: &TestHarness) -> Option<String> {
    let response = harness.send(release_request(Some(&admin_auth()))).await;
    match response.status() {
        StatusCode::OK => Some(
            body_json(response).await["folderName"]
                .as_str()
                .unwrap()
                .to_string(),
        ),
        StatusCode::NOT_FOUND => None,
        other => panic!("unexpected poll status {}", other),
    }
}

#[tokio::test]
async fn test_empty_queue_is_not_found() {
    let harness = TestHarness::new();

    assert_eq!(poll_folder(&harness).await, None);
}

#[tokio::test]
async fn test_releases_come_back_in_arrival_order() {
    let harness = TestHarness::new();
    let folders = ["releases/1.0.0", "releases/1.1.0", "hotfix/1.1.1", "releases/2.0.0"];
    queue_folders(&harness, &folders).await;

    let mut polled = Vec::new();
    while let Some(folder) = poll_folder(&harness).await {
        polled.push(folder);
    }

    assert_eq!(polled, folders);
}

#[tokio::test]
async fn test_polled_release_carries_event_details() {
    let harness = TestHarness::new();
    harness
        .send(event_request(SCENARIO_EVENT, Some(&bearer(OPEN_TOKEN))))
        .await;

    let response = harness.send(release_request(Some(&admin_auth()))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let release = body_json(response).await;
    assert_eq!(release["origin"], "o1");
    assert_eq!(release["deploymentId"], "d1");
    assert_eq!(release["bucketName"], "b1");
    assert_eq!(release["folderName"], "releases/1.2.0");
    assert!(release["time"].is_string());
}

#[tokio::test]
async fn test_yaml_response_on_request() {
    let harness = TestHarness::new();
    queue_folders(&harness, &["v1"]).await;
    let mut request = release_request(Some(&admin_auth()));
    request
        .headers_mut()
        .insert("accept", "application/yaml".parse().unwrap());

    let response = harness.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let release: serde_yaml::Value = serde_yaml::from_str(&body_string(response).await).unwrap();
    assert_eq!(release["folderName"].as_str(), Some("v1"));
}

#[tokio::test]
async fn test_each_release_is_handed_out_once() {
    let harness = Arc::new(TestHarness::new());
    queue_folders(&harness, &["only"]).await;

    let pollers: Vec<_> = (0..4)
        .map(|_| {
            let harness = harness.clone();
            tokio::spawn(async move { poll_folder(&harness).await })
        })
        .collect();

    let mut winners = 0;
    for poller in pollers {
        if poller.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(harness.queued_releases(), 0);
}

#[tokio::test]
async fn test_polling_requires_admin_credentials() {
    let harness = TestHarness::new();
    queue_folders(&harness, &["v1"]).await;

    let response = harness.send(release_request(None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.queued_releases(), 1);
}

#[tokio::test]
async fn test_unreachable_source_is_server_error() {
    let app = build_app(Arc::new(UnreachableSource));

    let response = tower::ServiceExt::oneshot(app, release_request(Some(&admin_auth())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "cannot retrieve release information"
    );
}
