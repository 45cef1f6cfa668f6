// HTTP Status Code Tests
// Tests that the cache protocol returns correct HTTP status codes and bodies


use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use test_helper::{BrokenStore, CountingStore, bind, spawn_test_server, start_with_timeout};

// ==================== READ / WRITE ROUND TRIPS ====================

#[tokio::test]
async fn test_cas_put_then_get_returns_bytes() {
    let server = spawn_test_server(CountingStore::new()).await;
    let client = Client::new();

    let response = client
        .put(format!("{}/cas/deadbeef", server.url))
        .body("X")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/cas/deadbeef", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], b"X");
}

#[tokio::test]
async fn test_ac_put_then_get_returns_bytes() {
    let server = spawn_test_server(CountingStore::new()).await;
    let client = Client::new();
    let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

    client
        .put(format!("{}/ac/0123abcd", server.url))
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{}/ac/0123abcd", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-length"],
        payload.len().to_string().as_str()
    );
    assert_eq!(response.bytes().await.unwrap().to_vec(), payload);
}

#[tokio::test]
async fn test_namespaces_are_separate() {
    let server = spawn_test_server(CountingStore::new()).await;
    let client = Client::new();

    client
        .put(format!("{}/ac/samekey", server.url))
        .body("action")
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{}/cas/samekey", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_nested_key_paths() {
    let server = spawn_test_server(CountingStore::new()).await;
    let client = Client::new();

    client
        .put(format!("{}/cas/sha256/ab/cdef", server.url))
        .body("nested")
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{}/cas/sha256/ab/cdef", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], b"nested");
}

// ==================== NOT FOUND ====================

#[tokio::test]
async fn test_get_absent_key_returns_404() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .get(format!("{}/cas/absentkey", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .get(format!("{}/other/key", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_namespace_without_key_returns_404() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .get(format!("{}/cas/", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== HEAD ====================

#[tokio::test]
async fn test_head_returns_length_without_body() {
    let server = spawn_test_server(CountingStore::new()).await;
    let client = Client::new();

    client
        .put(format!("{}/cas/headme", server.url))
        .body("0123456789")
        .send()
        .await
        .unwrap();

    let response = client
        .head(format!("{}/cas/headme", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-length"], "10");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_head_absent_key_returns_404() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .head(format!("{}/ac/nothing", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== METHOD NOT ALLOWED ====================

#[tokio::test]
async fn test_post_returns_405() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .post(format!("{}/cas/deadbeef", server.url))
        .body("X")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_delete_returns_405() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .delete(format!("{}/ac/deadbeef", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_peer_path_rejects_put() {
    let server = spawn_test_server(CountingStore::new()).await;

    let response = Client::new()
        .put(format!("{}/_groupcache/bazelcache/cas%2Fdeadbeef", server.url))
        .body("X")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ==================== BACKEND ERRORS ====================

#[tokio::test]
async fn test_backend_get_error_returns_500_without_detail() {
    let server = spawn_test_server(Arc::new(BrokenStore)).await;

    let response = Client::new()
        .get(format!("{}/cas/deadbeef", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.text().await.unwrap();
    assert!(!body.contains("s3.internal"));
}

#[tokio::test]
async fn test_backend_put_error_returns_500() {
    let server = spawn_test_server(Arc::new(BrokenStore)).await;

    let response = Client::new()
        .put(format!("{}/ac/deadbeef", server.url))
        .body("X")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.text().await.unwrap();
    assert!(!body.contains("s3.internal"));
}

// ==================== TIMEOUTS ====================

#[tokio::test]
async fn test_slow_backend_times_out_with_408() {
    let (listener, url) = bind().await;
    let store = CountingStore::with_delay(Duration::from_secs(2));
    let server = start_with_timeout(listener, &url, &[], store, Duration::from_millis(200)).await;

    let response = Client::new()
        .get(format!("{}/cas/slow", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

// ==================== CACHE BEHAVIOUR ====================

#[tokio::test]
async fn test_put_does_not_touch_cache() {
    let store = CountingStore::new();
    let server = spawn_test_server(store.clone()).await;
    let client = Client::new();

    client
        .put(format!("{}/cas/fresh", server.url))
        .body("v1")
        .send()
        .await
        .unwrap();
    assert_eq!(server.group.stats().gets, 0);

    // First read misses and loads from the store, second is a cache hit
    for _ in 0..2 {
        let response = client
            .get(format!("{}/cas/fresh", server.url))
            .send()
            .await
            .unwrap();
        assert_eq!(&response.bytes().await.unwrap()[..], b"v1");
    }
    assert_eq!(store.fetches(), 1);
    assert_eq!(server.group.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_concurrent_gets_fetch_backing_store_once() {
    let store = CountingStore::with_delay(Duration::from_millis(100));
    let server = spawn_test_server(store.clone()).await;
    let client = Client::new();

    client
        .put(format!("{}/cas/popular", server.url))
        .body("hot value")
        .send()
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let client = client.clone();
        let url = format!("{}/cas/popular", server.url);
        handles.push(tokio::spawn(async move {
            let response = client.get(url).send().await.unwrap();
            (response.status(), response.bytes().await.unwrap())
        }));
    }

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hot value");
    }
    assert_eq!(store.fetches(), 1);
}

#[tokio::test]
async fn test_absent_key_does_not_count_as_load_error() {
    let server = spawn_test_server(CountingStore::new()).await;

    Client::new()
        .get(format!("{}/cas/absentkey", server.url))
        .send()
        .await
        .unwrap();

    assert_eq!(server.group.stats().local_load_errs, 0);
}
