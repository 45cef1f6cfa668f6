// Cluster Tests
// Two cache servers routing reads to each other over the peer protocol


use bazelcache_server::{Peer, PeerSet, PeerSink, PeerUpdate};
use reqwest::{Client, StatusCode};
use test_helper::{CountingStore, bind, start};

/// First `cas/` key the ring on `from` routes to `owner`
fn key_owned_by(from: &test_helper::TestServer, owner: &str) -> String {
    let owner = Peer::parse(owner).unwrap();
    (0..1000)
        .map(|i| format!("cas/{:08x}", i))
        .find(|key| from.group.peers().pick_peer(key).as_ref() == Some(&owner))
        .expect("no key routes to owner")
}

#[tokio::test]
async fn test_read_through_owner_peer() {
    let store = CountingStore::new();
    let (listener_a, url_a) = bind().await;
    let (listener_b, url_b) = bind().await;

    let a = start(listener_a, &url_a, &[url_b.as_str()], store.clone()).await;
    let b = start(listener_b, &url_b, &[url_a.as_str()], store.clone()).await;

    let key = key_owned_by(&b, &url_a);
    let client = Client::new();

    let response = client
        .put(format!("{}/{}", a.url, key))
        .body("shared artifact")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/{}", b.url, key))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], b"shared artifact");

    assert!(a.group.stats().server_requests >= 1);
    assert_eq!(b.group.stats().peer_loads, 1);
    assert_eq!(store.fetches(), 1);
}

#[tokio::test]
async fn test_owner_caches_for_repeated_peer_reads() {
    let store = CountingStore::new();
    let (listener_a, url_a) = bind().await;
    let (listener_b, url_b) = bind().await;

    let a = start(listener_a, &url_a, &[url_b.as_str()], store.clone()).await;
    let b = start(listener_b, &url_b, &[url_a.as_str()], store.clone()).await;

    let key = key_owned_by(&b, &url_a);
    let client = Client::new();
    client
        .put(format!("{}/{}", b.url, key))
        .body("v")
        .send()
        .await
        .unwrap();

    // Read once through each instance; only the owner touches the store
    for url in [&a.url, &b.url] {
        let response = client
            .get(format!("{}/{}", url, key))
            .send()
            .await
            .unwrap();
        assert_eq!(&response.bytes().await.unwrap()[..], b"v");
    }
    assert_eq!(store.fetches(), 1);
}

#[tokio::test]
async fn test_absent_key_via_peer_returns_404() {
    let store = CountingStore::new();
    let (listener_a, url_a) = bind().await;
    let (listener_b, url_b) = bind().await;

    let _a = start(listener_a, &url_a, &[url_b.as_str()], store.clone()).await;
    let b = start(listener_b, &url_b, &[url_a.as_str()], store.clone()).await;

    let key = key_owned_by(&b, &url_a);
    let response = Client::new()
        .get(format!("{}/{}", b.url, key))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(b.group.stats().peer_errors, 0);
}

#[tokio::test]
async fn test_dead_owner_falls_back_to_store() {
    let store = CountingStore::new();
    let (listener_b, url_b) = bind().await;
    // Reserve an address, then drop it so nothing listens there
    let (dead_listener, dead_url) = bind().await;
    drop(dead_listener);

    let b = start(listener_b, &url_b, &[dead_url.as_str()], store.clone()).await;
    let key = key_owned_by(&b, &dead_url);
    let client = Client::new();

    client
        .put(format!("{}/{}", b.url, key))
        .body("still here")
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{}/{}", b.url, key))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.bytes().await.unwrap()[..], b"still here");
    assert_eq!(b.group.stats().peer_errors, 1);
}

#[tokio::test]
async fn test_membership_change_reroutes_keys() {
    let store = CountingStore::new();
    let (listener_a, url_a) = bind().await;
    let (listener_b, url_b) = bind().await;

    let _a = start(listener_a, &url_a, &[url_b.as_str()], store.clone()).await;
    let b = start(listener_b, &url_b, &[url_a.as_str()], store.clone()).await;
    let key = key_owned_by(&b, &url_a);

    // A leaves: B owns everything again
    let self_b = Peer::parse(&url_b).unwrap();
    assert!(b.group.set_peers(PeerUpdate {
        epoch: 2,
        peers: PeerSet::with_self(&self_b, std::iter::empty()),
    }));
    assert_eq!(b.group.peers().pick_peer(&key), None);

    // Stale update from before the departure is ignored
    let peer_a = Peer::parse(&url_a).unwrap();
    assert!(!b.group.set_peers(PeerUpdate {
        epoch: 1,
        peers: PeerSet::with_self(&self_b, [peer_a]),
    }));
    assert_eq!(b.group.peers().pick_peer(&key), None);
}
