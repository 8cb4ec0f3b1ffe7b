//! End-to-end scenarios from the spec's §8 "Concrete end-to-end scenarios",
//! driven against real loopback sockets: a mock origin server and a real
//! `ConnectionHandler` serving the proxy side of the connection.

mod common;

use common::{get_request, post_request, send_request, test_state, MockOrigin};

/// Scenario 1: cache miss then hit. The origin is contacted exactly once;
/// a second identical request is served from the cache with the same
/// bytes, without a second origin connection.
#[tokio::test]
async fn cache_miss_then_hit_serves_second_request_from_cache() {
    let origin = MockOrigin::spawn().await;
    let state = test_state(2);

    let request = get_request("127.0.0.1", origin.addr.port(), "/abc");
    let first = send_request(state.clone(), &request).await;
    assert!(first.ends_with(b"abc"));
    assert_eq!(origin.accepted_count(), 1);

    let second = send_request(state.clone(), &request).await;
    assert_eq!(second, first);
    assert_eq!(
        origin.accepted_count(),
        1,
        "second identical GET must be served from cache without contacting the origin"
    );
}

/// Scenario 2: LRU eviction. Capacity 1: requesting `/a` then `/b` evicts
/// `/a`; requesting `/a` again must contact the origin a second time.
#[tokio::test]
async fn lru_eviction_forces_recontact_of_origin() {
    let origin = MockOrigin::spawn().await;
    let state = test_state(1);

    let req_a = get_request("127.0.0.1", origin.addr.port(), "/a");
    let req_b = get_request("127.0.0.1", origin.addr.port(), "/b");

    send_request(state.clone(), &req_a).await;
    assert_eq!(origin.accepted_count(), 1);

    send_request(state.clone(), &req_b).await;
    assert_eq!(origin.accepted_count(), 2);

    // `/a` was evicted to make room for `/b`; requesting it again must hit
    // the origin rather than a stale cache entry.
    send_request(state.clone(), &req_a).await;
    assert_eq!(origin.accepted_count(), 3);
}

/// Scenario 3: promotion. Capacity 2, requests `/a`, `/b`, then a
/// re-request of `/a` promotes it to MRU so that a subsequent `/c`
/// evicts `/b` (the now-LRU entry) instead of `/a`.
#[tokio::test]
async fn promotion_on_hit_changes_the_eviction_victim() {
    let origin = MockOrigin::spawn().await;
    let state = test_state(2);

    let req_a = get_request("127.0.0.1", origin.addr.port(), "/a");
    let req_b = get_request("127.0.0.1", origin.addr.port(), "/b");
    let req_c = get_request("127.0.0.1", origin.addr.port(), "/c");

    send_request(state.clone(), &req_a).await; // order: [a]
    send_request(state.clone(), &req_b).await; // order: [b, a]
    assert_eq!(origin.accepted_count(), 2);

    send_request(state.clone(), &req_a).await; // hit, promotes: order [a, b]
    assert_eq!(
        origin.accepted_count(),
        2,
        "re-requesting /a should be a cache hit, not a new origin contact"
    );

    send_request(state.clone(), &req_c).await; // evicts LRU victim b, order [c, a]
    assert_eq!(origin.accepted_count(), 3);

    // /b should now be gone; requesting it again must hit the origin.
    let req_b_again = get_request("127.0.0.1", origin.addr.port(), "/b");
    send_request(state.clone(), &req_b_again).await;
    assert_eq!(origin.accepted_count(), 4);

    // /a should still be cached.
    send_request(state.clone(), &req_a).await;
    assert_eq!(origin.accepted_count(), 4);
}

/// Scenario 5: a non-cacheable method is relayed without touching the
/// cache at all.
#[tokio::test]
async fn post_request_is_relayed_without_caching() {
    let origin = MockOrigin::spawn().await;
    let state = test_state(4);

    let request = post_request("127.0.0.1", origin.addr.port(), "/x");
    let response = send_request(state.clone(), &request).await;
    assert!(response.ends_with(b"x"));
    assert_eq!(origin.accepted_count(), 1);
    assert_eq!(state.cache.as_ref().unwrap().len(), 0);

    // Repeating the same POST must contact the origin again -- nothing
    // should have been memoized.
    send_request(state.clone(), &request).await;
    assert_eq!(origin.accepted_count(), 2);
}

/// Scenario 6: the origin advertises a larger `Content-Length` than it
/// actually sends before closing the connection. The client still
/// receives whatever bytes arrived; the partial response must not be
/// committed to the cache.
#[tokio::test]
async fn truncated_upstream_response_is_not_cached() {
    let origin = MockOrigin::spawn().await;
    let state = test_state(4);

    let request = get_request("127.0.0.1", origin.addr.port(), "/truncated");
    let response = send_request(state.clone(), &request).await;

    assert!(response.ends_with(b"partial"));
    assert_eq!(
        state.cache.as_ref().unwrap().len(),
        0,
        "a response that never reached its advertised Content-Length must not be cached"
    );
}

/// A request with an unsupported method is rejected with `501` before any
/// origin connection is attempted.
#[tokio::test]
async fn unsupported_method_is_rejected_with_501() {
    let origin = MockOrigin::spawn().await;
    let state = test_state(4);

    let request = format!(
        "DELETE http://127.0.0.1:{}/a HTTP/1.1\r\nHost: x\r\n\r\n",
        origin.addr.port()
    )
    .into_bytes();
    let response = send_request(state, &request).await;

    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.0 501"));
    assert_eq!(origin.accepted_count(), 0);
}

/// A malformed request (missing a header terminator, and the client
/// closing its write side) is rejected with `400`.
#[tokio::test]
async fn malformed_request_is_rejected_with_400() {
    let state = test_state(4);
    let response = send_request(state, b"not even close to a request line").await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.0 400"));
}
