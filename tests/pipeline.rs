//! End-to-end behaviour of the request pipeline over a scripted transport.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http::header::HeaderValue;
use resilient_client::http::X_REQUEST_ID;
use resilient_client::{
    CallContext, CancelToken, Client, Error, PanicPolicy, Request, Response, TransportErrorKind,
};

mod common;
use common::MockTransport;

const URL: &str = "http://mock.test/resource";

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn client(transport: Arc<MockTransport>) -> Client {
    let mut client = Client::new(transport);
    client.set_retry_wait_time(ms(1)).set_retry_max_wait_time(ms(5));
    client
}

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

#[tokio::test]
async fn test_exhausted_retries_return_last_response() {
    let transport = MockTransport::always(503);
    let mut client = client(transport.clone());
    client.set_retry_count(3);

    let response = client.get(URL).send().await.unwrap();

    assert_eq!(response.status(), 503);
    assert_eq!(response.attempt(), 4);
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let transport = MockTransport::statuses(&[503, 502, 200]);
    let mut client = client(transport.clone());
    client.set_retry_count(5);

    let response = client.get(URL).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.attempt(), 3);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_single_attempt_surfaces_raw_transport_error() {
    let transport = MockTransport::refusing();
    let client = client(transport.clone());

    let err = client.get(URL).send().await.unwrap_err();

    match err {
        Error::Transport(inner) => assert_eq!(inner.kind(), TransportErrorKind::Connect),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_retry_hooks_run_between_attempts_only() {
    let transport = MockTransport::always(500);
    let mut client = client(transport.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    client.set_retry_count(2).add_retry_hook(move |event| {
        recorded
            .lock()
            .unwrap()
            .push((event.attempt, event.max_attempts, event.response.map(|r| r.status())));
    });

    client.get(URL).send().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2, "no hook after the final attempt");
    assert_eq!(seen[0].0, 1);
    assert_eq!(seen[1].0, 2);
    assert!(seen.iter().all(|(_, max, status)| *max == 3 && *status == Some(http::StatusCode::INTERNAL_SERVER_ERROR)));
}

#[tokio::test]
async fn test_not_implemented_is_not_retried() {
    let transport = MockTransport::always(501);
    let mut client = client(transport.clone());
    client.set_retry_count(3);

    let response = client.get(URL).send().await.unwrap();

    assert_eq!(response.status(), 501);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_custom_condition_without_defaults() {
    let transport = MockTransport::statuses(&[404, 503, 200]);
    let mut client = client(transport.clone());
    client
        .set_retry_count(3)
        .set_default_retry_conditions(false)
        .add_retry_condition(|response, _| response.is_some_and(|r| r.status() == 404));

    let response = client.get(URL).send().await.unwrap();

    // 404 retried by the custom condition; 503 is not, with defaults off.
    assert_eq!(response.status(), 503);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_per_request_retry_override() {
    let transport = MockTransport::always(503);
    let client = client(transport.clone());

    let response = client.get(URL).retry_count(2).send().await.unwrap();

    assert_eq!(response.attempt(), 3);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_idempotent_only_skips_post_retries() {
    let transport = MockTransport::always(503);
    let mut client = client(transport.clone());
    client.set_retry_count(3).set_retry_idempotent_only(true);

    client.post(URL).body("payload").send().await.unwrap();
    assert_eq!(transport.call_count(), 1);

    client.put(URL).body("payload").send().await.unwrap();
    assert_eq!(transport.call_count(), 5);
}

#[tokio::test]
async fn test_retry_after_is_capped_by_max_wait() {
    let transport = MockTransport::new(|_, index| {
        if index == 0 {
            Ok(common::retry_after(429, 30))
        } else {
            Ok(common::response(200))
        }
    });
    let mut client = client(transport.clone());
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();
    client
        .set_retry_count(1)
        .set_retry_max_wait_time(ms(40))
        .add_retry_hook(move |event| recorded.lock().unwrap().push(event.delay));

    let started = Instant::now();
    let response = client.get(URL).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(*delays.lock().unwrap(), vec![ms(40)]);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancel_during_backoff_is_terminal() {
    let transport = MockTransport::always(500);
    let mut client = client(transport.clone());
    client
        .set_retry_count(5)
        .set_retry_wait_time(Duration::from_secs(10))
        .set_retry_max_wait_time(Duration::from_secs(10));

    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = client
        .get(URL)
        .context(CallContext::new().with_token(token))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Canceled), "got {err:?}");
    assert!(err.is_terminal());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_attempt() {
    let transport = MockTransport::always(200);
    let client = client(transport.clone());
    let token = CancelToken::new();
    token.cancel();

    let err = client
        .get(URL)
        .context(CallContext::new().with_token(token))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Canceled));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_call_deadline_aborts_in_flight_attempt() {
    let transport = MockTransport::slow(Duration::from_secs(5), |_, _| Ok(common::response(200)));
    let mut client = client(transport.clone());
    client.set_retry_count(3).set_timeout(ms(50));

    let started = Instant::now();
    let err = client.get(URL).send().await.unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded { .. }), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_attempt_timeout_is_retryable() {
    let transport = MockTransport::slow(Duration::from_secs(5), |_, _| Ok(common::response(200)));
    let mut client = client(transport.clone());
    client.set_retry_count(1).set_attempt_timeout(ms(20));

    let err = client.get(URL).send().await.unwrap_err();

    assert!(matches!(err, Error::AttemptTimeout { .. }), "got {err:?}");
    assert!(err.is_connection_error());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_client_shutdown_cancels_calls() {
    let transport = MockTransport::always(200);
    let client = client(transport.clone());
    client.shutdown();

    let err = client.get(URL).send().await.unwrap_err();

    assert!(client.is_shut_down());
    assert!(matches!(err, Error::Canceled));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_single_use_body_fails_fast_on_retry() {
    let transport = MockTransport::always(503);
    let mut client = client(transport.clone());
    client.set_retry_count(3);

    let err = client
        .post(URL)
        .body_once("stream-chunk")
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BodyNotReplayable { .. }), "got {err:?}");
    assert_eq!(transport.call_count(), 1);
    assert_eq!(
        transport.last_call().unwrap().body.as_deref(),
        Some(&b"stream-chunk"[..])
    );
}

#[tokio::test]
async fn test_buffered_body_is_replayed() {
    let transport = MockTransport::statuses(&[503, 503, 201]);
    let mut client = client(transport.clone());
    client.set_retry_count(2);

    let response = client.post(URL).body("same bytes").send().await.unwrap();

    assert_eq!(response.status(), 201);
    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls
        .iter()
        .all(|call| call.body.as_deref() == Some(&b"same bytes"[..])));
}

#[tokio::test]
async fn test_trace_id_is_stable_across_attempts() {
    let transport = MockTransport::statuses(&[503, 503, 200]);
    let mut client = client(transport.clone());
    client.set_retry_count(2);

    let response = client.get(URL).send().await.unwrap();

    let expected = response.trace_id().to_string();
    for call in transport.calls() {
        assert_eq!(call.headers.get_all(&X_REQUEST_ID).iter().count(), 1);
        assert_eq!(call.headers[&X_REQUEST_ID], expected.as_str());
    }
}

#[tokio::test]
async fn test_client_headers_not_duplicated_on_retry() {
    let transport = MockTransport::statuses(&[500, 500, 200]);
    let mut client = client(transport.clone());
    client.set_retry_count(2);
    client.set_header("x-api-key", "secret").unwrap();

    client.get(URL).send().await.unwrap();

    assert_eq!(transport.call_count(), 3);
    for call in transport.calls() {
        assert_eq!(call.headers.get_all("x-api-key").iter().count(), 1);
    }
}

#[tokio::test]
async fn test_relative_path_joins_base_url() {
    let transport = MockTransport::always(200);
    let mut client = client(transport.clone());
    client.set_base_url("http://api.test/v1/").unwrap();

    let response = client.get("/users").send().await.unwrap();

    assert_eq!(response.url().as_str(), "http://api.test/v1/users");
    assert_eq!(transport.last_call().unwrap().url.as_str(), "http://api.test/v1/users");
}

#[tokio::test]
async fn test_request_middleware_runs_in_registration_order() {
    let transport = MockTransport::always(200);
    let mut client = client(transport.clone());
    client
        .add_request_middleware(|_: &Client, req: &mut Request| -> resilient_client::Result<()> {
            req.headers_mut().append("x-order", HeaderValue::from_static("first"));
            Ok(())
        })
        .add_request_middleware(|_: &Client, req: &mut Request| -> resilient_client::Result<()> {
            req.headers_mut().append("x-order", HeaderValue::from_static("second"));
            Ok(())
        });

    client.get(URL).send().await.unwrap();

    let call = transport.last_call().unwrap();
    let order: Vec<_> = call.headers.get_all("x-order").iter().collect();
    assert_eq!(order, vec!["first", "second"]);
}

#[tokio::test]
async fn test_request_middleware_error_aborts_before_dispatch() {
    let transport = MockTransport::always(200);
    let mut client = client(transport.clone());
    let reached = counter();
    let reached_in = reached.clone();
    let errors = counter();
    let errors_in = errors.clone();
    client
        .add_request_middleware(|_: &Client, _: &mut Request| -> resilient_client::Result<()> {
            Err(Error::middleware("signing key unavailable"))
        })
        .add_request_middleware(move |_: &Client, _: &mut Request| -> resilient_client::Result<()> {
            reached_in.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .on_error(move |_, _| {
            errors_in.fetch_add(1, Ordering::SeqCst);
        });

    let err = client.get(URL).send().await.unwrap_err();

    assert_eq!(err.to_string(), "signing key unavailable");
    assert_eq!(reached.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_response_middleware_error_keeps_response() {
    let transport = MockTransport::new(|_, _| Ok(common::response_with_body(200, "{\"ok\":false}")));
    let mut client = client(transport.clone());
    client.add_response_middleware(
        |_: &Client, resp: &mut Response| -> resilient_client::Result<()> {
            if resp.text().contains("\"ok\":false") {
                return Err(Error::middleware("payload rejected"));
            }
            Ok(())
        },
    );

    let err = client.get(URL).send().await.unwrap_err();

    assert_eq!(err.to_string(), "payload rejected");
    let response = err.response().expect("response travels with the error");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "{\"ok\":false}");
}

#[tokio::test]
async fn test_success_and_error_hooks_are_exclusive() {
    let transport = MockTransport::statuses(&[200]);
    let mut client = client(transport.clone());
    let successes = counter();
    let errors = counter();
    let panics = counter();
    let (s, e, p) = (successes.clone(), errors.clone(), panics.clone());
    client
        .on_success(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_, _| {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .on_panic(move |_, _| {
            p.fetch_add(1, Ordering::SeqCst);
        });

    client.get(URL).send().await.unwrap();
    client.get("http://[broken").send().await.unwrap_err();

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(panics.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_error_status_counts_as_success() {
    let transport = MockTransport::always(404);
    let mut client = client(transport);
    let successes = counter();
    let s = successes.clone();
    client.on_success(move |_, response| {
        assert_eq!(response.status(), 404);
        s.fetch_add(1, Ordering::SeqCst);
    });

    let response = client.get(URL).send().await.unwrap();

    assert!(response.is_error());
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}

fn panicking_client(transport: Arc<MockTransport>) -> (Client, [Arc<AtomicU32>; 3]) {
    let mut client = client(transport);
    let counters = [counter(), counter(), counter()];
    let (s, e, p) = (counters[0].clone(), counters[1].clone(), counters[2].clone());
    client
        .set_retry_count(3)
        .add_request_middleware(|_: &Client, _: &mut Request| -> resilient_client::Result<()> {
            panic!("middleware exploded")
        })
        .on_success(move |_, _| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_, _| {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .on_panic(move |_, err| {
            assert!(err.is_panic());
            p.fetch_add(1, Ordering::SeqCst);
        });
    (client, counters)
}

#[tokio::test]
async fn test_panic_is_captured_and_reported_once() {
    let transport = MockTransport::always(200);
    let (client, [successes, errors, panics]) = panicking_client(transport.clone());

    let err = client.get(URL).send().await.unwrap_err();

    match &err {
        Error::Panicked { message } => assert_eq!(message, "middleware exploded"),
        other => panic!("expected panic error, got {other:?}"),
    }
    assert_eq!(panics.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(transport.call_count(), 0, "a panic is never retried");
}

#[tokio::test]
async fn test_panic_resumes_after_hooks() {
    let transport = MockTransport::always(200);
    let (mut client, [_, errors, panics]) = panicking_client(transport);
    client.set_panic_policy(PanicPolicy::Resume);

    let handle = tokio::spawn(async move { client.get(URL).send().await });
    let join = handle.await.unwrap_err();

    assert!(join.is_panic());
    assert_eq!(panics.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_identical_runs_have_identical_side_effects() {
    let first = MockTransport::statuses(&[503, 200]);
    let second = MockTransport::statuses(&[503, 200]);

    for transport in [first.clone(), second.clone()] {
        let mut client = client(transport);
        client.set_retry_count(2);
        client.set_header("accept", "application/json").unwrap();
        client.get(URL).send().await.unwrap();
    }

    assert_eq!(first.call_count(), second.call_count());
    let header_counts = |transport: &MockTransport| -> Vec<usize> {
        transport
            .calls()
            .iter()
            .map(|call| call.headers.len())
            .collect()
    };
    assert_eq!(header_counts(&*first), header_counts(&*second));
}
