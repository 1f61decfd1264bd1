//! Redirect handling over real sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use resilient_client::http::{DomainCheckRedirect, FlexibleRedirect, HyperTransport, NoRedirect};
use resilient_client::{Client, Error};

mod common;
use common::{start_programmable_backend, Reply, SeenRequest};

fn client() -> Client {
    Client::new(Arc::new(HyperTransport::new()))
}

fn location(to: String) -> Vec<(String, String)> {
    vec![("Location".to_string(), to)]
}

/// `/redirect-N` answers 307 to `/redirect-(N+1)`, forever.
async fn endless_redirects() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counted = hits.clone();
    let addr = start_programmable_backend(move |req: SeenRequest| {
        counted.fetch_add(1, Ordering::SeqCst);
        async move {
            let n: usize = req
                .path
                .trim_start_matches("/redirect-")
                .parse()
                .unwrap_or(0);
            let reply: Reply = (307, location(format!("/redirect-{}", n + 1)), String::new());
            reply
        }
    })
    .await;
    (addr, hits)
}

#[tokio::test]
async fn test_flexible_policy_stops_after_limit() {
    let (addr, hits) = endless_redirects().await;
    let mut client = client();
    client.set_redirect_policy(FlexibleRedirect::new(20));

    let err = client
        .get(format!("http://{addr}/redirect-1"))
        .send()
        .await
        .unwrap_err();

    assert!(
        err.to_string()
            .ends_with("/redirect-21\": stopped after 20 redirects"),
        "got {err}"
    );
    assert!(err.is_terminal());
    let response = err.response().expect("last redirect response");
    let history = response.redirect_history();
    assert_eq!(history.len(), 20);
    assert!(history[0].url.ends_with("/redirect-20"));
    assert_eq!(history[0].status, 307);
    assert!(history[19].url.ends_with("/redirect-1"));
    assert_eq!(hits.load(Ordering::SeqCst), 20);
}

#[tokio::test]
async fn test_limit_is_not_retried() {
    let (addr, hits) = endless_redirects().await;
    let mut client = client();
    client
        .set_redirect_policy(FlexibleRedirect::new(3))
        .set_retry_count(3);

    let err = client
        .get(format!("http://{addr}/redirect-1"))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(
        err.response().map(|r| r.redirect_history().len()),
        Some(3)
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_no_redirect_returns_the_3xx() {
    let (addr, hits) = endless_redirects().await;
    let mut client = client();
    client.set_redirect_policy(NoRedirect);

    let response = client
        .get(format!("http://{addr}/redirect-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 307);
    assert_eq!(response.header("location").unwrap(), "/redirect-2");
    assert!(response.redirect_history().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_domain_check_rejects_other_hosts() {
    let addr = start_programmable_backend(|req: SeenRequest| async move {
        let port = req
            .header("host")
            .and_then(|host| host.rsplit(':').next())
            .unwrap_or("80")
            .to_string();
        match req.path.as_str() {
            "/same" => (302, location(format!("http://127.0.0.1:{port}/done")), String::new()),
            "/other" => (302, location(format!("http://localhost:{port}/done")), String::new()),
            _ => (200, Vec::new(), "done".to_string()),
        }
    })
    .await;
    let mut client = client();
    client.set_redirect_policies(vec![
        Arc::new(FlexibleRedirect::new(5)),
        Arc::new(DomainCheckRedirect::new(["127.0.0.1"])),
    ]);

    let response = client
        .get(format!("http://{addr}/same"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text(), "done");
    assert_eq!(response.redirect_history().len(), 1);

    let err = client
        .get(format!("http://{addr}/other"))
        .send()
        .await
        .unwrap_err();
    match &err {
        Error::Response(inner) => assert!(matches!(
            inner.source.as_ref(),
            Error::RedirectNotAllowed { host } if host == "localhost"
        )),
        other => panic!("expected a policy rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_see_other_after_post_becomes_get() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let addr = start_programmable_backend(move |req: SeenRequest| {
        recorded.lock().unwrap().push(req.clone());
        async move {
            if req.path == "/submit" {
                (303, location("/result".to_string()), String::new())
            } else {
                (200, Vec::new(), "ok".to_string())
            }
        }
    })
    .await;

    let response = client()
        .post(format!("http://{addr}/submit"))
        .header("content-type", "text/plain")
        .body("form=1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.method(), &http::Method::GET);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].body, "form=1");
    assert_eq!(seen[1].method, "GET");
    assert_eq!(seen[1].body, "");
    assert!(seen[1].header("content-type").is_none());
}

#[tokio::test]
async fn test_temporary_redirect_replays_method_and_body() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let addr = start_programmable_backend(move |req: SeenRequest| {
        recorded.lock().unwrap().push(req.clone());
        async move {
            if req.path == "/old" {
                (307, location("/new".to_string()), String::new())
            } else {
                (201, Vec::new(), req.body)
            }
        }
    })
    .await;

    let response = client()
        .put(format!("http://{addr}/old"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    assert_eq!(response.text(), "payload");
    let seen = seen.lock().unwrap();
    assert_eq!(seen[1].method, "PUT");
    assert_eq!(seen[1].body, "payload");
}

#[tokio::test]
async fn test_single_use_body_cannot_follow_temporary_redirect() {
    let addr = start_programmable_backend(|_: SeenRequest| async move {
        (307, location("/again".to_string()), String::new())
    })
    .await;

    let err = client()
        .post(format!("http://{addr}/upload"))
        .body_once("chunk")
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BodyNotReplayable { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_cross_origin_redirect_drops_credentials() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let target = start_programmable_backend(move |req: SeenRequest| {
        recorded.lock().unwrap().push(req);
        async move { (200, Vec::new(), "landed".to_string()) }
    })
    .await;
    let origin = start_programmable_backend(move |_: SeenRequest| async move {
        (302, location(format!("http://{target}/landing")), String::new())
    })
    .await;

    let response = client()
        .get(format!("http://{origin}/start"))
        .header("authorization", "Bearer secret")
        .header("cookie", "session=1")
        .header("x-tenant", "acme")
        .send()
        .await
        .unwrap();

    assert_eq!(response.text(), "landed");
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].header("authorization").is_none());
    assert!(seen[0].header("cookie").is_none());
    assert_eq!(seen[0].header("x-tenant"), Some("acme"));
}

#[tokio::test]
async fn test_same_origin_redirect_keeps_credentials() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let addr = start_programmable_backend(move |req: SeenRequest| {
        recorded.lock().unwrap().push(req.clone());
        async move {
            if req.path == "/start" {
                (302, location("/landing".to_string()), String::new())
            } else {
                (200, Vec::new(), String::new())
            }
        }
    })
    .await;

    client()
        .get(format!("http://{addr}/start"))
        .header("authorization", "Bearer secret")
        .send()
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen[1].header("authorization"), Some("Bearer secret"));
}

#[tokio::test]
async fn test_redirect_without_location_is_final() {
    let addr = start_programmable_backend(|_: SeenRequest| async move {
        (302, Vec::new(), "moved, somewhere".to_string())
    })
    .await;

    let response = client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 302);
    assert_eq!(response.text(), "moved, somewhere");
}
