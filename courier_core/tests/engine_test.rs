//! Transport engine against a local mock server.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use courier_core::{Callbacks, Engine, Progress, Request, TransportOptions, Upload};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(10);

fn engine() -> Engine {
    Engine::new(TransportOptions {
        connect_timeout: Duration::from_secs(2),
        transfer_timeout: Duration::from_secs(5),
        wait_ceiling: Duration::from_millis(50),
        ..Default::default()
    })
    .expect("engine starts")
}

fn done_channel() -> (UnboundedSender<bool>, UnboundedReceiver<bool>) {
    unbounded_channel()
}

fn report(tx: &UnboundedSender<bool>) -> impl FnOnce(bool) + Send + 'static {
    let tx = tx.clone();
    move |ok| {
        let _ = tx.send(ok);
    }
}

async fn next(rx: &mut UnboundedReceiver<bool>) -> bool {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("callback within timeout")
        .expect("channel open")
}

/// A local port with nothing listening on it.
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/collect")
}

// ---------------------------------------------------------------------------
// GET
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_fires_done_once_with_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collect"))
        .and(query_param("v", "1"))
        .and(query_param("dt", "Home page"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.get(
        &format!("{}/collect", server.uri()),
        [("v", "1"), ("dt", "Home page")],
        Callbacks::done(report(&tx)),
    );

    assert!(next(&mut rx).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "done must fire exactly once");
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_error_status_still_reports_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(Request::get(server.uri()).on_done(report(&tx)));

    assert!(next(&mut rx).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_refused_reports_failure() {
    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(Request::get(closed_port_url()).on_done(report(&tx)));

    assert!(!next(&mut rx).await);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let engine = Engine::new(TransportOptions {
        transfer_timeout: Duration::from_millis(200),
        wait_ceiling: Duration::from_millis(50),
        ..Default::default()
    })
    .expect("engine starts");
    let (tx, mut rx) = done_channel();
    engine.submit(Request::get(server.uri()).on_done(report(&tx)));

    assert!(!next(&mut rx).await);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_each_complete_once() {
    const K: usize = 20;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(K as u64)
        .mount(&server)
        .await;

    let engine = Arc::new(engine());
    let (tx, mut rx) = done_channel();
    let started = Instant::now();

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let tx = tx.clone();
            let uri = server.uri();
            std::thread::spawn(move || {
                for i in 0..K / 4 {
                    let id = (t * 100 + i).to_string();
                    engine.submit(Request::get(&uri).query("id", id).on_done(report(&tx)));
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().expect("submitter thread");
    }

    for _ in 0..K {
        assert!(next(&mut rx).await);
    }
    // Serially this would take K * 300ms.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(engine.in_flight(), 0);
}

// ---------------------------------------------------------------------------
// Response streaming and progress
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chunk_callback_receives_whole_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .mount(&server)
        .await;

    let engine = engine();
    let body = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&body);
    let (tx, mut rx) = done_channel();
    engine.submit(
        Request::get(server.uri())
            .on_chunk(move |chunk| {
                sink.lock().unwrap().extend_from_slice(chunk);
                true
            })
            .on_done(report(&tx)),
    );

    assert!(next(&mut rx).await);
    assert_eq!(body.lock().unwrap().as_slice(), b"hello world");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chunk_callback_can_abort() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("abort me"))
        .mount(&server)
        .await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(
        Request::get(server.uri())
            .on_chunk(|_| false)
            .on_done(report(&tx)),
    );

    assert!(!next(&mut rx).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_reaches_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let engine = engine();
    let last = Arc::new(Mutex::new(Progress::default()));
    let seen = Arc::clone(&last);
    let (tx, mut rx) = done_channel();
    engine.submit(
        Request::get(server.uri())
            .on_progress(move |p| *seen.lock().unwrap() = p)
            .on_done(report(&tx)),
    );

    assert!(next(&mut rx).await);
    assert_eq!(*last.lock().unwrap(), Progress { upload: 1000, download: 1000 });
}

// ---------------------------------------------------------------------------
// POST
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn raw_body_post_sends_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .and(header("content-type", "text/plain"))
        .and(body_string("v=1&t=event\nv=1&t=pageview\n"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(
        Request::post(format!("{}/batch", server.uri()))
            .body("text/plain", "v=1&t=event\nv=1&t=pageview\n")
            .on_done(report(&tx)),
    );

    assert!(next(&mut rx).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn basic_auth_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(
        Request::get(server.uri())
            .basic_auth("user", Some("pass".into()))
            .on_done(report(&tx)),
    );

    assert!(next(&mut rx).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multipart_post_streams_memory_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("name=\"comment\""))
        .and(body_string_contains("nightly report"))
        .and(body_string_contains("filename=\"report.txt\""))
        .and(body_string_contains("line one\nline two\n"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::new(TransportOptions {
        upload_chunk_size: 4,
        wait_ceiling: Duration::from_millis(50),
        ..Default::default()
    })
    .expect("engine starts");
    let upload = Upload::memory("file", "report.txt", "text/plain", "line one\nline two\n");
    let (tx, mut rx) = done_channel();
    engine.post(
        &format!("{}/upload", server.uri()),
        [("comment", "nightly report")],
        vec![upload],
        Callbacks::done(report(&tx)),
    );

    assert!(next(&mut rx).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multipart_post_streams_file_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("filename=\"crash.log\""))
        .and(body_string_contains("segfault at 0x0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("crash.log");
    std::fs::write(&file, "segfault at 0x0").expect("write");

    let engine = engine();
    let upload = Upload::file("log", &file, "text/plain").expect("open upload");
    let (tx, mut rx) = done_channel();
    engine.post(
        &server.uri(),
        Vec::<(String, String)>::new(),
        vec![upload],
        Callbacks::done(report(&tx)),
    );

    assert!(next(&mut rx).await);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drop_abandons_outstanding_requests_without_callbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let engine = engine();
    let fired = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let fired = Arc::clone(&fired);
        engine.submit(Request::get(server.uri()).on_done(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        }));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.in_flight(), 3);

    let started = Instant::now();
    drop(engine);
    assert!(started.elapsed() < Duration::from_secs(2), "drop must not wait for transfers");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_done_callback_does_not_kill_worker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = engine();
    engine.submit(Request::get(server.uri()).on_done(|_| panic!("callback bug")));

    let (tx, mut rx) = done_channel();
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.submit(Request::get(server.uri()).on_done(report(&tx)));

    assert!(next(&mut rx).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_progress_callback_does_not_kill_worker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .mount(&server)
        .await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(
        Request::get(server.uri())
            .on_progress(|_| panic!("progress bug"))
            .on_done(report(&tx)),
    );
    assert!(next(&mut rx).await, "the transfer itself still completes");

    engine.submit(Request::get(server.uri()).on_done(report(&tx)));
    assert!(next(&mut rx).await);
    assert_eq!(engine.in_flight(), 0);
}

// ---------------------------------------------------------------------------
// Redirects
// ---------------------------------------------------------------------------

/// Mounts `/chain/0 -> /chain/1 -> ... -> /chain/<hops>`, the last answering 200.
async fn mount_redirect_chain(server: &MockServer, hops: usize) -> String {
    for hop in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/chain/{hop}")))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/chain/{}", server.uri(), hop + 1)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/chain/{hops}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    format!("{}/chain/0", server.uri())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn five_redirects_are_followed() {
    let server = MockServer::start().await;
    let url = mount_redirect_chain(&server, 5).await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(Request::get(url).on_done(report(&tx)));

    assert!(next(&mut rx).await);
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sixth_redirect_fails_the_transfer() {
    let server = MockServer::start().await;
    let url = mount_redirect_chain(&server, 6).await;

    let engine = engine();
    let (tx, mut rx) = done_channel();
    engine.submit(Request::get(url).on_done(report(&tx)));

    assert!(!next(&mut rx).await);
}
