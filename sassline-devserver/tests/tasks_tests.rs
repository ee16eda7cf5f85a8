//! End-to-end task runs against a temporary project: compile, watch, serve.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sassline_core::{BuildConfig, TaskName, TaskRegistry};
use sassline_devserver::{run_in, tasks, DevError, ReloadMessage, Runner, TaskContext};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const APP_SCSS: &str = "@use \"partials/vars\";\n.header { color: vars.$brand; .title { font-weight: bold; } }\n";
const RTL_SCSS: &str = "@use \"partials/vars\";\n.header { direction: rtl; color: vars.$brand; }\n";
const INDEX_HTML: &str =
    "<html><head><link rel=\"stylesheet\" href=\"/css/app.css\"></head><body><h1>hi</h1></body></html>";

fn project() -> TempDir {
    let root = TempDir::new().expect("tempdir");
    let sass = root.path().join("sass");
    fs::create_dir_all(sass.join("partials")).expect("mkdir");
    fs::write(sass.join("app.scss"), APP_SCSS).expect("app");
    fs::write(sass.join("app.rtl.scss"), RTL_SCSS).expect("rtl");
    fs::write(sass.join("partials/_vars.scss"), "$brand: #336699;\n").expect("vars");
    root
}

fn test_config() -> BuildConfig {
    let mut config = BuildConfig::default();
    config.server.port = 0;
    config.watch.debounce_ms = 200;
    config
}

fn runner(root: &Path) -> Runner {
    let ctx = Arc::new(TaskContext::new(root, test_config()));
    Runner::new(TaskRegistry::builtin(), ctx)
}

fn output_files(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root.join("css")) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

async fn stop(runner: &Runner) {
    runner.context().shutdown();
    runner
        .context()
        .join_background()
        .await
        .expect("background tasks exit cleanly");
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("send");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    response
}

// ---------------------------------------------------------------------------
// sass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sass_writes_two_stylesheets_and_two_maps() {
    let root = project();
    let runner = runner(root.path());

    let report = runner.run(&TaskName::from("sass")).await.expect("run");

    assert!(!report.long_running);
    assert_eq!(
        output_files(root.path()),
        vec!["app.css", "app.css.map", "app.rtl.css", "app.rtl.css.map"]
    );
}

#[tokio::test]
async fn broken_rtl_still_builds_ltr() {
    let root = project();
    fs::write(root.path().join("sass/app.rtl.scss"), ".header { direction: ; ").expect("break");
    let ctx = TaskContext::new(root.path(), test_config());

    let summary = tasks::sass(&ctx).await;

    assert_eq!(summary.compiled, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(output_files(root.path()), vec!["app.css", "app.css.map"]);
}

#[tokio::test]
async fn compiled_stylesheets_are_pushed_to_clients() {
    let root = project();
    let ctx = TaskContext::new(root.path(), test_config());
    let mut client = ctx.reload.subscribe();

    tasks::sass(&ctx).await;

    let mut pushed = Vec::new();
    for _ in 0..2 {
        let message = timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("push within timeout")
            .expect("message");
        assert!(matches!(message, ReloadMessage::Inject { .. }), "got: {message:?}");
        pushed.extend(message.paths().to_vec());
    }
    pushed.sort();
    assert_eq!(pushed, vec!["/css/app.css", "/css/app.rtl.css"]);
}

// ---------------------------------------------------------------------------
// default / watch
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn default_compiles_and_watches_without_a_socket() {
    let root = project();
    let runner = runner(root.path());

    let report = runner.run(&TaskName::from("default")).await.expect("run");

    assert!(report.long_running, "watcher keeps running");
    assert_eq!(report.stage_of("sass"), Some(0));
    assert_eq!(report.stage_of("watch"), Some(0));
    assert_eq!(report.stage_of("default"), Some(1));
    assert_eq!(report.stage_of("serve"), None);
    assert!(runner.context().server_addr().is_none());
    assert_eq!(output_files(root.path()).len(), 4);

    stop(&runner).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn html_change_sends_exactly_one_reload_and_compiles_nothing() {
    let root = project();
    let runner = runner(root.path());
    runner.run(&TaskName::from("watch")).await.expect("run");
    let mut client = runner.context().reload.subscribe();

    fs::write(root.path().join("index.html"), INDEX_HTML).expect("write html");

    let message = timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("reload within timeout")
        .expect("message");
    assert_eq!(
        message,
        ReloadMessage::Reload {
            paths: vec!["/index.html".to_string()]
        }
    );
    assert!(
        timeout(Duration::from_millis(600), client.recv()).await.is_err(),
        "a single save must produce a single reload"
    );
    assert!(output_files(root.path()).is_empty(), "no stylesheet work");

    stop(&runner).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_change_recompiles_both_entry_points() {
    let root = project();
    let runner = runner(root.path());
    runner.run(&TaskName::from("watch")).await.expect("run");
    let mut client = runner.context().reload.subscribe();

    fs::write(
        root.path().join("sass/partials/_vars.scss"),
        "$brand: #993366;\n",
    )
    .expect("edit partial");

    let mut pushed = Vec::new();
    while pushed.len() < 2 {
        let message = timeout(Duration::from_secs(10), client.recv())
            .await
            .expect("push within timeout")
            .expect("message");
        pushed.extend(message.paths().to_vec());
    }
    pushed.sort();
    assert_eq!(pushed, vec!["/css/app.css", "/css/app.rtl.css"]);

    for css in ["app.css", "app.rtl.css"] {
        let body = fs::read_to_string(root.path().join("css").join(css)).expect("read css");
        assert!(body.contains("#936") || body.contains("#993366"), "{css}: {body}");
    }

    stop(&runner).await;
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serve_binds_after_prerequisites_and_injects_client() {
    let root = project();
    fs::write(root.path().join("index.html"), INDEX_HTML).expect("write html");
    let runner = runner(root.path());

    let report = runner.run(&TaskName::from("serve")).await.expect("run");

    let serve_stage = report.stage_of("serve").expect("serve ran");
    for prerequisite in ["sass", "html", "watch"] {
        assert!(
            report.stage_of(prerequisite).expect("prerequisite ran") < serve_stage,
            "{prerequisite} must settle before serve"
        );
    }
    assert_eq!(output_files(root.path()).len(), 4);

    let addr = runner.context().server_addr().expect("server bound");

    let page = http_get(addr, "/index.html").await;
    assert!(page.starts_with("HTTP/1.1 200"), "got: {page}");
    assert!(page.contains("<script src=\"/__sassline/client.js\" async></script></body>"));
    assert!(page.to_ascii_lowercase().contains("cache-control: no-cache"));

    let css = http_get(addr, "/css/app.css").await;
    assert!(css.starts_with("HTTP/1.1 200"), "got: {css}");
    assert!(css.contains("sourceMappingURL=app.css.map"));

    let client = http_get(addr, "/__sassline/client.js").await;
    assert!(client.contains("/__sassline/ws"));

    fs::write(root.path().join("my page.html"), INDEX_HTML).expect("write spaced page");
    let spaced = http_get(addr, "/my%20page.html").await;
    assert!(spaced.starts_with("HTTP/1.1 200"), "got: {spaced}");
    assert!(spaced.contains("/__sassline/client.js"), "escaped page URLs get the client too");

    let missing = http_get(addr, "/nope.html").await;
    assert!(missing.starts_with("HTTP/1.1 404"), "got: {missing}");

    stop(&runner).await;
    assert!(
        TcpStream::connect(addr).await.is_err(),
        "listener closes on shutdown"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn occupied_port_fails_serve_and_stops_the_watcher() {
    let root = project();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").expect("hold a port");
    let mut config = test_config();
    config.server.port = taken.local_addr().expect("addr").port();
    let ctx = Arc::new(TaskContext::new(root.path(), config));

    let err = timeout(
        Duration::from_secs(10),
        run_in(ctx.clone(), TaskName::from("serve")),
    )
    .await
    .expect("abort within timeout")
    .unwrap_err();

    assert!(matches!(err, DevError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("tcp://127.0.0.1:"), "got: {err}");
    assert!(!ctx.has_background(), "watcher is joined on abort");
    assert!(ctx.server_addr().is_none());
}
