//! Static file server with live-reload transport.
//!
//! Routes:
//! - `GET /__sassline/client.js`: reload client script
//! - `GET /__sassline/ws`: WebSocket streaming [`ReloadMessage`] JSON
//! - anything else: files under the base directory; HTML pages get the
//!   client `<script>` injected.

use std::path::{Component, Path, PathBuf};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::{io_err, DevError};
use crate::reload::{ReloadMessage, ReloadSession};

pub const CLIENT_ROUTE: &str = "/__sassline/client.js";
pub const WS_ROUTE: &str = "/__sassline/ws";

const CLIENT_SCRIPT: &str = r#"(function () {
  var scheme = location.protocol === "https:" ? "wss://" : "ws://";
  function swap(paths) {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    Array.prototype.forEach.call(links, function (link) {
      var url = new URL(link.href, location.href);
      if (paths.indexOf(url.pathname) !== -1) {
        url.searchParams.set("sassline", Date.now().toString());
        link.href = url.toString();
      }
    });
  }
  function connect() {
    var socket = new WebSocket(scheme + location.host + "/__sassline/ws");
    socket.onmessage = function (event) {
      var message = JSON.parse(event.data);
      if (message.kind === "inject") {
        swap(message.paths);
      } else {
        location.reload();
      }
    };
    socket.onclose = function () {
      setTimeout(connect, 1000);
    };
  }
  connect();
})();
"#;

#[derive(Clone)]
struct ServerState {
    base_dir: PathBuf,
    reload: ReloadSession,
}

/// Build the dev-server router for `base_dir`.
pub fn router(base_dir: PathBuf, reload: ReloadSession) -> Router {
    Router::new()
        .route(CLIENT_ROUTE, get(client_script))
        .route(WS_ROUTE, get(reload_socket))
        .fallback(serve_asset)
        .with_state(ServerState { base_dir, reload })
}

/// Bind the listening socket. Port `0` picks an ephemeral port.
pub async fn bind(addr: &str) -> Result<TcpListener, DevError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(format!("tcp://{addr}"), e))
}

/// Serve until the shutdown channel fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DevError> {
    let addr = listener
        .local_addr()
        .map_err(|e| io_err("tcp listener", e))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(format!("http://{addr}"), e))
}

async fn client_script() -> impl IntoResponse {
    no_cache(
        (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/javascript; charset=utf-8"),
            )],
            CLIENT_SCRIPT,
        )
            .into_response(),
    )
}

async fn reload_socket(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = reload_loop(socket, state.reload).await {
            tracing::debug!(error = %err, "reload client dropped");
        }
    })
}

async fn reload_loop(mut socket: WebSocket, reload: ReloadSession) -> Result<(), axum::Error> {
    let mut rx = reload.subscribe();
    tracing::info!(clients = reload.client_count(), "browser connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            message = rx.recv() => {
                let message = match message {
                    Ok(message) => message,
                    // Missed updates; a full reload catches the page up.
                    Err(RecvError::Lagged(_)) => ReloadMessage::Reload { paths: Vec::new() },
                    Err(RecvError::Closed) => break,
                };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to encode reload message");
                        continue;
                    }
                };
                socket.send(Message::Text(text)).await?;
            }
        }
    }

    tracing::info!(clients = reload.client_count().saturating_sub(1), "browser disconnected");
    Ok(())
}

async fn serve_asset(State(state): State<ServerState>, request: Request) -> Response {
    if let Some(page) = html_target(&state.base_dir, request.uri().path()) {
        match tokio::fs::read_to_string(&page).await {
            Ok(html) => return no_cache(Html(inject_client(&html)).into_response()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %page.display(), error = %err, "failed to read page");
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
        }
    }

    match ServeDir::new(&state.base_dir).oneshot(request).await {
        Ok(response) => no_cache(response.into_response()),
        Err(never) => match never {},
    }
}

/// File backing an HTML request, if the URL names a page.
///
/// Segments are percent-decoded. Directory URLs (trailing `/`) resolve to
/// `index.html`. URLs that try to climb out of the base directory yield
/// `None` and fall through to the static service, which rejects them.
pub fn html_target(base_dir: &Path, uri_path: &str) -> Option<PathBuf> {
    let mut file = base_dir.to_path_buf();
    for segment in uri_path.split('/').filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(segment).decode_utf8().ok()?;
        let mut components = Path::new(decoded.as_ref()).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => file.push(part),
            _ => return None,
        }
    }

    if uri_path.ends_with('/') {
        file.push("index.html");
    }

    let is_html = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        .unwrap_or(false);
    is_html.then_some(file)
}

/// Insert the reload client before the last `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script src="{CLIENT_ROUTE}" async></script>"#);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{html}{tag}"),
    }
}

fn no_cache(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_goes_before_closing_body() {
        let page = inject_client("<html><body><h1>hi</h1></BODY></html>");
        assert_eq!(
            page,
            r#"<html><body><h1>hi</h1><script src="/__sassline/client.js" async></script></BODY></html>"#
        );
    }

    #[test]
    fn script_is_appended_without_body() {
        let page = inject_client("<p>fragment</p>");
        assert!(page.starts_with("<p>fragment</p><script"));
    }

    #[test]
    fn html_target_resolves_pages_and_directories() {
        let base = Path::new("/site");
        assert_eq!(
            html_target(base, "/index.html"),
            Some(PathBuf::from("/site/index.html"))
        );
        assert_eq!(
            html_target(base, "/"),
            Some(PathBuf::from("/site/index.html"))
        );
        assert_eq!(
            html_target(base, "/docs/"),
            Some(PathBuf::from("/site/docs/index.html"))
        );
        assert_eq!(html_target(base, "/css/app.css"), None);
    }

    #[test]
    fn html_target_decodes_escaped_segments() {
        assert_eq!(
            html_target(Path::new("/site"), "/my%20page.html"),
            Some(PathBuf::from("/site/my page.html"))
        );
        assert_eq!(
            html_target(Path::new("/site"), "/caf%C3%A9/"),
            Some(PathBuf::from("/site/café/index.html"))
        );
    }

    #[test]
    fn html_target_refuses_parent_segments() {
        assert_eq!(html_target(Path::new("/site"), "/../secret.html"), None);
        assert_eq!(html_target(Path::new("/site"), "/%2E%2E/secret.html"), None);
        assert_eq!(html_target(Path::new("/site"), "/a%2F..%2Fsecret.html"), None);
    }
}
