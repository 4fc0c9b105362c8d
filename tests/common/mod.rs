//! Shared helpers for the integration tests: a one-shot raw-TCP mock
//! HTTP server standing in for an LLM provider's `/chat/completions`
//! endpoint, since no HTTP-mocking crate is in `[dev-dependencies]`.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Spawns a mock server that accepts one connection, replies with
/// `status`/`body`, then closes. Returns the base url to point a
/// `ChatProvider` at.
pub async fn mock_http_server(status: u16, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = tokio::time::timeout(std::time::Duration::from_millis(500), socket.read(&mut buf)).await;
            let reason = if (200..300).contains(&status) { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{}", addr)
}

/// One SSE `data:` event carrying a plain content delta.
pub fn sse_content(text: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
        serde_json::to_string(text).unwrap()
    )
}

/// One SSE `data:` event carrying a single tool-call delta at index 0.
pub fn sse_tool_call(id: &str, name: &str, arguments: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"tool_calls\":[{{\"index\":0,\"id\":{},\"function\":{{\"name\":{},\"arguments\":{}}}}}]}}}}]}}\n\n",
        serde_json::to_string(id).unwrap(),
        serde_json::to_string(name).unwrap(),
        serde_json::to_string(arguments).unwrap(),
    )
}
