//! In-process MCP server stand-in for tests.

use crate::transport::Transport;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub(crate) type Handler =
    Box<dyn Fn(&str, Option<Value>) -> Option<Result<Value, (i64, String)>> + Send + Sync>;

/// Serve requests from `handler` over an in-memory pipe. Requests the handler
/// doesn't know get "method not found"; notifications get no reply.
pub(crate) fn fake_server(name: &str, handler: Handler) -> Transport {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(client);

    tokio::spawn(async move {
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            let Some(id) = msg.get("id").cloned() else {
                continue;
            };
            let method = msg["method"].as_str().unwrap_or_default().to_string();
            let reply = match handler(&method, msg.get("params").cloned()) {
                Some(Ok(result)) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                Some(Err((code, message))) => {
                    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
                }
                None => json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": format!("Method not found: {}", method)}
                }),
            };
            let mut out = serde_json::to_vec(&reply).unwrap();
            out.push(b'\n');
            if server_write.write_all(&out).await.is_err() {
                break;
            }
        }
    });

    Transport::from_streams(name, read, write)
}

/// A small MCP server: `initialize`, paginated `tools/list` (two tools per
/// page), and `tools/call` for `echo` and `broken`.
pub(crate) fn mcp_handler(tool_names: &[&str]) -> Handler {
    let tools: Vec<Value> = tool_names
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "description": format!("{} tool", name),
                "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
            })
        })
        .collect();

    Box::new(move |method: &str, params: Option<Value>| match method {
        "initialize" => Some(Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fake", "version": "0.0.1"}
        }))),
        "tools/list" => {
            let start = params
                .as_ref()
                .and_then(|p| p.get("cursor"))
                .and_then(Value::as_str)
                .and_then(|c| c.parse::<usize>().ok())
                .unwrap_or(0);
            let end = (start + 2).min(tools.len());
            let mut result = json!({"tools": tools[start..end].to_vec()});
            if end < tools.len() {
                result["nextCursor"] = json!(end.to_string());
            }
            Some(Ok(result))
        }
        "tools/call" => {
            let params = params.unwrap_or_default();
            match params["name"].as_str() {
                Some("echo") => {
                    let text = params["arguments"]["text"].as_str().unwrap_or_default();
                    Some(Ok(json!({"content": [{"type": "text", "text": text}]})))
                }
                Some("broken") => Some(Ok(json!({
                    "content": [{"type": "text", "text": "page crashed"}],
                    "isError": true
                }))),
                other => Some(Err((-32602, format!("Unknown tool: {}", other.unwrap_or_default())))),
            }
        }
        _ => None,
    })
}
