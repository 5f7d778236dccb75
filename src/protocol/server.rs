//! MCP server loop over a line-delimited byte stream (stdin/stdout in production).
//!
//! Requests are read and dispatched in order. `tools/call` runs in its own
//! task because the input tool can wait indefinitely; the reader keeps
//! answering `ping` and honouring cancellations meanwhile. All responses go
//! through a single writer task so lines never interleave.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::tools::{GetInputTool, ToolRegistry};
use super::types::{
    CallToolParams, CancelledParams, InitializeParams, RpcError, RpcRequest, RpcResponse,
    DEFAULT_PROTOCOL_VERSION,
};
use crate::config::AgentSettings;
use crate::core::RendezvousQueue;
use crate::error::{Error, Result};

type Outbox = mpsc::UnboundedSender<RpcResponse>;

pub struct McpServer {
    tools: Arc<ToolRegistry>,
    server_name: String,
    server_version: String,
}

impl McpServer {
    pub fn new(settings: &AgentSettings, tools: ToolRegistry) -> Self {
        Self {
            tools: Arc::new(tools),
            server_name: settings.server_name.clone(),
            server_version: settings.server_version.clone(),
        }
    }

    /// Server exposing the single "get next input" tool backed by `queue`.
    pub fn with_input_tool(settings: &AgentSettings, queue: RendezvousQueue) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(GetInputTool::new(queue, settings)));
        Self::new(settings, tools)
    }

    /// Serve until `reader` reaches end of stream. In-flight calls are
    /// aborted on return, which deregisters their queue waiters.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_responses(writer, out_rx));

        let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();
        let mut lines = BufReader::new(reader).lines();

        let read_result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(Error::Io(e)),
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            in_flight.retain(|_, handle| !handle.is_finished());
            self.handle_line(line, &out_tx, &mut in_flight);
        };

        tracing::info!("Agent stream closed, {} call(s) in flight", in_flight.len());
        for (_, handle) in in_flight.drain() {
            handle.abort();
        }

        drop(out_tx);
        match writer_task.await {
            Ok(write_result) => write_result?,
            Err(e) => return Err(Error::Protocol(format!("writer task failed: {}", e))),
        }

        read_result
    }

    fn handle_line(&self, line: &str, out: &Outbox, in_flight: &mut HashMap<String, JoinHandle<()>>) {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Unparsable protocol line: {}", e);
                send(out, RpcResponse::failure(Value::Null, RpcError::parse_error(e)));
                return;
            }
        };

        let request: RpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                if value.get("result").is_some() || value.get("error").is_some() {
                    tracing::debug!("Ignoring response from agent: {}", line);
                } else {
                    let id = value.get("id").cloned().unwrap_or(Value::Null);
                    send(out, RpcResponse::failure(id, RpcError::invalid_request(e)));
                }
                return;
            }
        };

        if let Some(version) = request.jsonrpc.as_deref() {
            if version != super::types::JSONRPC_VERSION {
                tracing::debug!("Agent sent jsonrpc version {}", version);
            }
        }

        self.dispatch(request, out, in_flight);
    }

    fn dispatch(
        &self,
        request: RpcRequest,
        out: &Outbox,
        in_flight: &mut HashMap<String, JoinHandle<()>>,
    ) {
        tracing::debug!(method = %request.method, "Agent request");

        match request.method.as_str() {
            "initialize" => {
                let result = self.initialize_result(request.params);
                reply(out, request.id, Ok(result));
            }
            "notifications/initialized" | "initialized" => {
                tracing::info!("Agent session initialized");
            }
            "ping" => reply(out, request.id, Ok(json!({}))),
            "tools/list" => {
                let result = json!({ "tools": self.tools.descriptors() });
                reply(out, request.id, Ok(result));
            }
            "tools/call" => self.start_call(request, out, in_flight),
            "notifications/cancelled" => {
                let params = request
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                let Some(params) = params else {
                    tracing::debug!("Ignoring malformed cancellation");
                    return;
                };
                if let Some(handle) = in_flight.remove(&request_key(&params.request_id)) {
                    handle.abort();
                    tracing::info!(
                        request = %params.request_id,
                        reason = params.reason.as_deref().unwrap_or("none"),
                        "Agent cancelled tool call"
                    );
                }
            }
            method if request.id.is_some() => {
                reply(out, request.id, Err(RpcError::method_not_found(method)));
            }
            method => {
                tracing::debug!("Ignoring notification {}", method);
            }
        }
    }

    fn initialize_result(&self, params: Option<Value>) -> Value {
        let protocol_version = params
            .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok())
            .and_then(|p| p.protocol_version)
            .unwrap_or_else(|| DEFAULT_PROTOCOL_VERSION.to_string());

        json!({
            "protocolVersion": protocol_version,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version,
            }
        })
    }

    fn start_call(
        &self,
        request: RpcRequest,
        out: &Outbox,
        in_flight: &mut HashMap<String, JoinHandle<()>>,
    ) {
        let Some(id) = request.id else {
            tracing::warn!("Ignoring tools/call sent as a notification");
            return;
        };

        let params = match request.params.map(serde_json::from_value::<CallToolParams>) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                send(out, RpcResponse::failure(id, RpcError::invalid_params(e)));
                return;
            }
            None => {
                send(out, RpcResponse::failure(id, RpcError::invalid_params("missing params")));
                return;
            }
        };

        let key = request_key(&id);
        if in_flight.contains_key(&key) {
            send(
                out,
                RpcResponse::failure(id, RpcError::invalid_request("duplicate request id")),
            );
            return;
        }

        let tools = self.tools.clone();
        let out = out.clone();
        let handle = tokio::spawn(async move {
            let args = params.arguments.unwrap_or_else(|| json!({}));
            let result = tools.call(&params.name, args).await;
            let response = match serde_json::to_value(&result) {
                Ok(value) => RpcResponse::success(id, value),
                Err(e) => RpcResponse::failure(id, RpcError::internal(e)),
            };
            send(&out, response);
        });
        in_flight.insert(key, handle);
    }
}

fn request_key(id: &Value) -> String {
    id.to_string()
}

fn reply(out: &Outbox, id: Option<Value>, result: std::result::Result<Value, RpcError>) {
    let Some(id) = id else {
        return;
    };
    let response = match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => RpcResponse::failure(id, error),
    };
    send(out, response);
}

fn send(out: &Outbox, response: RpcResponse) {
    if out.send(response).is_err() {
        tracing::debug!("Dropping response, writer already stopped");
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<RpcResponse>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
    use std::time::Duration;
    use tokio::io::{DuplexStream, Lines};

    struct Harness {
        input: DuplexStream,
        output: Lines<BufReader<DuplexStream>>,
        task: JoinHandle<Result<()>>,
        queue: RendezvousQueue,
    }

    impl Harness {
        fn start() -> Self {
            crate::logging::init_test();

            let queue = RendezvousQueue::new();
            let (input, server_in) = tokio::io::duplex(64 * 1024);
            let (server_out, output) = tokio::io::duplex(64 * 1024);

            let server = McpServer::with_input_tool(&AgentSettings::default(), queue.clone());
            let task = tokio::spawn(async move { server.serve(server_in, server_out).await });

            Self {
                input,
                output: BufReader::new(output).lines(),
                task,
                queue,
            }
        }

        async fn send(&mut self, value: Value) {
            self.send_raw(&value.to_string()).await;
        }

        async fn send_raw(&mut self, line: &str) {
            self.input.write_all(line.as_bytes()).await.unwrap();
            self.input.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(2), self.output.next_line())
                .await
                .expect("timed out waiting for response")
                .unwrap()
                .expect("stream closed");
            serde_json::from_str(&line).unwrap()
        }

        async fn wait_for_waiters(&self, count: usize) {
            for _ in 0..200 {
                if self.queue.stats().waiters == count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("expected {} waiters", count);
        }
    }

    fn call(id: i64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": "get_vscode_input", "arguments": {} }
        })
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let mut h = Harness::start();
        h.send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": "2025-03-26", "capabilities": {} }
        }))
        .await;

        let resp = h.recv().await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(resp["result"]["serverInfo"]["name"], "mcp-input-server");
        assert!(resp["result"]["capabilities"]["tools"].is_object());

        h.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        h.send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
        let resp = h.recv().await;
        assert_eq!(resp["id"], 2);
        assert_eq!(resp["result"], json!({}));
    }

    #[tokio::test]
    async fn test_initialize_defaults_protocol_version() {
        let mut h = Harness::start();
        h.send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}))
            .await;
        let resp = h.recv().await;
        assert_eq!(resp["result"]["protocolVersion"], DEFAULT_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let mut h = Harness::start();
        h.send(json!({"jsonrpc": "2.0", "id": "list", "method": "tools/list"}))
            .await;

        let resp = h.recv().await;
        assert_eq!(resp["id"], "list");
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "get_vscode_input");
        assert_eq!(
            tools[0]["inputSchema"],
            json!({"type": "object", "properties": {}, "required": []})
        );
    }

    #[tokio::test]
    async fn test_call_returns_queued_message() {
        let mut h = Harness::start();
        h.queue.submit("already here").unwrap();

        h.send(call(3)).await;
        let resp = h.recv().await;
        assert_eq!(resp["id"], 3);
        assert_eq!(resp["result"]["content"][0]["type"], "text");
        assert_eq!(resp["result"]["content"][0]["text"], "already here");
    }

    #[tokio::test]
    async fn test_call_blocks_until_submit() {
        let mut h = Harness::start();
        h.send(call(4)).await;
        h.wait_for_waiters(1).await;

        // The reader stays responsive while the call is suspended.
        h.send(json!({"jsonrpc": "2.0", "id": 5, "method": "ping"})).await;
        assert_eq!(h.recv().await["id"], 5);

        h.queue.submit("hello\n\n[IMAGE]\ndata:image/png;base64,AAA=").unwrap();
        let resp = h.recv().await;
        assert_eq!(resp["id"], 4);
        assert_eq!(
            resp["result"]["content"][0]["text"],
            "hello\n\n[IMAGE]\ndata:image/png;base64,AAA="
        );
        assert_eq!(h.queue.stats().waiters, 0);
    }

    #[tokio::test]
    async fn test_cancellation_removes_waiter() {
        let mut h = Harness::start();
        h.send(call(7)).await;
        h.wait_for_waiters(1).await;

        h.send(json!({
            "jsonrpc": "2.0",
            "method": "notifications/cancelled",
            "params": { "requestId": 7, "reason": "timeout" }
        }))
        .await;
        h.wait_for_waiters(0).await;

        h.queue.submit("kept").unwrap();
        assert_eq!(h.queue.stats().pending, 1);

        h.send(call(8)).await;
        let resp = h.recv().await;
        assert_eq!(resp["id"], 8);
        assert_eq!(resp["result"]["content"][0]["text"], "kept");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let mut h = Harness::start();
        h.send(json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": { "name": "other_tool" }
        }))
        .await;

        let resp = h.recv().await;
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["content"][0]["text"], "Unknown tool");
    }

    #[tokio::test]
    async fn test_call_without_params() {
        let mut h = Harness::start();
        h.send(json!({"jsonrpc": "2.0", "id": 10, "method": "tools/call"}))
            .await;
        let resp = h.recv().await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method_and_notification() {
        let mut h = Harness::start();
        h.send(json!({"jsonrpc": "2.0", "method": "notifications/whatever"}))
            .await;
        h.send(json!({"jsonrpc": "2.0", "id": 11, "method": "resources/list"}))
            .await;

        let resp = h.recv().await;
        assert_eq!(resp["id"], 11);
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let mut h = Harness::start();
        h.send_raw("{this is not json").await;

        let resp = h.recv().await;
        assert_eq!(resp["id"], Value::Null);
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_eof_ends_serve_and_drops_waiters() {
        let mut h = Harness::start();
        h.send(call(12)).await;
        h.wait_for_waiters(1).await;

        drop(h.input);
        let result = tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(h.queue.stats().waiters, 0);
    }
}
