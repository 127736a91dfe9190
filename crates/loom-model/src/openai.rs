// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI chat-completions driver.
//!
//! Speaks the `/chat/completions` SSE streaming wire format, so it also works
//! against compatible proxies and local servers via `model.base_url`.

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::{provider::ResponseStream, CompletionRequest, Message, MessageContent, ResponseEvent};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    model: String,
    api_key: Option<String>,
    /// Full chat completions URL, e.g. `https://api.openai.com/v1/chat/completions`.
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        let base = base_url.as_deref().unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Self {
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            max_tokens: max_tokens.unwrap_or(4096),
            temperature: temperature.unwrap_or(0.2),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, req: &CompletionRequest) -> Value {
        let tools: Vec<Value> = req.tools.iter().map(|t| json!({
            "type": "function",
            "function": {
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            }
        })).collect();

        let mut body = json!({
            "model": self.model,
            "messages": build_openai_messages(&req.messages),
            "stream": req.stream,
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream_options": { "include_usage": true },
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let body = self.request_body(&req);

        debug!(
            model = %self.model,
            tool_count = req.tools.len(),
            message_count = req.messages.len(),
            "sending completion request"
        );
        trace!(request_body = ?body, "full completion request");

        let key = self.api_key.as_deref()
            .context("API key not set; provide api_key or api_key_env in config")?;

        let resp = self.client.post(&self.chat_url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("openai error {status}: {text}");
        }

        // SSE events, and multi-byte characters inside them, can be split
        // across TCP packets.  Buffer raw bytes across chunks and decode only
        // complete lines.
        let event_stream = resp.bytes_stream()
            .scan(Vec::<u8>::new(), |buf, chunk| {
                let events: Vec<anyhow::Result<ResponseEvent>> = match chunk {
                    Ok(b) => {
                        buf.extend_from_slice(&b);
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Parse a single complete SSE `data:` line into a [`ResponseEvent`].
///
/// Returns `None` for empty lines, comment lines, or unparseable data.
fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<ResponseEvent>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(Ok(parse_sse_chunk(&v)))
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, leaving any
/// trailing partial line in place for the next chunk.
pub(crate) fn drain_complete_sse_lines(buf: &mut Vec<u8>) -> Vec<anyhow::Result<ResponseEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buf.drain(..=nl_pos).collect();
        let line = String::from_utf8_lossy(&raw[..nl_pos]);
        if let Some(ev) = parse_sse_data_line(line.trim_end_matches('\r')) {
            events.push(ev);
        }
    }
    events
}

fn parse_sse_chunk(v: &Value) -> ResponseEvent {
    // Usage-only chunk (emitted when stream_options.include_usage = true)
    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        return ResponseEvent::Usage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };
    }

    if let Some(err) = v.get("error") {
        let msg = err["message"].as_str().unwrap_or("unknown stream error");
        return ResponseEvent::Error(msg.to_string());
    }

    let delta = &v["choices"][0]["delta"];

    // Each chunk carries at most one tool-call delta in practice; the index
    // routes accumulation of parallel calls in the agent.
    if let Some(tc) = delta.get("tool_calls").and_then(|t| t.get(0)) {
        return ResponseEvent::ToolCall {
            index: tc["index"].as_u64().unwrap_or(0) as u32,
            id: tc["id"].as_str().unwrap_or("").to_string(),
            name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
            arguments: tc["function"]["arguments"].as_str().unwrap_or("").to_string(),
        };
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        return ResponseEvent::TextDelta(text.to_string());
    }

    ResponseEvent::TextDelta(String::new())
}

/// Convert a slice of [`Message`]s into the OpenAI wire-format JSON array.
///
/// OpenAI requires all tool calls from one assistant turn inside a single
/// assistant message, while history stores one message per call, so runs
/// of consecutive `ToolCall` messages are merged here.
pub(crate) fn build_openai_messages(messages: &[Message]) -> Vec<Value> {
    fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
        json!({
            "id": tool_call_id,
            "type": "function",
            "function": {
                "name": function.name,
                "arguments": function.arguments,
            }
        })
    }

    let mut result: Vec<Value> = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let m = &messages[i];
        match &m.content {
            MessageContent::ToolCall { .. } => {
                let mut calls = Vec::new();
                while let Some(MessageContent::ToolCall { tool_call_id, function }) =
                    messages.get(i).map(|m| &m.content)
                {
                    calls.push(tool_call_to_json(tool_call_id, function));
                    i += 1;
                }
                result.push(json!({ "role": "assistant", "tool_calls": calls }));
                continue;
            }
            MessageContent::Text(t) => {
                result.push(json!({ "role": m.role.as_str(), "content": t }));
            }
            MessageContent::ToolResult { tool_call_id, content, .. } => {
                result.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                }));
            }
        }
        i += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelProvider, ToolSchema};

    fn make_provider() -> OpenAiProvider {
        OpenAiProvider::new(
            "gpt-4o".into(),
            Some("sk-test".into()),
            Some("http://localhost:9999/v1/".into()),
            Some(1024),
            Some(0.0),
        )
    }

    #[test]
    fn chat_url_appends_path_and_strips_slash() {
        let p = make_provider();
        assert_eq!(p.chat_url, "http://localhost:9999/v1/chat/completions");
        assert_eq!(p.name(), "openai");
        assert_eq!(p.model_name(), "gpt-4o");
    }

    #[test]
    fn default_base_url_is_openai() {
        let p = OpenAiProvider::new("m".into(), None, None, None, None);
        assert_eq!(p.chat_url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn request_body_includes_tools_only_when_present() {
        let p = make_provider();
        let mut req = CompletionRequest {
            messages: vec![Message::user("hi")],
            stream: true,
            ..Default::default()
        };
        assert!(p.request_body(&req).get("tools").is_none());

        req.tools.push(ToolSchema {
            name: "save-file".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        });
        let body = p.request_body(&req);
        assert_eq!(body["tools"][0]["function"]["name"], "save-file");
        assert_eq!(body["max_completion_tokens"], 1024);
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_network() {
        let p = OpenAiProvider::new("m".into(), None, Some("http://127.0.0.1:1".into()), None, None);
        let err = p.complete(CompletionRequest::default()).await.err().unwrap();
        assert!(err.to_string().contains("API key not set"));
    }

    #[test]
    fn consecutive_tool_calls_are_coalesced() {
        let msgs = vec![
            Message::user("go"),
            Message::tool_call("a", "save-file", "{}"),
            Message::tool_call("b", "list-files", "{}"),
            Message::tool_result("a", "save-file", "ok", false),
            Message::tool_result("b", "list-files", "ok", false),
        ];
        let wire = build_openai_messages(&msgs);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[1]["role"], "assistant");
        assert_eq!(wire[1]["tool_calls"].as_array().unwrap().len(), 2);
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "a");
    }

    #[test]
    fn sse_lines_split_across_chunks() {
        let mut buf = b"data: {\"choices\":[{\"delta\":{\"content\":\"he".to_vec();
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
        buf.extend_from_slice(b"llo\"}}]}\n\ndata: [DONE]\n");
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(ResponseEvent::TextDelta(t)) if t == "hello"));
        assert!(matches!(&events[1], Ok(ResponseEvent::Done)));
        assert!(buf.is_empty());
    }

    #[test]
    fn multibyte_char_split_across_chunks_is_kept() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
        let first = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut buf = line[..first].to_vec();
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
        buf.extend_from_slice(&line[first..]);
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(ResponseEvent::TextDelta(t)) if t == "你好"));
    }

    #[test]
    fn tool_call_delta_parsed() {
        let v = json!({"choices":[{"delta":{"tool_calls":[{
            "index": 1, "id": "call_9",
            "function": {"name": "save-file", "arguments": "{\"file"}
        }]}}]});
        match parse_sse_chunk(&v) {
            ResponseEvent::ToolCall { index, id, name, arguments } => {
                assert_eq!(index, 1);
                assert_eq!(id, "call_9");
                assert_eq!(name, "save-file");
                assert_eq!(arguments, "{\"file");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn usage_chunk_parsed() {
        let v = json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 3}});
        assert!(matches!(
            parse_sse_chunk(&v),
            ResponseEvent::Usage { input_tokens: 12, output_tokens: 3 }
        ));
    }
}
