// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::ResponseStream, CompletionRequest, ResponseEvent};

/// Deterministic mock provider.  Echoes the last user message back as the
/// assistant response and never calls tools.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage { input_tokens: 10, output_tokens: 10 }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response script from the front of the queue.  This lets tests specify
/// exact event sequences – including tool calls – without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<VecDeque<Vec<ResponseEvent>>>>,
    /// Every `CompletionRequest` seen by this provider, in call order.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts.
    /// The outer `Vec` is the ordered list of calls; the inner `Vec` is the
    /// sequence of [`ResponseEvent`]s emitted for that call.
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![text_script(reply)])
    }

    /// Convenience: provider that returns a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            tool_call_script(tool_id, tool_name, args_json),
            text_script(final_text),
        ])
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

/// One model turn that answers with `reply` and stops.
pub fn text_script(reply: impl Into<String>) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::TextDelta(reply.into()),
        ResponseEvent::Usage { input_tokens: 5, output_tokens: 5 },
        ResponseEvent::Done,
    ]
}

/// One model turn that requests a single tool call.
pub fn tool_call_script(
    tool_id: impl Into<String>,
    tool_name: impl Into<String>,
    args_json: impl Into<String>,
) -> Vec<ResponseEvent> {
    vec![
        ResponseEvent::ToolCall {
            index: 0,
            id: tool_id.into(),
            name: tool_name.into(),
            arguments: args_json.into(),
        },
        ResponseEvent::Done,
    ]
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        self.requests
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted mock request log poisoned"))?
            .push(req);
        let events = self
            .scripts
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted mock scripts poisoned"))?
            .pop_front()
            // Default fallback when all scripts are consumed
            .unwrap_or_else(|| text_script("[no more scripts]"));
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{CompletionRequest, Message, ModelProvider, ResponseEvent};

    fn empty_req() -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::user("hi")],
            stream: true,
            ..Default::default()
        }
    }

    async fn drain(p: &dyn ModelProvider) -> Vec<ResponseEvent> {
        let mut stream = p.complete(empty_req()).await.unwrap();
        let mut events = Vec::new();
        while let Some(ev) = stream.next().await {
            events.push(ev.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let events = drain(&MockProvider).await;
        match &events[0] {
            ResponseEvent::TextDelta(t) => assert!(t.contains("MOCK: hi")),
            other => panic!("unexpected first event: {other:?}"),
        }
        assert!(matches!(events.last(), Some(ResponseEvent::Done)));
    }

    #[tokio::test]
    async fn scripted_tool_then_text_two_rounds() {
        let p = ScriptedMockProvider::tool_then_text(
            "call-1",
            "save-file",
            r#"{"filename":"a.txt","content":"x"}"#,
            "done",
        );

        let round1 = drain(&p).await;
        assert!(round1
            .iter()
            .any(|e| matches!(e, ResponseEvent::ToolCall { name, .. } if name == "save-file")));

        let round2 = drain(&p).await;
        assert!(round2
            .iter()
            .any(|e| matches!(e, ResponseEvent::TextDelta(t) if t == "done")));
        assert_eq!(p.calls(), 2);
    }

    #[tokio::test]
    async fn scripted_fallback_when_scripts_exhausted() {
        let p = ScriptedMockProvider::new(vec![]);
        let events = drain(&p).await;
        assert!(matches!(&events[0], ResponseEvent::TextDelta(t) if t.contains("no more scripts")));
    }

    #[tokio::test]
    async fn scripted_records_requests() {
        let p = ScriptedMockProvider::always_text("ok");
        assert!(p.last_request().is_none());
        let _ = drain(&p).await;
        let req = p.last_request().unwrap();
        assert_eq!(req.messages[0].as_text(), Some("hi"));
    }
}
