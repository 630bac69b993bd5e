// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Generic OpenAI-compatible HTTP driver.
//!
//! Every non-mock catalog entry is served by this one client: it speaks the
//! widely-adopted OpenAI chat-completions wire format (`POST
//! {base_url}/chat/completions`, SSE streaming) and is parameterised purely by
//! `base_url` + bearer token. Vendor-specific SDKs are out of scope; operators
//! point a catalog entry's `base_url` at whichever OpenAI-compatible endpoint
//! they run (vLLM, llama.cpp, a hosted gateway, ...).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::provider::ResponseStream;
use crate::{CompletionRequest, Message, MessageContent, ResponseEvent, Role, ToolSchema};

pub struct HttpCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_output_tokens: u32,
    temperature: Option<f32>,
}

impl HttpCompatProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        max_output_tokens: u32,
        temperature: Option<f32>,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client config is valid");
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            max_output_tokens,
            temperature,
        }
    }

    fn wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };
                match &m.content {
                    MessageContent::Text(t) => json!({ "role": role, "content": t }),
                    MessageContent::ContentParts(_) => {
                        json!({ "role": role, "content": m.as_text().unwrap_or_default() })
                    }
                    MessageContent::ToolCall { tool_call_id, function } => json!({
                        "role": role,
                        "tool_calls": [{
                            "id": tool_call_id,
                            "type": "function",
                            "function": { "name": function.name, "arguments": function.arguments },
                        }],
                    }),
                    MessageContent::ToolResult { tool_call_id, content } => json!({
                        "role": role,
                        "tool_call_id": tool_call_id,
                        "content": content.to_string(),
                    }),
                }
            })
            .collect()
    }

    fn wire_tools(tools: &[ToolSchema]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl crate::ModelProvider for HttpCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::wire_messages(&req.messages),
            "max_tokens": self.max_output_tokens,
            "stream": true,
        });
        if !req.tools.is_empty() {
            body["tools"] = json!(Self::wire_tools(&req.tools));
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("openai-compat endpoint returned {status}: {text}");
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(sse_to_events(byte_stream)))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: ChatFunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Decode an OpenAI-style `text/event-stream` byte stream into [`ResponseEvent`]s.
///
/// Each SSE frame is a line of the form `data: {json}` terminated by the
/// sentinel `data: [DONE]`. Partial frames split across TCP reads are
/// buffered until a full line is available.
fn sse_to_events(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>> {
    Box::pin(async_stream::stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut buf = String::new();
        let mut tool_names: Vec<Option<String>> = Vec::new();
        let mut tool_ids: Vec<Option<String>> = Vec::new();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(anyhow::anyhow!(e));
                    return;
                }
            };
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_string();
                buf.drain(..=pos);
                let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    yield Ok(ResponseEvent::Done);
                    return;
                }
                let parsed: Result<ChatChunk, _> = serde_json::from_str(data);
                let chunk = match parsed {
                    Ok(c) => c,
                    Err(e) => {
                        yield Ok(ResponseEvent::Error(format!("malformed chunk: {e}")));
                        continue;
                    }
                };
                if let Some(usage) = chunk.usage {
                    yield Ok(ResponseEvent::Usage {
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                        cache_read_tokens: 0,
                        cache_write_tokens: 0,
                    });
                }
                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content {
                        if !text.is_empty() {
                            yield Ok(ResponseEvent::TextDelta(text));
                        }
                    }
                    for tc in choice.delta.tool_calls {
                        while tool_names.len() <= tc.index {
                            tool_names.push(None);
                            tool_ids.push(None);
                        }
                        if let Some(name) = tc.function.name {
                            tool_names[tc.index] = Some(name);
                        }
                        if let Some(id) = tc.id {
                            tool_ids[tc.index] = Some(id);
                        }
                        if let Some(args) = tc.function.arguments {
                            yield Ok(ResponseEvent::ToolCall {
                                index: tc.index,
                                id: tool_ids[tc.index].clone().unwrap_or_default(),
                                name: tool_names[tc.index].clone().unwrap_or_default(),
                                arguments: args,
                            });
                        }
                    }
                }
            }
        }
        yield Ok(ResponseEvent::Done);
    })
}
