//! Anthropic Messages API provider (streaming only).

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::LoopError;
use crate::types::{ProviderEvent, ToolCall};

use super::http::{anthropic_headers, parse_sse_data, shared_client, status_to_error};
use super::{CompletionProvider, CompletionRequest, ProviderStream};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(model: String, api_key: String, base_url: Option<String>, max_tokens: u32) -> Self {
        Self {
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            api_key,
            max_tokens,
        }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        if let Some(obj) = body.as_object_mut() {
            if !request.system_prompt.is_empty() {
                obj.insert("system".into(), request.system_prompt.clone().into());
            }
            if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
                obj.insert("tools".into(), serde_json::json!(tools));
            }
        }

        body
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ProviderStream, LoopError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            "anthropic stream"
        );

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut parser = SseParser::default();
            futures::pin_mut!(byte_stream);

            'outer: while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LoopError::Network(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&line);
                    for event in parser.feed_line(line.trim()) {
                        let finished = matches!(event, ProviderEvent::Done | ProviderEvent::Error(_));
                        yield Ok(event);
                        if finished {
                            break 'outer;
                        }
                    }
                }
            }

            if parser.finished {
                return;
            }
            // Last frame may arrive without a trailing newline.
            let tail = String::from_utf8_lossy(&buffer).into_owned();
            for event in parser.feed_line(tail.trim()) {
                yield Ok(event);
            }
            if !parser.finished {
                warn!("anthropic stream closed without message_stop");
                yield Err(LoopError::Stream("stream ended before message_stop".into()));
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Incremental state for one Messages API event stream.
#[derive(Default)]
struct SseParser {
    tool_id: Option<String>,
    tool_name: Option<String>,
    tool_input: String,
    finished: bool,
}

impl SseParser {
    fn feed_line(&mut self, line: &str) -> Vec<ProviderEvent> {
        if line.is_empty() || line.starts_with(':') {
            return Vec::new();
        }
        let Some(data) = parse_sse_data(line) else {
            return Vec::new();
        };
        let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
            return Vec::new();
        };

        match event.get("type").and_then(|t| t.as_str()).unwrap_or("") {
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    self.tool_id = block["id"].as_str().map(str::to_string);
                    self.tool_name = block["name"].as_str().map(str::to_string);
                    self.tool_input.clear();
                }
                Vec::new()
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![ProviderEvent::ContentDelta(t.to_string())])
                        .unwrap_or_default(),
                    Some("input_json_delta") => {
                        if let Some(json) = delta["partial_json"].as_str() {
                            self.tool_input.push_str(json);
                        }
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            "content_block_stop" => match (self.tool_id.take(), self.tool_name.take()) {
                (Some(id), Some(name)) => {
                    let raw = std::mem::take(&mut self.tool_input);
                    let input = if raw.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
                    };
                    vec![ProviderEvent::ToolUse(ToolCall { id, name, input })]
                }
                _ => Vec::new(),
            },
            "message_stop" => {
                self.finished = true;
                vec![ProviderEvent::Done]
            }
            "error" => {
                self.finished = true;
                let message = event["error"]["message"]
                    .as_str()
                    .unwrap_or("provider stream error")
                    .to_string();
                vec![ProviderEvent::Error(message)]
            }
            _ => Vec::new(),
        }
    }
}
