use std::collections::BTreeMap;

use tracing::debug;

use crate::error::LLMError;
use crate::provider::ChunkParser;
use crate::types::{IssueKind, StreamUpdate, TokenUsage};

use super::PROVIDER_NAME;
use super::types::{OpenAiChatChunk, OpenAiContent, OpenAiMessage, OpenAiToolCall, OpenAiUsage};

/// Tool call reassembled from streamed fragments.
#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Normalizes Chat Completions chunks (or a whole completion) into uniform updates.
pub(crate) struct OpenAiChunkParser {
    requested_model: String,
    model_announced: bool,
    pending_calls: BTreeMap<usize, PendingToolCall>,
}

impl OpenAiChunkParser {
    pub(crate) fn new(requested_model: impl Into<String>) -> Self {
        Self {
            requested_model: requested_model.into(),
            model_announced: false,
            pending_calls: BTreeMap::new(),
        }
    }

    fn normalize(&mut self, chunk: OpenAiChatChunk) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();

        if !self.model_announced {
            self.model_announced = true;
            let model = chunk
                .model
                .filter(|model| !model.is_empty())
                .unwrap_or_else(|| self.requested_model.clone());
            updates.push(StreamUpdate::model(model));
        }

        if chunk.choices.len() > 1 {
            debug!(
                choices = chunk.choices.len(),
                "ignoring OpenAI choices beyond the first"
            );
        }
        if let Some(choice) = chunk.choices.into_iter().find(|choice| choice.index == 0) {
            if let Some(delta) = choice.delta {
                self.apply_message(delta, true, &mut updates);
            }
            if let Some(message) = choice.message {
                self.apply_message(message, false, &mut updates);
            }
            if let Some(reason) = choice.finish_reason {
                self.flush_tool_calls(&mut updates);
                match reason.as_str() {
                    "length" => {
                        updates.push(openai_issue("Response truncated at the output token limit"))
                    }
                    "content_filter" => {
                        updates.push(openai_issue("Response stopped by the content filter"))
                    }
                    _ => {}
                }
            }
        }

        if let Some(usage) = chunk.usage {
            self.flush_tool_calls(&mut updates);
            updates.push(StreamUpdate::usage(convert_usage(usage)));
        }

        updates
    }

    fn apply_message(
        &mut self,
        message: OpenAiMessage,
        streaming: bool,
        updates: &mut Vec<StreamUpdate>,
    ) {
        match message.content {
            Some(OpenAiContent::Text(text)) if !text.is_empty() => {
                updates.push(StreamUpdate::text(text));
            }
            Some(OpenAiContent::Parts(parts)) => {
                for part in parts {
                    match part.text {
                        Some(text) if !text.is_empty() => updates.push(StreamUpdate::text(text)),
                        _ => debug!(kind = %part.kind, "skipping non-text OpenAI content part"),
                    }
                }
            }
            _ => {}
        }

        if let Some(refusal) = message.refusal.filter(|refusal| !refusal.is_empty()) {
            updates.push(openai_issue(format!("Model refused: {refusal}")));
        }

        for (position, call) in message.tool_calls.unwrap_or_default().into_iter().enumerate() {
            if streaming {
                self.merge_tool_call(position, call);
            } else {
                let (name, arguments) = call
                    .function
                    .map(|function| {
                        (
                            function.name.unwrap_or_default(),
                            function.arguments.unwrap_or_default(),
                        )
                    })
                    .unwrap_or_default();
                updates.push(render_tool_call(&name, &arguments));
            }
        }
    }

    /// Slot for a streamed fragment: its `index`, else the call sharing its `id`, else
    /// the call still being assembled.
    fn pending_slot(&self, position: usize, call: &OpenAiToolCall) -> usize {
        if let Some(index) = call.index {
            return index;
        }
        let last = self.pending_calls.keys().next_back().copied();
        match &call.id {
            Some(id) => self
                .pending_calls
                .iter()
                .find(|(_, pending)| pending.id.as_deref() == Some(id.as_str()))
                .map(|(slot, _)| *slot)
                .unwrap_or_else(|| last.map_or(position, |slot| slot + 1)),
            None => last.unwrap_or(position),
        }
    }

    fn merge_tool_call(&mut self, position: usize, call: OpenAiToolCall) {
        let slot = self.pending_slot(position, &call);
        let pending = self.pending_calls.entry(slot).or_default();
        if pending.id.is_none() {
            pending.id = call.id;
        }
        if let Some(function) = call.function {
            if let Some(name) = function.name {
                pending.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                pending.arguments.push_str(&arguments);
            }
        }
    }

    fn flush_tool_calls(&mut self, updates: &mut Vec<StreamUpdate>) {
        for (_, call) in std::mem::take(&mut self.pending_calls) {
            debug!(call_id = ?call.id, name = %call.name, "streamed tool call complete");
            updates.push(render_tool_call(&call.name, &call.arguments));
        }
    }
}

impl ChunkParser for OpenAiChunkParser {
    fn parse_chunk(&mut self, payload: &str) -> Result<Vec<StreamUpdate>, LLMError> {
        let chunk: OpenAiChatChunk = serde_json::from_str(payload).map_err(|err| {
            LLMError::provider(PROVIDER_NAME, format!("failed to parse stream chunk: {err}"))
        })?;
        Ok(self.normalize(chunk))
    }
}

fn render_tool_call(name: &str, arguments: &str) -> StreamUpdate {
    StreamUpdate::text(format!("\n```function_call\n{name}({arguments})\n```\n"))
}

fn openai_issue(detail: impl AsRef<str>) -> StreamUpdate {
    StreamUpdate::issue(
        IssueKind::DialectIssue,
        format!(" [OpenAI Issue] {}", detail.as_ref()),
    )
}

fn convert_usage(usage: OpenAiUsage) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        cached_tokens: usage
            .prompt_tokens_details
            .and_then(|details| details.cached_tokens),
        total_tokens: usage.total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateSet;

    fn parse(parser: &mut OpenAiChunkParser, payload: &str) -> Vec<StreamUpdate> {
        parser.parse_chunk(payload).expect("chunk parses")
    }

    #[test]
    fn deltas_become_text_after_model_announcement() {
        let mut parser = OpenAiChunkParser::new("gpt-4o-mini");
        let first = parse(
            &mut parser,
            r#"{"id":"c1","object":"chat.completion.chunk","model":"gpt-4o-mini-2024-07-18",
                "choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
        );
        assert_eq!(first, vec![StreamUpdate::model("gpt-4o-mini-2024-07-18")]);

        let second = parse(
            &mut parser,
            r#"{"model":"gpt-4o-mini-2024-07-18","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
        );
        assert_eq!(second, vec![StreamUpdate::text("Hi")]);
    }

    #[test]
    fn streamed_tool_call_fragments_render_on_finish() {
        let mut parser = OpenAiChunkParser::new("gpt-4o");
        parse(
            &mut parser,
            r#"{"model":"gpt-4o","choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"id":"call_1","type":"function","function":{"name":"lookup","arguments":""}}]}}]}"#,
        );
        let middle = parse(
            &mut parser,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":"}}]}}]}"#,
        );
        assert!(middle.is_empty());
        parse(
            &mut parser,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}}]}"#,
        );
        let last = parse(
            &mut parser,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        );
        assert_eq!(
            last,
            vec![StreamUpdate::text(
                "\n```function_call\nlookup({\"q\":\"rust\"})\n```\n"
            )]
        );
    }

    #[test]
    fn fragments_without_index_are_grouped_by_call_id() {
        let mut parser = OpenAiChunkParser::new("local-model");
        for payload in [
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"id":"call_a","function":{"name":"lookup","arguments":"{\"q\":"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"function":{"arguments":"1}"}}]}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"id":"call_b","function":{"name":"clock","arguments":"{}"}}]}}]}"#,
        ] {
            parse(&mut parser, payload);
        }
        let last = parse(
            &mut parser,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        );
        assert_eq!(
            last,
            vec![
                StreamUpdate::text("\n```function_call\nlookup({\"q\":1})\n```\n"),
                StreamUpdate::text("\n```function_call\nclock({})\n```\n"),
            ]
        );
    }

    #[test]
    fn length_and_content_filter_become_issues() {
        let mut parser = OpenAiChunkParser::new("gpt-4o");
        let updates = parse(
            &mut parser,
            r#"{"choices":[{"index":0,"delta":{"content":"par"},"finish_reason":"length"}]}"#,
        );
        assert_eq!(updates[0], StreamUpdate::model("gpt-4o"));
        assert_eq!(updates[1], StreamUpdate::text("par"));
        assert!(matches!(
            &updates[2],
            StreamUpdate::Issue { issue_id, issue_text }
                if issue_id == "dialect-issue" && issue_text.contains("token limit")
        ));

        let updates = parse(
            &mut parser,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"content_filter"}]}"#,
        );
        assert!(matches!(
            updates.as_slice(),
            [StreamUpdate::Issue { issue_text, .. }] if issue_text.contains("content filter")
        ));
    }

    #[test]
    fn usage_chunk_and_full_completion() {
        let mut parser = OpenAiChunkParser::new("gpt-4o");
        let updates = parse(
            &mut parser,
            r#"{"id":"c","object":"chat.completion","model":"gpt-4o",
                "choices":[{"index":0,"message":{"role":"assistant","content":"Done.","tool_calls":[
                    {"id":"call_9","type":"function","function":{"name":"save","arguments":"{}"}}]},
                    "finish_reason":"stop"}],
                "usage":{"prompt_tokens":9,"completion_tokens":2,"total_tokens":11,
                         "prompt_tokens_details":{"cached_tokens":4}}}"#,
        );
        assert_eq!(updates[1], StreamUpdate::text("Done."));
        assert_eq!(
            updates[2],
            StreamUpdate::text("\n```function_call\nsave({})\n```\n")
        );
        match &updates[3] {
            StreamUpdate::Set {
                set: StateSet { usage: Some(usage), .. },
            } => {
                assert_eq!(usage.prompt_tokens, Some(9));
                assert_eq!(usage.cached_tokens, Some(4));
                assert_eq!(usage.total_tokens, Some(11));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn malformed_chunk_is_a_provider_error() {
        let mut parser = OpenAiChunkParser::new("gpt-4o");
        assert!(matches!(
            parser.parse_chunk("{\"choices\":"),
            Err(LLMError::Provider { provider: PROVIDER_NAME, .. })
        ));
    }
}
