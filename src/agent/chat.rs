//! Tool-augmented completion loop.
//!
//! One `invoke` call owns a fresh [`Conversation`] and alternates between
//! asking the backend for a response and running the tools it requested,
//! until the model produces a final answer or the attempt budget runs out.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::commands::{Command, CommandRegistry};
use crate::llm::{FinishReason, LlmClient, ToolCall};

use super::conversation::Conversation;
use super::error::ChatError;
use super::prompt::Seed;

/// Completion round-trips allowed per `invoke` call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub struct ChatService {
    llm: Arc<dyn LlmClient>,
    commands: Arc<CommandRegistry>,
    seed: Seed,
    max_attempts: u32,
}

impl ChatService {
    pub fn new(llm: Arc<dyn LlmClient>, commands: Arc<CommandRegistry>) -> Self {
        Self {
            llm,
            commands,
            seed: Seed::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Values below one are raised to one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Produces the bot's reply to `user_message`.
    pub async fn invoke(&self, user_message: &str) -> Result<String, ChatError> {
        let mut conversation = Conversation::new(self.seed.messages());
        conversation.push_user(user_message);

        let tools = self.commands.definitions();

        for attempt in 1..=self.max_attempts {
            let response = self
                .llm
                .complete(conversation.messages(), &tools)
                .await
                .map_err(ChatError::Backend)?;

            debug!(
                "Attempt {attempt}/{}: {} in / {} out tokens",
                self.max_attempts, response.input_tokens, response.output_tokens
            );

            let choice = response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ChatError::model("empty response"))?;

            match choice.finish_reason {
                FinishReason::Stop => {
                    return choice
                        .content
                        .ok_or_else(|| ChatError::model("answer generation failed"));
                }
                FinishReason::ToolCalls => {
                    if choice.tool_calls.is_empty() {
                        return Err(ChatError::model("invalid function call"));
                    }
                    let results = self.run_tool_calls(&choice.tool_calls).await?;
                    conversation.push_tool_request(choice.content, choice.tool_calls);
                    for (call_id, content) in results {
                        conversation.push_tool_result(&call_id, content)?;
                    }
                }
                other => {
                    warn!(
                        "Unexpected finish reason '{other}' (attempt {attempt}/{}), retrying",
                        self.max_attempts
                    );
                }
            }
        }

        info!("No final answer after {} attempts", self.max_attempts);
        Err(ChatError::ExhaustedRetries("retry limit exceeded".to_string()))
    }

    /// Runs one batch of tool calls, returning `(call id, result)` pairs in
    /// request order.
    ///
    /// Every command is resolved before any of them runs; the batch then
    /// executes concurrently and fails as a whole if one call fails.
    async fn run_tool_calls(
        &self,
        calls: &[ToolCall],
    ) -> Result<Vec<(String, String)>, ChatError> {
        let resolved = calls
            .iter()
            .map(|call| {
                self.commands
                    .lookup(&call.function.name)
                    .map(|command| (call, command))
                    .ok_or_else(|| {
                        ChatError::model(format!("command not found: {}", call.function.name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let results = try_join_all(
            resolved
                .into_iter()
                .map(|(call, command)| Self::run_tool_call(call, command)),
        )
        .await?;

        Ok(calls
            .iter()
            .map(|call| call.id.clone())
            .zip(results)
            .collect())
    }

    async fn run_tool_call(call: &ToolCall, command: &Command) -> Result<String, ChatError> {
        let name = &call.function.name;
        debug!("calling: {name} with {}", call.function.arguments);

        let value = command
            .execute(&call.function.arguments)
            .await
            .map_err(|e| ChatError::from_command(name, e))?;

        let content = serde_json::to_string(&value).map_err(|e| ChatError::Command {
            command: name.clone(),
            source: e.into(),
        })?;
        debug!("..and got: {content}");
        Ok(content)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend for exercising the loop without a network.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{Choice, FinishReason, LlmClient, LlmResponse, Message, ToolCall, ToolDefinition};

    /// Returns queued responses in order and records every request.
    #[derive(Default)]
    pub struct ScriptedLlm {
        responses: Mutex<VecDeque<anyhow::Result<LlmResponse>>>,
        pub requests: Mutex<Vec<Vec<Message>>>,
        pub tool_counts: Mutex<Vec<usize>>,
    }

    impl ScriptedLlm {
        pub fn new(choices: Vec<Choice>) -> Self {
            let llm = Self::default();
            for choice in choices {
                llm.push(choice);
            }
            llm
        }

        pub fn push(&self, choice: Choice) {
            self.responses.lock().unwrap().push_back(Ok(LlmResponse {
                choices: vec![choice],
                input_tokens: 0,
                output_tokens: 0,
            }));
        }

        pub fn push_raw(&self, response: anyhow::Result<LlmResponse>) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    pub fn stop(content: Option<&str>) -> Choice {
        Choice {
            finish_reason: FinishReason::Stop,
            content: content.map(String::from),
            tool_calls: vec![],
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Choice {
        Choice {
            finish_reason: FinishReason::ToolCalls,
            content: None,
            tool_calls: calls,
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            messages: &[Message],
            tools: &[ToolDefinition],
        ) -> anyhow::Result<LlmResponse> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.tool_counts.lock().unwrap().push(tools.len());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }

        fn description(&self) -> String {
            "scripted (test)".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{stop, tool_calls, ScriptedLlm};
    use super::*;
    use crate::commands::testing::{FakeCosense, FakeImages};
    use crate::llm::{Choice, LlmResponse, Message};
    use serde_json::json;

    struct Harness {
        llm: Arc<ScriptedLlm>,
        cosense: Arc<FakeCosense>,
        images: Arc<FakeImages>,
        service: ChatService,
    }

    fn harness_with(llm: ScriptedLlm, cosense: FakeCosense, images: FakeImages) -> Harness {
        let llm = Arc::new(llm);
        let cosense = Arc::new(cosense);
        let images = Arc::new(images);
        let registry = CommandRegistry::builtin(cosense.clone(), images.clone());
        let service = ChatService::new(llm.clone(), Arc::new(registry));
        Harness {
            llm,
            cosense,
            images,
            service,
        }
    }

    fn harness(choices: Vec<Choice>) -> Harness {
        harness_with(
            ScriptedLlm::new(choices),
            FakeCosense::default(),
            FakeImages::returning(0, &[]),
        )
    }

    fn assert_no_orphans(messages: &[Message]) {
        let conv = Conversation::new(messages.to_vec());
        assert!(conv.orphan_tool_results().is_empty(), "orphans in {messages:?}");
    }

    // ── Final answers ────────────────────────────────────

    #[tokio::test]
    async fn test_stop_returns_content_immediately() {
        let h = harness(vec![stop(Some("Hello!")), stop(Some("unused"))]);
        let reply = h.service.invoke("hi").await.unwrap();
        assert_eq!(reply, "Hello!");
        assert_eq!(h.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_request_is_seed_plus_user_message() {
        let h = harness(vec![stop(Some("ok"))]);
        h.service.invoke("alice: こんにちは").await.unwrap();

        let requests = h.llm.requests.lock().unwrap();
        let first = &requests[0];
        assert_eq!(first.len(), 3);
        assert!(matches!(first[0], Message::System { .. }));
        assert_eq!(first[1], Message::assistant("ぼく、ｽﾀｯｸﾁｬﾝ！お話しよう。"));
        assert_eq!(first[2], Message::user("alice: こんにちは"));
        assert_eq!(*h.llm.tool_counts.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_custom_seed_is_used() {
        let llm = Arc::new(ScriptedLlm::new(vec![stop(Some("ok"))]));
        let registry = CommandRegistry::new(vec![]);
        let service = ChatService::new(llm.clone(), Arc::new(registry)).with_seed(Seed {
            system_prompt: "sys".to_string(),
            greeting: "hey".to_string(),
        });
        service.invoke("q").await.unwrap();
        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[0][0], Message::system("sys"));
        assert_eq!(requests[0][1], Message::assistant("hey"));
        assert_eq!(*llm.tool_counts.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_stop_without_content_is_model_error() {
        let h = harness(vec![stop(None)]);
        let err = h.service.invoke("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));
        assert!(err.to_string().contains("answer generation failed"));
        assert_eq!(h.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_choices_is_model_error() {
        let h = harness(vec![]);
        h.llm.push_raw(Ok(LlmResponse {
            choices: vec![],
            input_tokens: 0,
            output_tokens: 0,
        }));
        let err = h.service.invoke("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let h = harness(vec![]);
        h.llm.push_raw(Err(anyhow::anyhow!("OpenAI API error (500)")));
        let err = h.service.invoke("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Backend(_)));
        assert_eq!(h.llm.calls(), 1);
    }

    // ── Tool calls ───────────────────────────────────────

    #[tokio::test]
    async fn test_search_tool_call_round_trip() {
        let h = harness_with(
            ScriptedLlm::new(vec![
                tool_calls(vec![ToolCall::new(
                    "call_1",
                    "search_stackchan_cosense",
                    r#"{"query":"stackchan -arduino"}"#,
                )]),
                stop(Some("見つけたよ！")),
            ]),
            FakeCosense {
                search_result: Some(json!({"pages": [{"title": "Moddable"}]})),
                ..Default::default()
            },
            FakeImages::returning(0, &[]),
        );

        let reply = h.service.invoke("search please").await.unwrap();
        assert_eq!(reply, "見つけたよ！");
        assert_eq!(
            *h.cosense.queries.lock().unwrap(),
            vec!["stackchan -arduino".to_string()]
        );

        let requests = h.llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.len(), 5);
        assert_eq!(
            second[3],
            Message::Assistant {
                content: None,
                tool_calls: vec![ToolCall::new(
                    "call_1",
                    "search_stackchan_cosense",
                    r#"{"query":"stackchan -arduino"}"#,
                )],
            }
        );
        assert_eq!(
            second[4],
            Message::Tool {
                content: r#"{"pages":[{"title":"Moddable"}]}"#.to_string(),
                tool_call_id: "call_1".to_string(),
            }
        );
        assert_no_orphans(second);
    }

    #[tokio::test]
    async fn test_absent_tool_result_serializes_as_null() {
        let h = harness(vec![
            tool_calls(vec![ToolCall::new(
                "call_1",
                "get_stackchan_cosense_page_text",
                r#"{"pageTitle":"Missing"}"#,
            )]),
            stop(Some("ページがないみたい")),
        ]);
        h.service.invoke("q").await.unwrap();

        let requests = h.llm.requests.lock().unwrap();
        assert_eq!(
            requests[1].last().unwrap(),
            &Message::Tool {
                content: "null".to_string(),
                tool_call_id: "call_1".to_string(),
            }
        );
        assert_eq!(*h.cosense.titles.lock().unwrap(), vec!["Missing".to_string()]);
    }

    #[tokio::test]
    async fn test_page_text_result_is_json_string() {
        let h = harness_with(
            ScriptedLlm::new(vec![
                tool_calls(vec![ToolCall::new(
                    "call_1",
                    "get_stackchan_cosense_page_text",
                    r#"{"pageTitle":"Moddable"}"#,
                )]),
                stop(Some("ok")),
            ]),
            FakeCosense {
                page_text: Some("line1\nline2".to_string()),
                ..Default::default()
            },
            FakeImages::returning(0, &[]),
        );
        h.service.invoke("q").await.unwrap();

        let requests = h.llm.requests.lock().unwrap();
        match requests[1].last().unwrap() {
            Message::Tool { content, .. } => assert_eq!(content, r#""line1\nline2""#),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_calls_answered_in_request_order() {
        let h = harness_with(
            ScriptedLlm::new(vec![
                tool_calls(vec![
                    ToolCall::new("call_a", "generate_image", r#"{"prompt":"a cat"}"#),
                    ToolCall::new("call_b", "search_stackchan_cosense", r#"{"query":"cat"}"#),
                ]),
                stop(Some("done")),
            ]),
            FakeCosense::default(),
            FakeImages::returning(0, &[]),
        );
        h.service.invoke("q").await.unwrap();

        assert_eq!(
            *h.images.prompts.lock().unwrap(),
            vec!["\"a cat\" in super-kawaii style".to_string()]
        );

        let requests = h.llm.requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second.len(), 6);
        assert_eq!(
            second[4],
            Message::Tool {
                content: r#""failed to create""#.to_string(),
                tool_call_id: "call_a".to_string(),
            }
        );
        assert_eq!(
            second[5],
            Message::Tool {
                content: "null".to_string(),
                tool_call_id: "call_b".to_string(),
            }
        );
        assert_no_orphans(second);
    }

    #[tokio::test]
    async fn test_conversation_grows_across_rounds() {
        let h = harness(vec![
            tool_calls(vec![ToolCall::new("c1", "search_stackchan_cosense", r#"{"query":"a"}"#)]),
            tool_calls(vec![ToolCall::new("c2", "search_stackchan_cosense", r#"{"query":"b"}"#)]),
            stop(Some("final")),
        ]);
        assert_eq!(h.service.invoke("q").await.unwrap(), "final");

        let requests = h.llm.requests.lock().unwrap();
        let lens: Vec<usize> = requests.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![3, 5, 7]);
        // Earlier requests are prefixes of later ones: nothing is edited or removed.
        assert_eq!(requests[1][..5], requests[2][..5]);
        for request in requests.iter() {
            assert_no_orphans(request);
        }
    }

    #[tokio::test]
    async fn test_unknown_command_is_model_error() {
        let h = harness(vec![tool_calls(vec![ToolCall::new("call_1", "foo", "{}")])]);
        let err = h.service.invoke("q").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));
        assert!(err.to_string().contains("foo"));
        assert_eq!(h.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_runs_nothing() {
        let h = harness(vec![tool_calls(vec![
            ToolCall::new("call_1", "search_stackchan_cosense", r#"{"query":"x"}"#),
            ToolCall::new("call_2", "foo", "{}"),
        ])]);
        assert!(h.service.invoke("q").await.is_err());
        assert!(h.cosense.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_calls_reason_without_calls() {
        let h = harness(vec![tool_calls(vec![])]);
        let err = h.service.invoke("q").await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));
        assert!(err.to_string().contains("invalid function call"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_validation() {
        let h = harness(vec![tool_calls(vec![ToolCall::new(
            "call_1",
            "generate_image",
            r#"{"description":"a cat"}"#,
        )])]);
        let err = h.service.invoke("q").await.unwrap_err();
        match err {
            ChatError::ArgumentValidation { command, message } => {
                assert_eq!(command, "generate_image");
                assert!(message.contains("prompt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(h.images.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_aborts() {
        let h = harness_with(
            ScriptedLlm::new(vec![tool_calls(vec![ToolCall::new(
                "call_1",
                "search_stackchan_cosense",
                r#"{"query":"x"}"#,
            )])]),
            FakeCosense {
                fail: true,
                ..Default::default()
            },
            FakeImages::returning(0, &[]),
        );
        let err = h.service.invoke("q").await.unwrap_err();
        assert!(matches!(err, ChatError::Command { .. }));
        assert_eq!(h.llm.calls(), 1);
    }

    // ── Retry budget ─────────────────────────────────────

    #[tokio::test]
    async fn test_endless_tool_calls_exhaust_budget() {
        let choices = (0..10)
            .map(|i| {
                tool_calls(vec![ToolCall::new(
                    format!("call_{i}"),
                    "search_stackchan_cosense",
                    r#"{"query":"loop"}"#,
                )])
            })
            .collect();
        let h = harness(choices);
        let err = h.service.invoke("q").await.unwrap_err();
        assert!(matches!(err, ChatError::ExhaustedRetries(_)));
        assert_eq!(err.to_string(), "retry limit exceeded");
        assert_eq!(h.llm.calls(), 5);
        assert_eq!(h.cosense.queries.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_finish_reason_retries_unchanged() {
        let length = Choice {
            finish_reason: FinishReason::Length,
            content: Some("truncated".to_string()),
            tool_calls: vec![],
        };
        let h = harness(vec![length, stop(Some("complete"))]);
        assert_eq!(h.service.invoke("q").await.unwrap(), "complete");

        let requests = h.llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn test_unknown_finish_reasons_exhaust_budget() {
        let choices = (0..5)
            .map(|_| Choice {
                finish_reason: FinishReason::Other("function_call".to_string()),
                content: None,
                tool_calls: vec![],
            })
            .collect();
        let h = harness(choices);
        let err = h.service.invoke("q").await.unwrap_err();
        assert!(matches!(err, ChatError::ExhaustedRetries(_)));
        assert_eq!(h.llm.calls(), 5);
    }

    #[tokio::test]
    async fn test_custom_max_attempts() {
        let choices = (0..5)
            .map(|i| {
                tool_calls(vec![ToolCall::new(
                    format!("call_{i}"),
                    "search_stackchan_cosense",
                    r#"{"query":"loop"}"#,
                )])
            })
            .collect();
        let llm = Arc::new(ScriptedLlm::new(choices));
        let registry = CommandRegistry::builtin(
            Arc::new(FakeCosense::default()),
            Arc::new(FakeImages::returning(0, &[])),
        );
        let service = ChatService::new(llm.clone(), Arc::new(registry)).with_max_attempts(2);
        assert!(matches!(
            service.invoke("q").await.unwrap_err(),
            ChatError::ExhaustedRetries(_)
        ));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_answer_on_last_attempt_succeeds() {
        let mut choices: Vec<Choice> = (0..4)
            .map(|i| {
                tool_calls(vec![ToolCall::new(
                    format!("call_{i}"),
                    "search_stackchan_cosense",
                    r#"{"query":"x"}"#,
                )])
            })
            .collect();
        choices.push(stop(Some("just in time")));
        let h = harness(choices);
        assert_eq!(h.service.invoke("q").await.unwrap(), "just in time");
        assert_eq!(h.llm.calls(), 5);
    }

    #[test]
    fn test_zero_max_attempts_is_raised_to_one() {
        let service = ChatService::new(
            Arc::new(ScriptedLlm::default()),
            Arc::new(CommandRegistry::new(vec![])),
        )
        .with_max_attempts(0);
        assert_eq!(service.max_attempts, 1);
    }
}
