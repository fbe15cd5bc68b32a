//! Managed agents: named specialists the manager can hand a task to.
//!
//! An agent with tools works in a bounded loop: each reply either calls a
//! tool, whose result comes back as an observation, or is the final answer.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::action::{parse_agent_action, AgentAction};
use super::attachments;
use super::prompts;
use crate::ai::{AiClient, AiError, Message};
use crate::telemetry::{SpanCollector, SpanType};
use crate::tools::ToolRegistry;

/// Upload access for agents that read statements
#[derive(Debug, Clone)]
pub struct AttachmentAccess {
    pub upload_root: PathBuf,
    pub max_bytes: usize,
}

pub struct ManagedAgent {
    name: String,
    description: String,
    system_prompt: String,
    client: Arc<AiClient>,
    attachments: Option<AttachmentAccess>,
    tools: Option<Arc<ToolRegistry>>,
    max_tool_steps: usize,
}

impl ManagedAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        client: Arc<AiClient>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            client,
            attachments: None,
            tools: None,
            max_tool_steps: 0,
        }
    }

    /// The data specialist, allowed to read uploaded statements
    pub fn data_analyst(client: Arc<AiClient>, access: AttachmentAccess) -> Self {
        Self::new(
            prompts::DATA_ANALYST_NAME,
            prompts::DATA_ANALYST_DESCRIPTION,
            prompts::DATA_ANALYST_PROMPT,
            client,
        )
        .with_attachments(access)
    }

    pub fn tax_advisor(client: Arc<AiClient>) -> Self {
        Self::new(
            prompts::TAX_ADVISOR_NAME,
            prompts::TAX_ADVISOR_DESCRIPTION,
            prompts::TAX_ADVISOR_PROMPT,
            client,
        )
    }

    pub fn with_attachments(mut self, access: AttachmentAccess) -> Self {
        self.attachments = Some(access);
        self
    }

    /// Let the agent call `tools`, at most `max_steps` times per task.
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>, max_steps: usize) -> Self {
        self.tools = Some(tools);
        self.max_tool_steps = max_steps.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run one delegated task to completion.
    pub async fn run(&self, task: &str, recording: Option<&Arc<SpanCollector>>) -> Result<String, AiError> {
        let mut prompt = format!("You're a helpful agent named '{}'.\n\n## Task\n{}", self.name, task);

        if let Some(access) = &self.attachments {
            if let Some(previews) = attachments::render_previews(task, &access.upload_root, access.max_bytes).await {
                prompt.push_str("\n\n");
                prompt.push_str(&previews);
            }
        }

        log::info!("[AGENT:{}] Running task ({} chars)", self.name, prompt.len());

        let Some(tools) = self.tools.as_ref().filter(|t| !t.is_empty()) else {
            let messages = vec![Message::system(self.system_prompt.clone()), Message::user(prompt)];
            let answer = self.client.generate_text(messages).await?;
            return Ok(answer.trim().to_string());
        };

        let system = format!("{}\n\n{}", self.system_prompt, prompts::tool_protocol(&tools.definitions()));
        let mut messages = vec![Message::system(system), Message::user(prompt)];

        for _ in 0..self.max_tool_steps {
            let reply = self.client.generate_text(messages.clone()).await?;
            match parse_agent_action(&reply) {
                AgentAction::FinalAnswer(answer) => return Ok(answer),
                AgentAction::CallTool { tool, arguments } => {
                    messages.push(Message::assistant(reply));
                    let observation = self.call_tool(tools, recording, &tool, arguments).await;
                    messages.push(Message::user(observation));
                }
            }
        }

        log::warn!("[AGENT:{}] Tool budget of {} exhausted", self.name, self.max_tool_steps);
        messages.push(Message::user(prompts::FORCE_TOOL_FINAL_ANSWER));
        match parse_agent_action(&self.client.generate_text(messages).await?) {
            AgentAction::FinalAnswer(answer) => Ok(answer),
            AgentAction::CallTool { .. } => Err(AiError::new(format!(
                "{} did not answer within {} tool calls",
                self.name, self.max_tool_steps
            ))),
        }
    }

    /// Execute one tool call and phrase its result as an observation.
    async fn call_tool(
        &self,
        tools: &ToolRegistry,
        recording: Option<&Arc<SpanCollector>>,
        name: &str,
        arguments: Value,
    ) -> String {
        let Some(tool) = tools.get(name) else {
            log::warn!("[AGENT:{}] Unknown tool requested: {}", self.name, name);
            return format!(
                "Error: there is no tool named '{}'. Available tools: {}.",
                name,
                tools.names().join(", ")
            );
        };

        let mut span = recording.map(|c| c.start_guarded(SpanType::ToolCall, name));
        if let Some(s) = span.as_mut() {
            s.set_attribute("agent", json!(self.name));
            s.set_attribute("arguments", arguments.clone());
        }

        log::info!("[AGENT:{}] Calling tool {}", self.name, name);
        let result = tool.execute(arguments).await;

        if let Some(mut s) = span {
            s.set_attribute("output", json!(result.content));
            if result.success {
                s.succeed();
            } else {
                s.fail(result.content.clone());
            }
        }

        if result.success {
            format!("Observation from {}:\n{}", name, result.content)
        } else {
            format!("Error from {}: {}", name, result.content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MessageRole, MockAiClient};
    use crate::telemetry::SpanStatus;
    use crate::tools::{Tool, ToolDefinition, ToolResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Tool that answers from a fixed result and remembers its arguments
    struct FixedSearch {
        result: ToolResult,
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl Tool for FixedSearch {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "web_search".to_string(),
                description: "Searches the web.".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, params: Value) -> ToolResult {
            self.seen.lock().push(params);
            self.result.clone()
        }
    }

    fn advisor_with_search(replies: &[&str], result: ToolResult) -> (ManagedAgent, Arc<AiClient>, Arc<FixedSearch>) {
        let client = Arc::new(AiClient::Mock(MockAiClient::replies(replies)));
        let search = Arc::new(FixedSearch {
            result,
            seen: Mutex::new(Vec::new()),
        });
        let registry = Arc::new(ToolRegistry::new());
        registry.register(search.clone());
        let agent = ManagedAgent::tax_advisor(client.clone()).with_tools(registry, 2);
        (agent, client, search)
    }

    #[tokio::test]
    async fn test_run_sends_system_prompt_and_task() {
        let client = Arc::new(AiClient::Mock(MockAiClient::replies(&["  Deduct your home office.  "])));
        let agent = ManagedAgent::tax_advisor(client.clone());

        let answer = agent.run("Which expenses are deductible?", None).await.unwrap();
        assert_eq!(answer, "Deduct your home office.");

        let AiClient::Mock(mock) = &*client else { panic!("mock client") };
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, MessageRole::System);
        assert!(calls[0][0].content.contains("Canadian CRA tax rules"));
        assert!(calls[0][1].content.contains("Which expenses are deductible?"));
    }

    #[tokio::test]
    async fn test_data_analyst_inlines_uploaded_csv() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("jan.csv");
        tokio::fs::write(&csv, "Date,Amount\n2024-01-05,19.99\n").await.unwrap();

        let client = Arc::new(AiClient::Mock(MockAiClient::replies(&["Total: $19.99"])));
        let agent = ManagedAgent::data_analyst(
            client.clone(),
            AttachmentAccess {
                upload_root: dir.path().to_path_buf(),
                max_bytes: 4096,
            },
        );

        agent.run(&format!("Summarize \"{}\"", csv.display()), None).await.unwrap();

        let AiClient::Mock(mock) = &*client else { panic!("mock client") };
        assert!(mock.calls()[0][1].content.contains("2024-01-05,19.99"));
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back_before_answer() {
        let (agent, client, search) = advisor_with_search(
            &[
                r#"{"action":"tool","tool":"web_search","arguments":{"query":"CRA home office 2024"}}"#,
                r#"{"action":"final_answer","answer":"Use the detailed method on Form T2200."}"#,
            ],
            ToolResult::success("## Search Results\n\n[Home office](https://www.canada.ca/ho)"),
        );
        let collector = Arc::new(SpanCollector::new("t".to_string(), "web".to_string()));

        let answer = agent.run("Can I deduct my home office?", Some(&collector)).await.unwrap();
        assert_eq!(answer, "Use the detailed method on Form T2200.");
        assert_eq!(search.seen.lock().clone(), vec![json!({"query": "CRA home office 2024"})]);

        let AiClient::Mock(mock) = &*client else { panic!("mock client") };
        let calls = mock.calls();
        assert!(calls[0][0].content.contains("- web_search: Searches the web."));
        let observation = &calls[1].last().unwrap().content;
        assert!(observation.starts_with("Observation from web_search:"));
        assert!(observation.contains("https://www.canada.ca/ho"));

        let spans = collector.snapshot();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_type, SpanType::ToolCall);
        assert_eq!(spans[0].attributes["agent"], "tax_advisor");
        assert_eq!(spans[0].attributes["arguments"]["query"], "CRA home office 2024");
    }

    #[tokio::test]
    async fn test_tool_errors_and_unknown_tools_are_observations() {
        let (agent, client, _search) = advisor_with_search(
            &[
                r#"{"action":"tool","tool":"web_search","arguments":{"query":"x"}}"#,
                r#"{"action":"tool","tool":"calculator","arguments":{}}"#,
                "Based on general rules, keep your receipts.",
            ],
            ToolResult::error("Search failed with status 503 Service Unavailable"),
        );
        let collector = Arc::new(SpanCollector::new("t".to_string(), "web".to_string()));

        let answer = agent.run("q", Some(&collector)).await.unwrap();
        assert_eq!(answer, "Based on general rules, keep your receipts.");

        let AiClient::Mock(mock) = &*client else { panic!("mock client") };
        let calls = mock.calls();
        assert!(calls[1].last().unwrap().content.starts_with("Error from web_search:"));
        let last = &calls[2];
        assert!(last[last.len() - 2].content.contains("no tool named 'calculator'"));
        // Budget of 2 used up, so the last call asks for an answer
        assert_eq!(last.last().unwrap().content, prompts::FORCE_TOOL_FINAL_ANSWER);
        assert_eq!(collector.snapshot()[0].status, SpanStatus::Failed);
    }

    #[tokio::test]
    async fn test_tool_loop_without_answer_fails() {
        let call = r#"{"action":"tool","tool":"web_search","arguments":{"query":"x"}}"#;
        let (agent, _client, _search) = advisor_with_search(&[call, call, call], ToolResult::success("r"));

        let err = agent.run("q", None).await.unwrap_err();
        assert_eq!(err.message, "tax_advisor did not answer within 2 tool calls");
    }

    #[tokio::test]
    async fn test_llm_error_propagates() {
        let client = Arc::new(AiClient::Mock(MockAiClient::new(vec![Err(AiError::with_status("overloaded", 529))])));
        let agent = ManagedAgent::tax_advisor(client);
        let err = agent.run("anything", None).await.unwrap_err();
        assert_eq!(err.status_code, Some(529));
    }
}
