//! The manager agent: a bounded decide-delegate-observe loop.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::action::{parse_action, ManagerAction};
use super::managed::ManagedAgent;
use super::prompts;
use super::{RunOutput, RunTask, Runner};
use crate::ai::{AiClient, AiError, Message};
use crate::telemetry::{SpanCollector, SpanGuard, SpanType};

pub struct ManagerAgent {
    client: Arc<AiClient>,
    agents: Vec<ManagedAgent>,
    max_steps: usize,
}

impl ManagerAgent {
    pub fn new(client: Arc<AiClient>, agents: Vec<ManagedAgent>, max_steps: usize) -> Self {
        Self {
            client,
            agents,
            max_steps: max_steps.max(1),
        }
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    fn system_prompt(&self) -> String {
        let roster: Vec<(&str, &str)> = self
            .agents
            .iter()
            .map(|a| (a.name(), a.description()))
            .collect();
        prompts::manager_prompt(&roster)
    }

    /// One model call, recorded as an LLM span when the turn is being recorded.
    async fn call_model(&self, recording: Option<&Arc<SpanCollector>>, messages: Vec<Message>) -> Result<String, AiError> {
        let mut span = recording.map(|c| c.start_guarded(SpanType::LlmCall, self.client.provider_name()));
        if let Some(s) = span.as_mut() {
            s.set_attribute("messages", json!(messages.len()));
        }

        let result = self.client.generate_text(messages).await;
        match (&result, span) {
            (Ok(reply), Some(mut s)) => {
                s.set_attribute("reply_chars", json!(reply.chars().count()));
                s.succeed();
            }
            (Err(e), Some(s)) => s.fail(e.to_string()),
            (_, None) => {}
        }
        result
    }

    /// Run a delegated task and turn its outcome into an observation for the manager.
    async fn delegate(&self, recording: Option<&Arc<SpanCollector>>, agent_name: &str, task: &str) -> String {
        let Some(agent) = self.agents.iter().find(|a| a.name() == agent_name) else {
            log::warn!("[MANAGER] Unknown agent requested: {}", agent_name);
            return format!(
                "Error: there is no agent named '{}'. Available agents: {}.",
                agent_name,
                self.agent_names().join(", ")
            );
        };

        let mut span = recording.map(|c| c.start_guarded(SpanType::Delegation, agent_name));
        if let Some(s) = span.as_mut() {
            s.set_attribute("task", json!(task));
        }

        log::info!("[MANAGER] Delegating to {}", agent_name);
        match agent.run(task, recording).await {
            Ok(answer) => {
                if let Some(mut s) = span {
                    s.set_attribute("answer_chars", json!(answer.chars().count()));
                    s.set_attribute("answer", json!(answer));
                    s.succeed();
                }
                format!("Observation from {}:\n{}", agent_name, answer)
            }
            Err(e) => {
                log::warn!("[MANAGER] {} failed: {}", agent_name, e);
                if let Some(s) = span {
                    s.fail(e.to_string());
                }
                format!("Error from {}: {}", agent_name, e)
            }
        }
    }
}

fn complete(span: Option<SpanGuard>, result: Result<(), &AiError>) {
    if let Some(span) = span {
        match result {
            Ok(()) => span.succeed(),
            Err(e) => span.fail(e.to_string()),
        }
    }
}

#[async_trait]
impl Runner for ManagerAgent {
    async fn run(&self, task: &RunTask) -> Result<RunOutput, AiError> {
        let recording = task.recording.as_ref();
        let mut messages = vec![
            Message::system(self.system_prompt()),
            Message::user(format!("New task:\n{}", task.instruction)),
        ];

        for step in 1..=self.max_steps {
            let mut span = recording.map(|c| c.start_guarded(SpanType::ManagerStep, "manager"));
            if let Some(s) = span.as_mut() {
                s.set_attribute("step", json!(step));
            }

            let reply = match self.call_model(recording, messages.clone()).await {
                Ok(reply) => reply,
                Err(e) => {
                    complete(span, Err(&e));
                    return Err(e);
                }
            };
            let action = parse_action(&reply);
            messages.push(Message::assistant(reply));

            match action {
                ManagerAction::FinalAnswer(answer) => {
                    log::info!("[MANAGER] Final answer after {} step(s)", step);
                    complete(span, Ok(()));
                    return Ok(RunOutput::text(answer));
                }
                ManagerAction::Delegate { agent, task: subtask } => {
                    if let Some(s) = span.as_mut() {
                        s.set_attribute("delegate_to", json!(agent));
                    }
                    let observation = self.delegate(recording, &agent, &subtask).await;
                    messages.push(Message::user(observation));
                    complete(span, Ok(()));
                }
            }
        }

        log::warn!("[MANAGER] Step budget of {} exhausted, forcing a final answer", self.max_steps);
        messages.push(Message::user(prompts::FORCE_FINAL_ANSWER));

        let span = recording.map(|c| c.start_guarded(SpanType::ManagerStep, "manager_final"));
        let reply = match self.call_model(recording, messages).await {
            Ok(reply) => reply,
            Err(e) => {
                complete(span, Err(&e));
                return Err(e);
            }
        };

        match parse_action(&reply) {
            ManagerAction::FinalAnswer(answer) => {
                complete(span, Ok(()));
                Ok(RunOutput::text(answer))
            }
            ManagerAction::Delegate { .. } => {
                let err = AiError::new(format!(
                    "Manager did not produce a final answer within {} steps",
                    self.max_steps
                ));
                complete(span, Err(&err));
                Err(err)
            }
        }
    }
}
