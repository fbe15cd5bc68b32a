//! FeedbackEmitter: LLM judges that grade each recorded answer.
//!
//! Two feedback functions run per successful turn:
//! - groundedness: is the answer supported by what the agents observed
//!   (sub-agent answers and tool output recorded on the turn)?
//! - answer relevance: does the answer address the user's question?
//!
//! Each grade is a score in `0.0..=1.0` recorded as a `Feedback` span on the
//! turn's collector. A judge that fails leaves a failed span and nothing else.

use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

use super::span::{SpanCollector, SpanType};
use crate::ai::{AiClient, AiError, Message};

static SCORE_LINE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)score\s*[:=]?\s*(\d+(?:\.\d+)?)").ok());
static FIRST_NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").ok());

/// Judges grade on a 0-10 scale
const SCALE_MAX: f64 = 10.0;

/// Longest stretch of gathered context handed to a judge
const MAX_CONTEXT_CHARS: usize = 12_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Groundedness,
    AnswerRelevance,
}

impl FeedbackKind {
    pub const ALL: [FeedbackKind; 2] = [FeedbackKind::Groundedness, FeedbackKind::AnswerRelevance];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Groundedness => "groundedness",
            FeedbackKind::AnswerRelevance => "answer_relevance",
        }
    }

    fn criterion(&self) -> &'static str {
        match self {
            FeedbackKind::Groundedness => {
                "GROUNDEDNESS: how well every claim in the ANSWER is supported by the CONTEXT. \
                 Claims the CONTEXT does not support lower the score. \
                 With no CONTEXT, judge against the QUESTION alone."
            }
            FeedbackKind::AnswerRelevance => {
                "RELEVANCE: how directly and completely the ANSWER addresses the QUESTION."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackScore {
    pub kind: FeedbackKind,
    /// Normalized to `0.0..=1.0`
    pub score: f64,
    pub reason: String,
}

/// Emits feedback spans for finished turns.
pub struct FeedbackEmitter {
    client: Arc<AiClient>,
}

impl FeedbackEmitter {
    pub fn new(client: Arc<AiClient>) -> Self {
        Self { client }
    }

    /// Grade `output` against `input` and the context recorded so far, and
    /// record one span per feedback function. Judges run concurrently.
    pub async fn evaluate(&self, collector: &Arc<SpanCollector>, input: &str, output: &str) -> Vec<FeedbackScore> {
        let context = gathered_context(collector);

        let judged = FeedbackKind::ALL.map(|kind| {
            let span = collector.start_span(SpanType::Feedback, kind.as_str());
            let context = context.as_str();
            async move { (kind, span, self.judge(kind, input, context, output).await) }
        });

        let mut scores = Vec::new();
        for (kind, mut span, result) in join_all(judged).await {
            match result {
                Ok(score) => {
                    log::info!(
                        "[FEEDBACK] Turn {} {}={:.2}",
                        collector.turn_id(),
                        kind.as_str(),
                        score.score
                    );
                    span.attributes = json!({
                        "feedback": kind.as_str(),
                        "score": score.score,
                        "reason": score.reason,
                    });
                    span.succeed();
                    scores.push(score);
                }
                Err(e) => {
                    log::warn!("[FEEDBACK] Turn {} {} judge failed: {}", collector.turn_id(), kind.as_str(), e);
                    span.attributes = json!({ "feedback": kind.as_str() });
                    span.fail(e.to_string());
                }
            }
            collector.record(span);
        }
        scores
    }

    async fn judge(&self, kind: FeedbackKind, input: &str, context: &str, output: &str) -> Result<FeedbackScore, AiError> {
        let system = format!(
            "You are an impartial evaluator. Grade {}\n\n\
             Reply with `Score: <0-10>` on the first line and a one-sentence reason on the second.",
            kind.criterion()
        );
        let body = match kind {
            FeedbackKind::Groundedness => format!(
                "QUESTION:\n{}\n\nCONTEXT:\n{}\n\nANSWER:\n{}",
                input,
                if context.is_empty() { "(none)" } else { context },
                output
            ),
            FeedbackKind::AnswerRelevance => format!("QUESTION:\n{}\n\nANSWER:\n{}", input, output),
        };

        let reply = self
            .client
            .generate_text(vec![Message::system(system), Message::user(body)])
            .await?;

        let (score, reason) = parse_score(&reply)
            .ok_or_else(|| AiError::new(format!("Judge reply has no score: {}", reply.trim())))?;
        Ok(FeedbackScore { kind, score, reason })
    }
}

/// Sub-agent answers and tool output recorded on the turn, oldest first.
fn gathered_context(collector: &SpanCollector) -> String {
    let mut spans = collector.snapshot();
    spans.sort_by_key(|s| s.sequence_id);

    let mut context = String::new();
    for span in spans {
        let key = match span.span_type {
            SpanType::Delegation => "answer",
            SpanType::ToolCall => "output",
            _ => continue,
        };
        if let Some(text) = span.attributes.get(key).and_then(|v| v.as_str()) {
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&format!("[{}]\n{}", span.name, text));
        }
    }

    if context.chars().count() > MAX_CONTEXT_CHARS {
        context = context.chars().take(MAX_CONTEXT_CHARS).collect();
    }
    context
}

/// Read a 0-10 grade out of a judge reply as a `0.0..=1.0` score plus the reason.
fn parse_score(reply: &str) -> Option<(f64, String)> {
    let number = SCORE_LINE
        .as_ref()
        .and_then(|re| re.captures(reply))
        .or_else(|| FIRST_NUMBER.as_ref().and_then(|re| re.captures(reply)))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())?;

    let reason = reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !SCORE_LINE.as_ref().is_some_and(|re| re.is_match(l)))
        .collect::<Vec<_>>()
        .join(" ");

    Some(((number / SCALE_MAX).clamp(0.0, 1.0), reason))
}
