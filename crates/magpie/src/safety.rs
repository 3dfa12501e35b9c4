use async_trait::async_trait;
use indoc::indoc;
use serde::{Deserialize, Serialize};

use crate::errors::{ToolError, ToolResult};
use crate::models::message::Message;
use crate::providers::base::Provider;

/// Outcome of reviewing a shell command before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Safe,
    Destructive,
}

/// Reviews a shell command before the agent is allowed to run it.
///
/// The review happens before any other processing of the command, including
/// working directory resolution. Implementations may be backed by a model,
/// an allow list, or any combination; the dispatch code only sees the verdict.
#[async_trait]
pub trait CommandClassifier: Send + Sync {
    async fn classify(&self, command: &str) -> ToolResult<Verdict>;
}

const REVIEWER_PROMPT: &str = indoc! {r#"
    You are a bash command safety reviewer. You are given a command that a
    local coding agent wants to run. Review the command and reply with a JSON
    object containing the single key "result", whose value is either "safe"
    or "destructive". Reply with just the object, nothing else.

    Examples:
    ls => {"result": "safe"}
    rm -rf / => {"result": "destructive"}
"#};

/// Classifier backed by an auxiliary language model.
///
/// The reviewer model is typically a faster, cheaper tier than the one
/// driving the agent. The classification is itself model output and can be
/// wrong in either direction, so it is a heuristic, not a guarantee.
pub struct ModelClassifier {
    provider: Box<dyn Provider>,
}

impl ModelClassifier {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CommandClassifier for ModelClassifier {
    async fn classify(&self, command: &str) -> ToolResult<Verdict> {
        let messages = vec![Message::user().with_text(command)];
        let (response, _) = self
            .provider
            .complete(REVIEWER_PROMPT, &messages, &[])
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Command review failed: {}", e)))?;

        // A reply we cannot interpret blocks the command
        let verdict = parse_verdict(&response.text()).unwrap_or(Verdict::Destructive);
        tracing::info!(command, ?verdict, "command reviewed");
        Ok(verdict)
    }
}

#[derive(Deserialize)]
struct ReviewOutcome {
    result: Verdict,
}

fn parse_verdict(text: &str) -> Option<Verdict> {
    let trimmed = text.trim();
    // Models occasionally wrap the object in prose or code fences
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    serde_json::from_str::<ReviewOutcome>(candidate)
        .ok()
        .map(|outcome| outcome.result)
}

#[cfg(test)]
pub(crate) struct StaticClassifier {
    verdict: Verdict,
}

#[cfg(test)]
impl StaticClassifier {
    pub(crate) fn new(verdict: Verdict) -> Self {
        Self { verdict }
    }
}

#[cfg(test)]
#[async_trait]
impl CommandClassifier for StaticClassifier {
    async fn classify(&self, _command: &str) -> ToolResult<Verdict> {
        Ok(self.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    #[test]
    fn test_parse_verdict_plain_object() {
        assert_eq!(
            parse_verdict(r#"{"result": "safe"}"#),
            Some(Verdict::Safe)
        );
        assert_eq!(
            parse_verdict(r#"{"result": "destructive"}"#),
            Some(Verdict::Destructive)
        );
    }

    #[test]
    fn test_parse_verdict_fenced_object() {
        let reply = "```json\n{\"result\": \"safe\"}\n```";
        assert_eq!(parse_verdict(reply), Some(Verdict::Safe));
    }

    #[test]
    fn test_parse_verdict_garbage() {
        assert_eq!(parse_verdict("I think that command is fine"), None);
        assert_eq!(parse_verdict(r#"{"result": "maybe"}"#), None);
    }

    #[tokio::test]
    async fn test_model_classifier_blocks_on_unparseable_reply() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_text("that looks okay to me")
        ]);
        let classifier = ModelClassifier::new(Box::new(provider));

        let verdict = classifier.classify("ls").await.unwrap();
        assert_eq!(verdict, Verdict::Destructive);
    }

    #[tokio::test]
    async fn test_model_classifier_reads_verdict() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_text(r#"{"result": "safe"}"#)
        ]);
        let classifier = ModelClassifier::new(Box::new(provider));

        let verdict = classifier.classify("ls").await.unwrap();
        assert_eq!(verdict, Verdict::Safe);
    }
}
