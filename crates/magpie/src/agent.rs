use anyhow::Result;
use async_stream;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{ToolError, ToolResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Provider;
use crate::systems::System;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful coding assistant. You help users with programming tasks, code review, debugging, and software development questions. Be concise but thorough in your responses.";

/// Budgets for a single reply run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyOptions {
    /// Maximum number of tool call rounds before the run is cut off
    pub max_steps: usize,
    /// Total output tokens the run may spend across all completions
    pub max_output_tokens: i32,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_output_tokens: 32_000,
        }
    }
}

impl ReplyOptions {
    /// Smaller output budget suited to interactive chat traffic
    pub fn lightweight() -> Self {
        Self {
            max_output_tokens: 2_000,
            ..Self::default()
        }
    }

    /// More tool call rounds for tasks that take many edits to land
    pub fn long_horizon() -> Self {
        Self {
            max_steps: 200,
            ..Self::default()
        }
    }
}

/// How a reply run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model produced a final text response
    Completed,
    /// A step or token budget ran out before the model finished
    BudgetExceeded,
}

/// The collected result of a one shot run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// All assistant text produced during the run, joined with newlines
    pub response: String,
    /// Number of tool call rounds that were executed
    pub steps: usize,
    pub outcome: RunOutcome,
}

/// Restores the process working directory when dropped
struct CwdGuard {
    original: PathBuf,
}

impl CwdGuard {
    fn change_to(path: &Path) -> Result<Self> {
        let original = std::env::current_dir()?;
        std::env::set_current_dir(path)?;
        Ok(Self { original })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
        }
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// Get all tools from all systems with proper system prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for system in &self.systems {
            for tool in system.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", system.name(), tool.name),
                    &tool.description,
                    tool.input_schema.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate system for a tool call based on the prefixed name
    fn get_system_for_tool(&self, prefixed_name: &str) -> Option<&dyn System> {
        let parts: Vec<&str> = prefixed_name.split("__").collect();
        if parts.len() != 2 {
            return None;
        }
        let system_name = parts[0];
        self.systems
            .iter()
            .find(|sys| sys.name() == system_name)
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(&self, tool_call: ToolResult<ToolCall>) -> ToolResult<Vec<Content>> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split("__")
            .nth(1)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;
        let system_tool_call = ToolCall::new(tool_name, call.arguments);

        system.call(system_tool_call).await
    }

    /// Compose the operating instructions with each system's own instructions
    fn get_system_prompt(&self, base: &str) -> String {
        let mut sections = vec![base.to_string()];
        for system in &self.systems {
            sections.push(format!("## {}\n{}", system.name(), system.instructions()));
        }
        sections.join("\n\n")
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    ///
    /// A leading system message in `messages` supplies the operating
    /// instructions for the run; without one the default prompt is used.
    /// The run ends when the model stops requesting tools or when one of
    /// the budgets in `options` runs out, whichever comes first.
    pub async fn reply(
        &self,
        messages: &[Message],
        options: &ReplyOptions,
    ) -> Result<BoxStream<'_, Result<Message>>> {
        let (system_prompt, mut messages) = match messages.split_first() {
            Some((first, rest)) if first.role == Role::System => {
                (self.get_system_prompt(&first.text()), rest.to_vec())
            }
            _ => (
                self.get_system_prompt(DEFAULT_SYSTEM_PROMPT),
                messages.to_vec(),
            ),
        };
        let tools = self.get_prefixed_tools();
        let max_steps = options.max_steps;
        let mut remaining_tokens = options.max_output_tokens;
        let mut steps: usize = 0;

        Ok(Box::pin(async_stream::try_stream! {
            loop {
                // Get completion from provider
                let (response, usage) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;

                // Yield the assistant's response
                yield response.clone();

                // Not sure why this is needed, but this ensures that the above message is yielded
                // before the following potentially long-running commands start processing
                tokio::task::yield_now().await;

                remaining_tokens =
                    remaining_tokens.saturating_sub(usage.output_tokens.unwrap_or(0));

                // First collect any tool requests
                let tool_requests: Vec<&ToolRequest> = response.content
                    .iter()
                    .filter_map(|content| content.as_tool_request())
                    .collect();

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    tracing::debug!(steps, "agent run completed");
                    break;
                }

                if remaining_tokens <= 0 {
                    // Out of output budget, any further tool results would never be seen
                    tracing::info!(steps, "output token budget exhausted, stopping run");
                    break;
                }

                // Then dispatch each in parallel
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();

                // Process all the futures in parallel but wait until all are finished
                let outputs = futures::future::join_all(futures).await;

                // Create a message with the responses
                let mut message_tool_response = Message::user();
                // Now combine these into MessageContent::ToolResponse using the original ID
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response.clone());
                messages.push(message_tool_response);

                steps += 1;
                if steps >= max_steps {
                    tracing::info!(steps, "step budget exhausted, stopping run");
                    break;
                }
            }
        }))
    }

    /// Run a single prompt to completion, optionally inside another working
    /// directory, and collect the result. The previous working directory is
    /// restored when the run finishes, including on error.
    pub async fn run_scoped(
        &self,
        prompt: &str,
        working_directory: Option<&Path>,
        options: &ReplyOptions,
    ) -> Result<RunSummary> {
        use futures::TryStreamExt;

        let _cwd = working_directory.map(CwdGuard::change_to).transpose()?;

        let messages = vec![
            Message::system().with_text(DEFAULT_SYSTEM_PROMPT),
            Message::user().with_text(prompt),
        ];

        let mut stream = self.reply(&messages, options).await?;

        let mut texts: Vec<String> = Vec::new();
        let mut steps = 0;
        let mut completed = false;
        while let Some(message) = stream.try_next().await? {
            match message.role {
                Role::Assistant => {
                    completed = !message.has_tool_request();
                    let text = message.text();
                    if !text.is_empty() {
                        texts.push(text);
                    }
                }
                Role::User => {
                    steps += 1;
                    completed = false;
                }
                Role::System => {}
            }
        }

        let outcome = if completed {
            RunOutcome::Completed
        } else {
            RunOutcome::BudgetExceeded
        };

        Ok(RunSummary {
            response: texts.join("\n"),
            steps,
            outcome,
        })
    }
}
