//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - anthropic messages/tools, sent from the agent to the LLM
//! - openai messages/tools, sent from the agent to the LLM
//! - system requests, sent from the agent to the systems providing capabilities
//!
//! These overlap but do not match exactly, so we convert to and from the
//! internal structs at each boundary rather than reusing any wire format
//! directly.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
