//! Hosted model clients implementing [`shared::gateway::AssistanceGateway`].

pub mod gemini;

pub use gemini::GeminiClient;
