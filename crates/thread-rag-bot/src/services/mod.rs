pub mod conversation;
pub mod gemini;
pub mod knowledge;
pub mod slack;

pub use conversation::ConversationRouter;
pub use gemini::GeminiClient;
pub use knowledge::KnowledgeBaseSync;
pub use slack::SlackClient;
