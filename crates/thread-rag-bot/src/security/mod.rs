pub mod slack_signature;

pub use slack_signature::SlackSignatureVerifier;
