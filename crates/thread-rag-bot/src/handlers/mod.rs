pub mod health;
pub mod slack_events;
