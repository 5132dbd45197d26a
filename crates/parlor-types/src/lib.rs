pub mod models;

pub use models::{Chat, ChatMessage, ChatStatus, LastMessage, MessageKind};
