pub mod chat;
pub mod waste;
