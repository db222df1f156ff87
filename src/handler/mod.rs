pub mod agreements;
pub mod chat;
pub mod quotes;
pub mod requests;
pub mod workflow;
