pub mod agreement_service;
pub mod background_jobs;
pub mod chat_service;
pub mod error;
pub mod events;
pub mod provider_status;
pub mod quote_service;
pub mod request_service;
pub mod workflow_service;

#[cfg(test)]
pub mod test_support;
