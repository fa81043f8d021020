//! Insurance Intake — a chat bot that walks users through document upload,
//! data confirmation, price acceptance and policy issuance.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod registration;
pub mod storage;
pub mod telemetry;
