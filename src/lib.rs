//! mailroom: classify customer emails, fill orders against catalog stock,
//! answer product inquiries, and write the results as tables.

pub mod catalog;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod sheets;
