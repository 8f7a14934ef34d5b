//! Email processing pipeline.
//!
//! Every email flows through:
//! 1. `Classifier::classify()`: one label per email
//! 2. `OrderProcessor::process()` for orders, `InquiryHandler::retrieve()` for inquiries
//! 3. `ResponseGenerator::generate()`: the customer reply
//!
//! `Pipeline` runs the emails in table order against one mutable catalog and
//! records each stage's rows through an `OutputSink`.

pub mod classifier;
pub mod inquiry;
pub mod order;
pub mod response;
pub mod retrieval;
pub mod runner;
pub mod types;

pub use classifier::Classifier;
pub use inquiry::InquiryHandler;
pub use order::OrderProcessor;
pub use response::ResponseGenerator;
pub use retrieval::{ProductIndex, RetrievalConfig};
pub use runner::{EmailFailure, Pipeline, RunReport};
