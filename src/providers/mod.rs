//! Concrete [`crate::model::Model`] implementations. The core only depends
//! on the abstract contract in `model.rs`; everything under this module is
//! an external-collaborator reference implementation, not part of the core
//! control-flow engine.

pub mod openai;

pub use openai::OpenAiCompatibleModel;
