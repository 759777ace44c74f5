// src/cloudllm/mod.rs

//! Vendor LLM client plumbing, kept from the teacher repo this crate was
//! built out of. [`crate::swarm::llm_adapter::ClientWrapperProvider`] adapts
//! [`client_wrapper::ClientWrapper`] onto this crate's own [`crate::swarm::llm::LlmProvider`]
//! trait, so the CLI binary has a real provider to run against.

pub mod client_wrapper;
pub mod clients;
pub mod image_generation;
