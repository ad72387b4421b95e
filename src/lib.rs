//! medrag - Multimodal retrieval-augmented question answering over medical images
//!
//! This crate builds a dual-vector (caption + image) index from a labeled
//! radiology dataset, retrieves similar prior cases for a question and an
//! optional scan, and asks a multimodal language model to answer with those
//! cases as reference context.

pub mod config;
pub mod dataset;
pub mod domain;
pub mod embedding;
pub mod index;
pub mod providers;
pub mod retrieval;
pub mod services;
pub mod storage;

pub use services::MultimodalAssistant;
