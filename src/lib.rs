//! `mailscrub` — a streaming mail cleanup pipeline.
//!
//! This crate provides the core library for turning a stream of typed
//! envelope/header/body records into a validated, canonicalized queue file
//! ready for the next delivery stage.

pub mod address;
pub mod config;
pub mod error;
pub mod inspect;
pub mod pipeline;
pub mod record;
pub mod status;
