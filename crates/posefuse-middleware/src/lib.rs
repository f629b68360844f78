//! `posefuse-middleware` – event routing for fused poses.
//!
//! Carries the filter's output to any number of observers without letting
//! a slow observer hold up the fusion loop.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
