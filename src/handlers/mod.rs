//! Event consumers.
//!
//! Each consumer is an [`EventHandler`](crate::bus::EventHandler) attached to
//! a bus subscriber.

pub mod denormalizer;

pub use denormalizer::{DenormalizeError, Denormalizer, LikeIdStrategy};
