//! # Cache Manager
//!
//! Application-scoped owner of the per-channel-type factory caches and
//! their cache settings.

pub mod manager;

pub use manager::ChannelFactoryCacheManager;
