//! Live chat delivery.
//!
//! Sessions join a named group and receive every [`RoomEvent`] sent to it:
//! chat messages plus the control events that follow membership changes.
//! A single process delivers through the in-memory [`ChatHub`]; several API
//! processes share groups through the Redis relay.
//!
//! [`RoomEvent`]: elearn_common::types::RoomEvent

pub mod hub;
pub mod layer;
pub mod relay;

pub use hub::{ChatHub, group_name};
pub use layer::ChannelLayer;
pub use relay::RedisRelay;
