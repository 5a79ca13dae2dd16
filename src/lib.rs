//! Multilingual assistant relay.
//!
//! The server side ([`api`]) validates requests and relays them to hosted
//! chat, translation, speech, and vision providers through
//! [`relay::FallbackRelay`] chains. The [`client`] module drives the same
//! API from an interactive front end through injectable device capabilities.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod ocr;
pub mod providers;
pub mod relay;
