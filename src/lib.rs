//! Thin async client for the Lark/Feishu open platform.
//!
//! Covers tenant token exchange, chat listing, rich-text message sending
//! (direct or via webhook), throttled batch dispatch and image upload.
//! Every operation authenticates independently; nothing is cached between
//! calls, and send/upload failures degrade to `None` rather than errors.
//!
//! ```no_run
//! use larkbot::{Config, LarkClient, OutgoingMessage};
//! use serde_json::json;
//!
//! # async fn run() {
//! let client = LarkClient::new(Config::from_env());
//! let chats = client.list_all_chats().await.unwrap();
//! for chat in &chats {
//!     let message = OutgoingMessage::to_chat(&chat.chat_id, json!("hello"));
//!     client.send_message(&message).await;
//! }
//! # }
//! ```

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod image;
pub mod message;
#[cfg(test)]
mod testing;

pub use chat::{Chat, ChatPage, UserIds};
pub use client::LarkClient;
pub use config::Config;
pub use error::{Error, Result};
pub use image::{sniff_dimensions, Dimensions, ImageAsset};
pub use message::{band_delay, OutgoingMessage, SendReceipt, BAND_DELAY, BAND_SIZE};
