//! Interactive terminal front end for the conversation store.
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing
//! - [`render`]: Terminal output

mod commands;
mod config;
mod render;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use render::{PlainTextRenderer, Renderer};
