//! Lutron Integration Protocol (LIP) implementation
//!
//! This crate implements the line-oriented telnet protocol spoken by
//! RadioRA 2 / HomeWorks QS repeaters: login handshake, keep-alives,
//! response parsing and command construction.

pub mod action;
pub mod commands;
pub mod connection;
pub mod message;
pub mod parser;
pub mod socket;
pub mod types;

pub use action::{DeviceAction, LipAction, OutputAction};
pub use commands::LipCommand;
pub use connection::{LipConfig, LipConnection};
pub use message::{LipMessage, LipValue};
pub use parser::{KeepAliveClock, LipParser};
pub use socket::LineSocket;
pub use types::*;
