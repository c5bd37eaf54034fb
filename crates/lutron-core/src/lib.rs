//! Lutron device layer
//!
//! This crate provides device state tracking and control for a Lutron
//! installation on top of the low-level LIP connection.

pub mod coordinator;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod system;

pub use coordinator::{CoordinatorUpdate, UpdateCoordinator};
pub use device::{Button, Inventory, Keypad, OccupancyGroup, Output, OutputKind, Sysvar};
pub use error::CoreError;
pub use persistence::InventoryStore;
pub use registry::Registry;
pub use system::{DeviceKind, LutronSystem, SystemEvent, SystemStatus};
