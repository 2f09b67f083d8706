//! compute_instance resource
//!
//! ## Module Structure
//!
//! - `config` - Typed, validated configuration of an instance
//! - `create` / `read` / `update` / `delete` - Lifecycle operations
//! - `network` - NIC discovery and source/destination check
//! - `power` - Start, stop and reboot
//! - `waiters` - Polling of servers, jobs, orders, volumes and key pair tasks

pub mod config;
pub mod create;
pub mod delete;
pub mod network;
pub mod power;
pub mod read;
pub mod update;
pub mod waiters;

pub use crate::schemas::compute_instance::RESOURCE_TYPE;
pub use create::create;
pub use delete::delete;
pub use read::{import, read};
pub use update::update;
