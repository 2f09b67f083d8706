//! HCS Core
//!
//! Framework-side building blocks shared by the Huawei Cloud Stack provider:
//! declared resources and their state, attribute schemas, diffing, the
//! provider trait and the state poller.

pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod wait;
