//! Typed request and response bodies of the HCS REST APIs
//!
//! Each module covers one service and exposes free functions taking a
//! [`ServiceClient`](crate::client::ServiceClient) bound to that service.

pub mod bss;
pub mod ecs;
pub mod evs;
pub mod ims;
pub mod kps;
pub mod nova;
pub mod sfs_turbo;
pub mod vpc;

/// Serde helper for `skip_serializing_if` on integers
pub(crate) fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// Deserialize `null` as the type's default value
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + serde::Deserialize<'de>,
{
    use serde::Deserialize;
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
