use async_trait::async_trait;

use crate::errors::MediumError;

/// A durable string key-value medium shared by every session on a device
/// (or, for the PostgreSQL implementation, by every device of an owner).
///
/// Values are opaque strings. Anything that needs read-modify-write semantics
/// must go through [`compare_and_swap`](DurableMedium::compare_and_swap);
/// `get` followed by `put` is not atomic.
#[async_trait]
pub trait DurableMedium: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, MediumError>;

    /// Unconditionally store `value` under `key`.
    async fn put(&self, key: &str, value: &str) -> Result<(), MediumError>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), MediumError>;

    /// Atomically replace the value under `key` if it currently equals
    /// `expected`.
    ///
    /// `expected = None` means "the key must be absent", `new = None` means
    /// "delete the key". Returns `true` when the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, MediumError>;
}
