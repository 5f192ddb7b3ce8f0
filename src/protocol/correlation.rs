use std::fmt;
use uuid::Uuid;

/// Identifier tying a reply slot to the pending `send()` it completes.
///
/// The channel protocol itself carries no correlation data on the wire:
/// replies travel through the transport's reply slot. Transports that park
/// pending sends in a table (such as the memory transport) key that table
/// by correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new unique correlation ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the correlation ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
