//! redb table definitions for the registry store.
//!
//! Instance rows use composite keys so that every version of an instance is
//! retained: `{container_name}@{version:010}`. The active index maps a
//! ruleset identity key (`{tenant}/{policy_type}`) to the row key of its
//! single active instance.

use redb::TableDefinition;

/// Runtime instance rows keyed by `{container_name}@{version:010}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Active-instance index keyed by `{tenant}/{policy_type}` → instance row key.
pub const ACTIVE: TableDefinition<&str, &str> = TableDefinition::new("active");

/// Append-only deployment history keyed by monotonic sequence number.
pub const HISTORY: TableDefinition<u64, &[u8]> = TableDefinition::new("history");

/// Host-port reservations keyed by port → container name.
///
/// A reservation exists from allocation until the owning instance is
/// registered (at which point the port is visible through its active row)
/// or explicitly released.
pub const PORTS: TableDefinition<u16, &str> = TableDefinition::new("ports");

/// Compose an instance row key.
pub fn instance_key(container_name: &str, version: u32) -> String {
    format!("{container_name}@{version:010}")
}
