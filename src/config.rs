//! Options for persisted cells.

use serde::{Deserialize, Serialize};

/// Options accepted by [`use_persisted_with`](crate::use_persisted_with).
///
/// Deserializes from a partial object, so it can sit inside an application's
/// own configuration file:
///
/// ```
/// use tincan_persist::PersistOptions;
///
/// let options: PersistOptions = serde_json::from_str(r#"{ "write_initial": true }"#).unwrap();
/// assert!(options.write_initial);
///
/// let options: PersistOptions = serde_json::from_str("{}").unwrap();
/// assert_eq!(options, PersistOptions::default());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistOptions {
    /// Write the initial value to storage at construction.
    ///
    /// Off by default: storage is only touched once the value changes.
    pub write_initial: bool,
}

impl PersistOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_initial(mut self, write_initial: bool) -> Self {
        self.write_initial = write_initial;
        self
    }
}
