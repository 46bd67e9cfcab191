use tracing::{debug, warn};

use crate::database::error::DatabaseResult;
use crate::database::keys::{commission, DRIVERS};
use crate::database::SharedStore;

/// Resolves full driver ids from the short prefix carried in external
/// reference numbers
pub struct DriverDirectory {
    store: SharedStore,
}

impl DriverDirectory {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// First driver id (in key order) starting with `prefix`. Searches the
    /// driver profiles, then the commission ledger keys.
    pub async fn find_by_prefix(&self, prefix: &str) -> DatabaseResult<Option<String>> {
        if prefix.is_empty() {
            return Ok(None);
        }

        for directory in [DRIVERS, commission::NAMESPACE] {
            let keys = self.store.child_keys(directory).await?;
            let matches: Vec<&String> = keys.iter().filter(|k| k.starts_with(prefix)).collect();
            match matches.as_slice() {
                [] => debug!(directory, prefix, "no driver id with prefix"),
                [only] => return Ok(Some((*only).clone())),
                [first, ..] => {
                    warn!(
                        directory,
                        prefix,
                        candidates = matches.len(),
                        chosen = %first,
                        "driver prefix is ambiguous, using the first match"
                    );
                    return Ok(Some((*first).clone()));
                }
            }
        }

        Ok(None)
    }
}
