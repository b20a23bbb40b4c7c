//! The logged-in account, as far as this engine needs to know it.

use serde_json::Value;

use cadence_shared::AccountId;

/// Current account. Constructed by the (external) auth flow and handed to
/// the service at login.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: AccountId,
    pub display_name: String,
    /// Raw login payload. The backend embeds an initial `streams` list here
    /// so the feed can render before the first explicit refresh.
    pub data: Value,
}

impl Session {
    pub fn new(id: AccountId, display_name: impl Into<String>, data: Value) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            data,
        }
    }

    /// The stream payload list embedded in the login response, if any.
    pub fn embedded_streams(&self) -> Option<&Vec<Value>> {
        self.data.get("streams")?.as_array()
    }
}
