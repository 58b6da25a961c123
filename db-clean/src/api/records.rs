use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    api::client::{ApiClient, ClientError},
    drain::{Collection, RecordStore},
};

// Asks the backend to project listings down to identifiers
const ID_FILTER: &str = r#"{"_id":1}"#;

/// A list response, `{"data": [{"_id": ...}, ...]}`. Other fields are ignored and a missing or
/// null `data` reads as an empty listing.
#[derive(Debug, Default, Deserialize)]
pub struct IdListing {
    #[serde(default)]
    data: Option<Vec<IdEntry>>,
}

#[derive(Debug, Deserialize)]
struct IdEntry {
    #[serde(rename = "_id")]
    id: Value,
}

impl IdListing {
    pub fn into_ids(self) -> Vec<String> {
        self.data
            .unwrap_or_default()
            .into_iter()
            .map(|entry| stringify_id(entry.id))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CountResponse {
    pub data: u64,
}

/// Strings are used as-is, anything else by its JSON text.
pub fn stringify_id(value: Value) -> String {
    match value {
        Value::String(id) => id,
        other => other.to_string(),
    }
}

impl RecordStore for ApiClient {
    type Error = ClientError;

    fn list_ids(&self, collection: Collection) -> Result<Vec<String>, ClientError> {
        let url = self.collection_url(collection)?;
        let listing: IdListing = self.get_json(url, &[("filter", ID_FILTER)])?;
        Ok(listing.into_ids())
    }

    fn delete_by_id(&self, collection: Collection, id: &str) -> Result<(), ClientError> {
        let url = self.record_url(collection, id)?;
        let response = self.send_unchecked(Method::DELETE, url, |req| req)?;
        let status = response.status();
        // Read the body out so the connection goes back to the pool
        let body = response.text()?;
        if !status.is_success() {
            debug!(%collection, id, %status, body = %body, "ignoring failed delete");
        }
        Ok(())
    }

    fn count(&self, collection: Collection) -> Result<u64, ClientError> {
        let url = self.collection_url(collection)?;
        let count: CountResponse = self.get_json(url, &[("count", "true")])?;
        Ok(count.data)
    }
}
