//! HTTP adapter for the content-addressed store's pin/list/unpin RPC.
//!
//! Speaks the store daemon's HTTP API (`/api/v0/ls`, `/api/v0/pin/add`,
//! `/api/v0/pin/rm`). The endpoint is injected at construction; the default
//! matches a locally running daemon.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::errors::GovernanceError;
use crate::ports::outbound::{ContentEntry, ContentListing, ContentStore};

/// Blocking HTTP client for the content store.
pub struct IpfsHttpStore {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl IpfsHttpStore {
    /// The daemon's conventional local endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://127.0.0.1:5001";

    pub fn new(endpoint: impl Into<String>) -> Result<Self, GovernanceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GovernanceError::ContentStore(e.to_string()))?;
        Ok(Self { endpoint: endpoint.into(), client })
    }

    pub fn with_default_endpoint() -> Result<Self, GovernanceError> {
        Self::new(Self::DEFAULT_ENDPOINT)
    }

    fn call(&self, command: &str, query: &[(&str, &str)]) -> Result<reqwest::blocking::Response, GovernanceError> {
        let url = format!("{}/api/v0/{}", self.endpoint, command);
        let response = self
            .client
            .post(url)
            .query(query)
            .send()
            .map_err(|e| GovernanceError::ContentStore(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GovernanceError::ContentStore(format!(
                "{} returned {}",
                command,
                response.status()
            )));
        }
        Ok(response)
    }
}

/// Wire shape of the daemon's `ls` response.
#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

impl ContentStore for IpfsHttpStore {
    fn files_ls(&self, path: &str) -> Result<ContentListing, GovernanceError> {
        let response = self.call("ls", &[("arg", path)])?;
        let body: LsResponse = response
            .json()
            .map_err(|e| GovernanceError::ContentStore(e.to_string()))?;

        let entries = body
            .objects
            .into_iter()
            .flat_map(|obj| obj.links)
            .map(|link| ContentEntry { name: link.name, size: link.size, children: Vec::new() })
            .collect();
        Ok(ContentListing { entries })
    }

    fn pin_add(&self, path: &str) -> Result<(), GovernanceError> {
        self.call("pin/add", &[("arg", path)]).map(|_| ())
    }

    fn pin_rm(&self, path: &str, recursive: bool) -> Result<(), GovernanceError> {
        let recursive = if recursive { "true" } else { "false" };
        self.call("pin/rm", &[("arg", path), ("recursive", recursive)])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ls_response_decodes_daemon_shape() {
        let body = r#"{
            "Objects": [{
                "Hash": "QmSrPmbaUKA3ZodhzPWZnpFgcPMFWF4QsxXbkWfEptTBJd",
                "Links": [
                    {"Name": "a.bin", "Hash": "Qm1", "Size": 1024, "Type": 2},
                    {"Name": "b.bin", "Hash": "Qm2", "Size": 2048, "Type": 2}
                ]
            }]
        }"#;
        let parsed: LsResponse = serde_json::from_str(body).unwrap();
        let entries: Vec<ContentEntry> = parsed
            .objects
            .into_iter()
            .flat_map(|o| o.links)
            .map(|l| ContentEntry { name: l.name, size: l.size, children: Vec::new() })
            .collect();
        let listing = ContentListing { entries };
        assert_eq!(listing.total_size(), 3072);
    }

    #[test]
    fn endpoint_is_injectable() {
        let store = IpfsHttpStore::new("http://10.0.0.5:5001").unwrap();
        assert_eq!(store.endpoint, "http://10.0.0.5:5001");
    }
}
