use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{Dataset, DatasetName, Resource};
use crate::error::BackupError;

/// Seam between the backup orchestration and the CKAN action API. The
/// orchestrator is generic over this trait so tests can substitute a
/// recording mock.
pub trait CatalogClient: Send + Sync {
    /// Resolves a dataset name to its full package record, resources
    /// included. A dataset the catalog does not know is `Ok(None)`, never
    /// an error. Read-only.
    fn lookup_dataset(&self, name: &DatasetName) -> Result<Option<Dataset>, BackupError>;

    /// Creates a new package under `new_name`, copying the source's
    /// display metadata but none of its resources.
    fn create_dataset(&self, source: &Dataset, new_name: &DatasetName)
    -> Result<(), BackupError>;

    /// Reads the resource content from the source catalog and writes it
    /// under the target dataset with the new filename. The original
    /// resource is never altered.
    fn upload_resource(
        &self,
        resource: &Resource,
        target: &DatasetName,
        new_filename: &str,
    ) -> Result<(), BackupError>;

    /// Releases the catalog session. Called on every exit path of an
    /// invocation.
    fn close(self) -> Result<(), BackupError>
    where
        Self: Sized;
}

/// CKAN action API envelope: `{"success": bool, "result": ...}`.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ActionEnvelope<T> {
    success: bool,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Clone, Debug)]
pub struct CkanHttpClient {
    client: Client,
    endpoint: String,
}

impl CkanHttpClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, BackupError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&endpoint)
            .map_err(|_| BackupError::InvalidEndpoint(endpoint.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackupError::InvalidEndpoint(endpoint));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ckan-backup/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BackupError::CatalogHttp(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(api_key)
            .map_err(|_| BackupError::InvalidEndpoint("api key is not header-safe".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/api/3/action/{}", self.endpoint, action)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, BackupError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(BackupError::CatalogStatus { status, message })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, BackupError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(BackupError::CatalogHttp(err.to_string()));
                }
            }
        }
    }

    fn fetch_content(&self, resource: &Resource) -> Result<Vec<u8>, BackupError> {
        let response = self.send_with_retries(|| self.client.get(&resource.url))?;
        let response = Self::handle_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl CatalogClient for CkanHttpClient {
    fn lookup_dataset(&self, name: &DatasetName) -> Result<Option<Dataset>, BackupError> {
        let url = self.action_url("package_show");
        debug!(dataset = %name, "catalog lookup");
        let response =
            self.send_with_retries(|| self.client.get(&url).query(&[("id", name.as_str())]))?;
        // Missing packages come back as 404 with a success=false envelope.
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = Self::handle_status(response)?;
        let envelope: ActionEnvelope<Dataset> = response
            .json()
            .map_err(|err| BackupError::CatalogResponse(err.to_string()))?;
        Ok(Some(lookup_result(envelope)?))
    }

    fn create_dataset(
        &self,
        source: &Dataset,
        new_name: &DatasetName,
    ) -> Result<(), BackupError> {
        let url = self.action_url("package_create");
        debug!(dataset = %new_name, "catalog create");
        let mut payload = source.clone();
        payload.name = new_name.clone();
        payload.resources = Vec::new();
        // Writes are sent exactly once: a replayed create could leave
        // duplicate records behind.
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let envelope: ActionEnvelope<serde_json::Value> = response
            .json()
            .map_err(|err| BackupError::CatalogResponse(err.to_string()))?;
        if !envelope.success {
            return Err(BackupError::CatalogResponse(
                "package_create reported failure".to_string(),
            ));
        }
        Ok(())
    }

    fn upload_resource(
        &self,
        resource: &Resource,
        target: &DatasetName,
        new_filename: &str,
    ) -> Result<(), BackupError> {
        debug!(resource = %resource.name, target = %target, "catalog upload");
        let content = self.fetch_content(resource)?;

        let url = self.action_url("resource_create");
        let mut part = Part::bytes(content).file_name(new_filename.to_string());
        if let Some(mimetype) = &resource.mimetype {
            part = part
                .mime_str(mimetype)
                .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        }
        let mut form = Form::new()
            .text("package_id", target.as_str().to_string())
            .text("name", new_filename.to_string())
            .part("upload", part);
        if let Some(format) = &resource.format {
            form = form.text("format", format.clone());
        }
        if let Some(description) = &resource.description {
            form = form.text("description", description.clone());
        }

        // Writes are sent exactly once, same as package_create.
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let envelope: ActionEnvelope<serde_json::Value> = response
            .json()
            .map_err(|err| BackupError::CatalogResponse(err.to_string()))?;
        if !envelope.success {
            return Err(BackupError::CatalogResponse(
                "resource_create reported failure".to_string(),
            ));
        }
        Ok(())
    }

    fn close(self) -> Result<(), BackupError> {
        // The blocking client releases its pooled connections on drop.
        debug!("catalog session closed");
        Ok(())
    }
}

/// A 2xx `package_show` reply that still carries `success: false` (e.g. an
/// authorization error surfaced in the envelope) is a protocol failure, not
/// a missing dataset. Only a 404 means not found.
fn lookup_result(envelope: ActionEnvelope<Dataset>) -> Result<Dataset, BackupError> {
    if !envelope.success {
        return Err(BackupError::CatalogResponse(
            "package_show reported failure".to_string(),
        ));
    }
    envelope.result.ok_or_else(|| {
        BackupError::CatalogResponse("package_show succeeded without a result".to_string())
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn action_url_joins_endpoint_and_action() {
        let client = CkanHttpClient::new("https://catalog.example.org/", "secret").unwrap();
        assert_eq!(
            client.action_url("package_show"),
            "https://catalog.example.org/api/3/action/package_show"
        );
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = CkanHttpClient::new("ftp://catalog.example.org", "secret").unwrap_err();
        assert_matches!(err, BackupError::InvalidEndpoint(_));
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let err = CkanHttpClient::new("not a url", "secret").unwrap_err();
        assert_matches!(err, BackupError::InvalidEndpoint(_));
    }

    #[test]
    fn envelope_deserializes_missing_result() {
        let envelope: ActionEnvelope<Dataset> =
            serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!envelope.success);
        assert!(envelope.result.is_none());
    }

    #[test]
    fn success_false_envelope_is_a_catalog_error_not_not_found() {
        let envelope: ActionEnvelope<Dataset> = serde_json::from_str(
            r#"{"success": false, "error": {"__type": "Authorization Error"}}"#,
        )
        .unwrap();
        let err = lookup_result(envelope).unwrap_err();
        assert_matches!(err, BackupError::CatalogResponse(_));
    }

    #[test]
    fn success_without_result_is_a_catalog_error() {
        let envelope: ActionEnvelope<Dataset> =
            serde_json::from_str(r#"{"success": true}"#).unwrap();
        let err = lookup_result(envelope).unwrap_err();
        assert_matches!(err, BackupError::CatalogResponse(_));
    }

    #[test]
    fn success_with_result_yields_the_dataset() {
        let envelope: ActionEnvelope<Dataset> = serde_json::from_str(
            r#"{"success": true, "result": {"name": "sensors", "resources": []}}"#,
        )
        .unwrap();
        let dataset = lookup_result(envelope).unwrap();
        assert_eq!(dataset.name.as_str(), "sensors");
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
