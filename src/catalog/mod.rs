use crate::table::Table;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.openml.org";

#[derive(Debug, Deserialize)]
struct DescriptionEnvelope {
    data_set_description: DatasetDescription,
}

/// The catalog's description of one dataset. OpenML serves numeric fields as
/// JSON strings, so `id`/`file_id` stay strings here.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDescription {
    pub id: String,
    pub name: String,
    /// Id of the backing data file, used by the CSV download endpoint.
    pub file_id: String,
    /// Declared outcome column, absent for unsupervised datasets.
    #[serde(default)]
    pub default_target_attribute: Option<String>,
}

/// Blocking client for the OpenML dataset catalog. One lookup, one download,
/// no retries; any HTTP or decode failure is fatal to the fetch.
pub struct Catalog {
    client: Client,
    base: Url,
}

impl Default for Catalog {
    fn default() -> Self {
        // DEFAULT_BASE_URL is a valid constant URL
        Self::with_base_url(Url::parse(DEFAULT_BASE_URL).unwrap())
    }
}

impl Catalog {
    pub fn with_base_url(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    fn description_url(&self, dataset_id: u64) -> Result<Url> {
        self.base
            .join(&format!("/api/v1/json/data/{}", dataset_id))
            .context("building description URL")
    }

    fn data_url(&self, file_id: &str) -> Result<Url> {
        self.base
            .join(&format!("/data/v1/get_csv/{}", file_id))
            .context("building data URL")
    }

    /// Look up the dataset description by numeric id.
    pub fn fetch_description(&self, dataset_id: u64) -> Result<DatasetDescription> {
        let url = self.description_url(dataset_id)?;
        debug!(%url, "fetching dataset description");
        let envelope: DescriptionEnvelope = self
            .client
            .get(url.as_str())
            .send()
            .with_context(|| format!("requesting `{}`", url))?
            .error_for_status()
            .with_context(|| format!("catalog lookup for dataset id={}", dataset_id))?
            .json()
            .context("decoding dataset description")?;
        Ok(envelope.data_set_description)
    }

    /// Download the dataset's CSV body and parse it into a table. The served
    /// CSV already contains the declared outcome column alongside the
    /// features.
    pub fn fetch_table(&self, desc: &DatasetDescription) -> Result<Table> {
        let url = self.data_url(&desc.file_id)?;
        debug!(%url, "downloading dataset CSV");
        let bytes = self
            .client
            .get(url.as_str())
            .send()
            .with_context(|| format!("requesting `{}`", url))?
            .error_for_status()
            .with_context(|| format!("downloading data for `{}`", desc.name))?
            .bytes()
            .context("reading dataset body")?;
        Table::from_csv_bytes(&bytes)
            .with_context(|| format!("parsing downloaded CSV for `{}`", desc.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_description() {
        let json = r#"{
            "data_set_description": {
                "id": "45580",
                "name": "orange_belgium",
                "version": "1",
                "file_id": "22102711",
                "default_target_attribute": "y",
                "upload_date": "2023-07-10T12:00:00"
            }
        }"#;
        let envelope: DescriptionEnvelope = serde_json::from_str(json).unwrap();
        let desc = envelope.data_set_description;
        assert_eq!(desc.id, "45580");
        assert_eq!(desc.name, "orange_belgium");
        assert_eq!(desc.file_id, "22102711");
        assert_eq!(desc.default_target_attribute.as_deref(), Some("y"));
    }

    #[test]
    fn missing_target_attribute_is_none() {
        let json = r#"{"data_set_description": {"id": "1", "name": "x", "file_id": "2"}}"#;
        let envelope: DescriptionEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope
            .data_set_description
            .default_target_attribute
            .is_none());
    }

    #[test]
    fn builds_endpoint_urls() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.description_url(45580).unwrap().as_str(),
            "https://www.openml.org/api/v1/json/data/45580"
        );
        assert_eq!(
            catalog.data_url("22102711").unwrap().as_str(),
            "https://www.openml.org/data/v1/get_csv/22102711"
        );
    }
}
