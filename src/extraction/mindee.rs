//! Mindee extractor — custom document endpoints via the async queue API.
//!
//! A document is enqueued with `predict_async`, then the job is polled until
//! it completes or the poll budget runs out.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::ExtractionError;

use super::{DocumentExtractor, IdCardFields, VehicleBackFields, VehicleFrontFields};

const BASE_URL: &str = "https://api.mindee.net/v1/products";

/// Mindee connection settings.
#[derive(Debug, Clone)]
pub struct MindeeConfig {
    /// `None` makes every extraction report "no data".
    pub api_key: Option<SecretString>,
    /// Account that owns the custom endpoints.
    pub account: String,
    pub id_card_endpoint: String,
    pub vehicle_front_endpoint: String,
    pub vehicle_back_endpoint: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for MindeeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            account: "insurance-intake".to_string(),
            id_card_endpoint: "id_card".to_string(),
            vehicle_front_endpoint: "vehicle_registration_certificate__front_side".to_string(),
            vehicle_back_endpoint: "vehicle_registration_certificate__back_side".to_string(),
            poll_interval: Duration::from_secs(2),
            max_polls: 30,
        }
    }
}

/// Prediction fields keyed by name, values flattened to strings.
type Fields = HashMap<String, String>;

/// Where a queued job stands.
#[derive(Debug, PartialEq)]
enum JobStatus {
    Pending,
    Completed(Fields),
    Failed,
}

/// Extractor backed by Mindee custom endpoints.
pub struct MindeeExtractor {
    config: MindeeConfig,
    base_url: String,
    client: reqwest::Client,
}

impl MindeeExtractor {
    pub fn new(config: MindeeConfig) -> Self {
        Self {
            config,
            base_url: BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the extractor at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}/v1", self.base_url, self.config.account, endpoint)
    }

    /// Fields for one image, or `None` with the reason logged.
    async fn fields(&self, endpoint: &str, image: &Path) -> Option<Fields> {
        match self.parse_document(endpoint, image).await {
            Ok(fields) => {
                debug!(endpoint, count = fields.len(), "Document parsed");
                Some(fields)
            }
            Err(ExtractionError::MissingApiKey) => {
                error!("Mindee API key is missing");
                None
            }
            Err(e) => {
                warn!(endpoint, file = %image.display(), "Document extraction failed: {}", e);
                None
            }
        }
    }

    async fn parse_document(&self, endpoint: &str, image: &Path) -> Result<Fields, ExtractionError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(ExtractionError::MissingApiKey)?;

        if !tokio::fs::try_exists(image).await.unwrap_or(false) {
            return Err(ExtractionError::FileNotFound(image.display().to_string()));
        }

        let job_id = self.enqueue(endpoint, image, api_key).await?;

        for attempt in 1..=self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;
            match self.poll(endpoint, &job_id, api_key).await? {
                JobStatus::Completed(fields) => return Ok(fields),
                JobStatus::Failed => {
                    return Err(ExtractionError::JobFailed {
                        endpoint: endpoint.to_string(),
                        job_id,
                    });
                }
                JobStatus::Pending => debug!(endpoint, %job_id, attempt, "Job still pending"),
            }
        }

        Err(ExtractionError::PollExhausted {
            endpoint: endpoint.to_string(),
            job_id,
            attempts: self.config.max_polls,
        })
    }

    async fn enqueue(
        &self,
        endpoint: &str,
        image: &Path,
        api_key: &SecretString,
    ) -> Result<String, ExtractionError> {
        let file_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.jpg")
            .to_string();
        let bytes = tokio::fs::read(image).await?;
        let form = Form::new().part("document", Part::bytes(bytes).file_name(file_name));

        let resp = self
            .client
            .post(format!("{}/predict_async", self.endpoint_url(endpoint)))
            .header("Authorization", format!("Token {}", api_key.expose_secret()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_failed(endpoint, e))?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| request_failed(endpoint, e))?;
        if !status.is_success() {
            return Err(ExtractionError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: format!("predict_async returned {status}: {data}"),
            });
        }

        data.pointer("/job/id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ExtractionError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: "missing job id".into(),
            })
    }

    async fn poll(
        &self,
        endpoint: &str,
        job_id: &str,
        api_key: &SecretString,
    ) -> Result<JobStatus, ExtractionError> {
        // Completed jobs redirect to the document; reqwest follows it.
        let resp = self
            .client
            .get(format!(
                "{}/documents/queue/{job_id}",
                self.endpoint_url(endpoint)
            ))
            .header("Authorization", format!("Token {}", api_key.expose_secret()))
            .send()
            .await
            .map_err(|e| request_failed(endpoint, e))?;

        let data: Value = resp.json().await.map_err(|e| request_failed(endpoint, e))?;
        Ok(job_status(&data))
    }
}

fn request_failed(endpoint: &str, e: reqwest::Error) -> ExtractionError {
    ExtractionError::RequestFailed {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
}

/// Read a queue or document response.
fn job_status(data: &Value) -> JobStatus {
    if let Some(prediction) = data
        .pointer("/document/inference/prediction")
        .and_then(Value::as_object)
    {
        let fields = prediction
            .iter()
            .map(|(name, field)| (name.clone(), field_text(field)))
            .collect();
        return JobStatus::Completed(fields);
    }

    match data.pointer("/job/status").and_then(Value::as_str) {
        Some("failed") => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

/// Flatten a generated field to text. List fields join their values.
fn field_text(field: &Value) -> String {
    match field {
        Value::Array(items) => items
            .iter()
            .map(field_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(obj) => match obj.get("value") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    }
}

fn get(fields: &Fields, key: &str) -> String {
    fields.get(key).cloned().unwrap_or_default()
}

fn id_card_from(fields: &Fields) -> IdCardFields {
    let full_name = [get(fields, "full_name"), get(fields, "patronymic")]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    IdCardFields {
        full_name,
        date_of_birth: get(fields, "date_of_birth"),
        document_number: get(fields, "document_no"),
    }
}

fn vehicle_front_from(fields: &Fields) -> VehicleFrontFields {
    VehicleFrontFields {
        plate_number: get(fields, "vehicle_registration_number"),
    }
}

fn vehicle_back_from(fields: &Fields) -> VehicleBackFields {
    VehicleBackFields {
        brand: get(fields, "brand"),
        model: get(fields, "model"),
        vin: get(fields, "vin"),
    }
}

#[async_trait]
impl DocumentExtractor for MindeeExtractor {
    async fn id_card(&self, image: &Path) -> Option<IdCardFields> {
        let fields = self.fields(&self.config.id_card_endpoint, image).await?;
        Some(id_card_from(&fields))
    }

    async fn vehicle_front(&self, image: &Path) -> Option<VehicleFrontFields> {
        let fields = self
            .fields(&self.config.vehicle_front_endpoint, image)
            .await?;
        Some(vehicle_front_from(&fields))
    }

    async fn vehicle_back(&self, image: &Path) -> Option<VehicleBackFields> {
        let fields = self
            .fields(&self.config.vehicle_back_endpoint, image)
            .await?;
        Some(vehicle_back_from(&fields))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn endpoint_url_layout() {
        let extractor = MindeeExtractor::new(MindeeConfig {
            account: "acme".into(),
            ..MindeeConfig::default()
        });
        assert_eq!(
            extractor.endpoint_url("id_card"),
            "https://api.mindee.net/v1/products/acme/id_card/v1"
        );
    }

    #[test]
    fn queue_statuses() {
        assert_eq!(
            job_status(&json!({"job": {"id": "j1", "status": "waiting"}})),
            JobStatus::Pending
        );
        assert_eq!(
            job_status(&json!({"job": {"id": "j1", "status": "processing"}})),
            JobStatus::Pending
        );
        assert_eq!(
            job_status(&json!({"job": {"id": "j1", "status": "failed"}})),
            JobStatus::Failed
        );
    }

    #[test]
    fn completed_document_yields_fields() {
        let data = json!({
            "job": {"status": "completed"},
            "document": {"inference": {"prediction": {
                "full_name": {"value": "Ivan Petrenko "},
                "patronymic": {"value": "Olehovych"},
                "date_of_birth": {"value": "1990-04-12"},
                "document_no": {"value": "AB123456"},
                "notes": [{"value": "a"}, {"value": null}, {"value": "b"}]
            }}}
        });
        let JobStatus::Completed(fields) = job_status(&data) else {
            panic!("expected completed job");
        };
        assert_eq!(fields["notes"], "a b");

        let id = id_card_from(&fields);
        assert_eq!(id.full_name, "Ivan Petrenko Olehovych");
        assert_eq!(id.date_of_birth, "1990-04-12");
        assert_eq!(id.document_number, "AB123456");
    }

    #[test]
    fn missing_fields_are_empty() {
        let fields = Fields::new();
        assert_eq!(vehicle_front_from(&fields), VehicleFrontFields::default());
        assert_eq!(id_card_from(&fields).full_name, "");
    }

    #[test]
    fn vehicle_back_mapping() {
        let mut fields = Fields::new();
        fields.insert("brand".into(), "Skoda".into());
        fields.insert("model".into(), "Octavia".into());
        fields.insert("vin".into(), "TMB123".into());
        assert_eq!(
            vehicle_back_from(&fields),
            VehicleBackFields {
                brand: "Skoda".into(),
                model: "Octavia".into(),
                vin: "TMB123".into(),
            }
        );
    }

    #[tokio::test]
    async fn missing_api_key_is_no_data() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let extractor = MindeeExtractor::new(MindeeConfig::default());
        assert!(extractor.id_card(file.path()).await.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_no_data() {
        let extractor = MindeeExtractor::new(MindeeConfig {
            api_key: Some(SecretString::from("key")),
            ..MindeeConfig::default()
        });
        assert!(
            extractor
                .vehicle_front(Path::new("/nonexistent/front.jpg"))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_no_data() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"jpeg").unwrap();
        let extractor = MindeeExtractor::new(MindeeConfig {
            api_key: Some(SecretString::from("key")),
            ..MindeeConfig::default()
        })
        .with_base_url("http://127.0.0.1:9");
        assert!(extractor.vehicle_back(file.path()).await.is_none());
    }
}
