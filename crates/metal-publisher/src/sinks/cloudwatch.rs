//! Amazon CloudWatch sink.
//!
//! Metrics are submitted through the CloudWatch Query API
//! (`Action=PutMetricData`) signed with AWS Signature V4. The API accepts at
//! most [`MAX_DATUMS_PER_CALL`] datums per request, so a batch is split into
//! chunks that are submitted one after another.

use crate::error::{PublishError, Result};
use crate::sigv4::{self, Credentials, SigningRequest};
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::Publisher;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use metal_common::types::{Metric, Metrics};
use reqwest::{Client, Url};
use serde::Deserialize;

pub const MAX_DATUMS_PER_CALL: usize = 20;
pub const DEFAULT_NAMESPACE: &str = "METAL";
pub const DEFAULT_REGION: &str = "ap-northeast-1";

const SERVICE: &str = "monitoring";
const API_VERSION: &str = "2010-08-01";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Clone, Deserialize)]
pub struct CloudWatchSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Overrides `https://monitoring.<region>.amazonaws.com/`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for CloudWatchSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            region: default_region(),
            namespace: default_namespace(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
        }
    }
}

impl CloudWatchSettings {
    /// Keys from the settings when both are present, otherwise the standard
    /// `AWS_*` environment variables.
    pub fn credentials(&self) -> Result<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                session_token: self.session_token.clone(),
            }),
            (Some(_), None) | (None, Some(_)) => Err(PublishError::InvalidConfig(
                "access_key_id and secret_access_key must be set together".to_string(),
            )),
            (None, None) => Credentials::from_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// One metric sample as submitted to CloudWatch.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDatum {
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub storage_resolution: u32,
    pub dimensions: Vec<Dimension>,
}

impl From<&Metric> for MetricDatum {
    fn from(metric: &Metric) -> Self {
        Self {
            metric_name: metric.name.clone(),
            timestamp: metric.timestamp,
            value: metric.value,
            storage_resolution: 1,
            dimensions: metric
                .sorted_tags()
                .into_iter()
                .map(|(name, value)| Dimension {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }
}

/// Splits `datums` into consecutive groups of at most [`MAX_DATUMS_PER_CALL`].
pub fn chunk_datums(datums: &[MetricDatum]) -> std::slice::Chunks<'_, MetricDatum> {
    datums.chunks(MAX_DATUMS_PER_CALL)
}

/// Transport for a single `PutMetricData` call.
#[async_trait]
pub trait MetricDataClient: Send + Sync {
    async fn put_metric_data(&self, namespace: &str, datums: &[MetricDatum]) -> Result<()>;
}

pub struct CloudWatchPublisher<C = CloudWatchClient> {
    client: C,
    namespace: String,
}

impl<C: MetricDataClient> CloudWatchPublisher<C> {
    pub fn new(client: C, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl CloudWatchPublisher<CloudWatchClient> {
    pub fn from_settings(settings: &CloudWatchSettings) -> Result<Self> {
        let client = CloudWatchClient::from_settings(settings)?;
        Ok(Self::new(client, settings.namespace.clone()))
    }
}

#[async_trait]
impl<C: MetricDataClient> Publisher for CloudWatchPublisher<C> {
    async fn publish(&self, metrics: &Metrics) -> anyhow::Result<()> {
        let datums: Vec<MetricDatum> = metrics.iter().map(MetricDatum::from).collect();
        let mut submitted = 0usize;
        let mut failed_chunks = 0usize;

        for (index, chunk) in chunk_datums(&datums).enumerate() {
            match self.client.put_metric_data(&self.namespace, chunk).await {
                Ok(()) => submitted += chunk.len(),
                Err(e) => {
                    failed_chunks += 1;
                    tracing::error!(
                        namespace = %self.namespace,
                        chunk = index,
                        datums = chunk.len(),
                        error = %e,
                        "PutMetricData failed, dropping chunk"
                    );
                }
            }
        }

        if failed_chunks > 0 {
            tracing::warn!(submitted, failed_chunks, "CloudWatch batch partially submitted");
        } else {
            tracing::debug!(submitted, "CloudWatch batch submitted");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cloudwatch"
    }
}

/// CloudWatch Query API client.
pub struct CloudWatchClient {
    client: Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: Credentials,
}

impl CloudWatchClient {
    pub fn new(region: &str, endpoint: Option<&str>, credentials: Credentials) -> Result<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => format!("https://{SERVICE}.{region}.amazonaws.com/"),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| PublishError::InvalidConfig(format!("endpoint {endpoint}: {e}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(PublishError::InvalidConfig(format!(
                    "endpoint {endpoint} has no host"
                )))
            }
        };

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            host,
            region: region.to_string(),
            credentials,
        })
    }

    pub fn from_settings(settings: &CloudWatchSettings) -> Result<Self> {
        Self::new(
            &settings.region,
            settings.endpoint.as_deref(),
            settings.credentials()?,
        )
    }
}

#[async_trait]
impl MetricDataClient for CloudWatchClient {
    async fn put_metric_data(&self, namespace: &str, datums: &[MetricDatum]) -> Result<()> {
        let body = encode_put_metric_data(namespace, datums);
        let now = Utc::now();
        let amz_date = sigv4::amz_date(now);

        let mut headers = vec![
            ("Content-Type", CONTENT_TYPE),
            ("Host", self.host.as_str()),
            ("X-Amz-Date", amz_date.as_str()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("X-Amz-Security-Token", token.as_str()));
        }

        let authorization = sigv4::authorization(
            &self.credentials,
            &self.region,
            SERVICE,
            now,
            &SigningRequest {
                method: "POST",
                path: self.endpoint.path(),
                query: "",
                headers: &headers,
                payload: body.as_bytes(),
            },
        )?;

        let mut request = self.client.post(self.endpoint.clone());
        for (name, value) in &headers {
            request = request.header(*name, *value);
        }
        let response = request
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                Err(e) => format!("[Failed to read response body: {}]", e),
            };
            return Err(PublishError::Api {
                service: "cloudwatch".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(namespace, datums = datums.len(), "PutMetricData accepted");
        Ok(())
    }
}

/// Form-encoded `PutMetricData` request body.
pub fn encode_put_metric_data(namespace: &str, datums: &[MetricDatum]) -> String {
    let mut params: Vec<(String, String)> = vec![
        ("Action".to_string(), "PutMetricData".to_string()),
        ("Version".to_string(), API_VERSION.to_string()),
        ("Namespace".to_string(), namespace.to_string()),
    ];

    for (i, datum) in datums.iter().enumerate() {
        let prefix = format!("MetricData.member.{}", i + 1);
        params.push((format!("{prefix}.MetricName"), datum.metric_name.clone()));
        params.push((
            format!("{prefix}.Timestamp"),
            datum.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        params.push((format!("{prefix}.Value"), datum.value.to_string()));
        params.push((
            format!("{prefix}.StorageResolution"),
            datum.storage_resolution.to_string(),
        ));
        for (j, dimension) in datum.dimensions.iter().enumerate() {
            let dim = format!("{prefix}.Dimensions.member.{}", j + 1);
            params.push((format!("{dim}.Name"), dimension.name.clone()));
            params.push((format!("{dim}.Value"), dimension.value.clone()));
        }
    }

    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn datum(name: &str) -> MetricDatum {
        MetricDatum::from(&Metric::new(name, Utc::now(), 1.0))
    }

    #[test]
    fn datum_carries_tags_as_dimensions() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        let metric = Metric::new("DiskWriteBytes", ts, 512.0).with_tag("device", "nvme0n1");

        let datum = MetricDatum::from(&metric);

        assert_eq!(datum.metric_name, "DiskWriteBytes");
        assert_eq!(datum.timestamp, ts);
        assert_eq!(datum.value, 512.0);
        assert_eq!(datum.storage_resolution, 1);
        assert_eq!(
            datum.dimensions,
            vec![Dimension {
                name: "device".to_string(),
                value: "nvme0n1".to_string(),
            }]
        );
    }

    #[test]
    fn chunks_never_exceed_call_limit() {
        let datums: Vec<MetricDatum> = (0..41).map(|i| datum(&format!("M{i}"))).collect();
        let sizes: Vec<usize> = chunk_datums(&datums).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![20, 20, 1]);
        assert_eq!(chunk_datums(&[]).count(), 0);
    }

    #[test]
    fn encodes_query_api_body() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        let datums = vec![
            MetricDatum::from(&Metric::new("CPUIdle", ts, 97.5)),
            MetricDatum::from(&Metric::new("DiskReadCount", ts, 3.0).with_tag("device", "sda")),
        ];

        let body = encode_put_metric_data("METAL", &datums);

        assert!(body.starts_with("Action=PutMetricData&Version=2010-08-01&Namespace=METAL&"));
        assert!(body.contains("MetricData.member.1.MetricName=CPUIdle"));
        assert!(body.contains("MetricData.member.1.Timestamp=2024-03-04T05%3A06%3A07.000Z"));
        assert!(body.contains("MetricData.member.1.Value=97.5"));
        assert!(body.contains("MetricData.member.1.StorageResolution=1"));
        assert!(!body.contains("MetricData.member.1.Dimensions"));
        assert!(body.contains("MetricData.member.2.Dimensions.member.1.Name=device"));
        assert!(body.contains("MetricData.member.2.Dimensions.member.1.Value=sda"));
    }

    #[test]
    fn default_endpoint_follows_region() {
        let credentials = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        let client = CloudWatchClient::new("eu-west-1", None, credentials.clone()).unwrap();
        assert_eq!(client.host, "monitoring.eu-west-1.amazonaws.com");

        let local = CloudWatchClient::new("eu-west-1", Some("http://127.0.0.1:4566/"), credentials)
            .unwrap();
        assert_eq!(local.host, "127.0.0.1:4566");
    }

    #[test]
    fn half_configured_keys_are_rejected() {
        let settings = CloudWatchSettings {
            access_key_id: Some("AKID".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.credentials(),
            Err(PublishError::InvalidConfig(_))
        ));
    }
}
