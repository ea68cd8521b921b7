//! # Batch Uploader
//!
//! Serializes a batch of samples and POSTs it to the upload endpoint.
//!
//! ## Wire Formats
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fields = [timestamp, latitude], param = "locations",                   │
//! │  extra  = {device: "phone-7"}                                          │
//! │                                                                         │
//! │  JSON (application/json)                                               │
//! │  ─────────────────────────                                             │
//! │  {"device":"phone-7",                                                  │
//! │   "locations":[{"timestamp":100,"latitude":1.5},                       │
//! │                {"timestamp":200,"latitude":2.5}]}                      │
//! │                                                                         │
//! │  FORM_URL_ENCODED (application/x-www-form-urlencoded)                  │
//! │  ─────────────────────────────────────────────────────                 │
//! │  device=phone-7                                                        │
//! │  &locations[0][timestamp]=100&locations[0][latitude]=1.5               │
//! │  &locations[1][timestamp]=200&locations[1][latitude]=2.5               │
//! │  (brackets percent-encoded on the wire)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-sample keys follow the configured field order. Extra parameters come
//! first; if one shares the sample parameter's name the samples win.
//!
//! ## Outcome
//! `Ok(true)` only for a 2xx response. Transport errors, timeouts and any
//! other status are `Ok(false)`. `Err` is reserved for a request that could
//! not be built (unknown field, bad URL), and no network call is made then.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use geotrail_core::{RequestFormat, Sample, UploadField};

use crate::config::CaptureConfig;
use crate::error::{SyncError, SyncResult};

/// TCP connect timeout, separate from the per-request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Upload Request
// =============================================================================

/// Everything about one upload except the samples.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub endpoint: String,
    pub format: RequestFormat,
    pub locations_param: String,
    pub extra_params: BTreeMap<String, String>,
    /// Field names, parsed when the body is built.
    pub fields: Vec<String>,
    pub timeout: Duration,
}

impl UploadRequest {
    /// Builds a request from a configuration snapshot.
    pub fn from_config(config: &CaptureConfig) -> SyncResult<Self> {
        let endpoint = config
            .upload_url
            .clone()
            .ok_or_else(|| SyncError::InvalidUrl("upload_url is not configured".into()))?;

        Ok(UploadRequest {
            endpoint,
            format: config.upload_request_format,
            locations_param: config.upload_locations_param.clone(),
            extra_params: config.upload_extra_params.clone(),
            fields: config.upload_fields.clone(),
            timeout: config.upload_timeout(),
        })
    }
}

// =============================================================================
// Body Encoding
// =============================================================================

/// Encodes a batch as a JSON document.
pub fn encode_json(
    samples: &[Sample],
    locations_param: &str,
    extra_params: &BTreeMap<String, String>,
    fields: &[UploadField],
) -> SyncResult<String> {
    let mut body: Map<String, Value> = extra_params
        .iter()
        .filter(|(key, _)| key.as_str() != locations_param)
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    let records: Vec<Value> = samples
        .iter()
        .map(|sample| {
            let record: Map<String, Value> = fields
                .iter()
                .map(|&field| (field.as_str().to_string(), sample.json_value(field)))
                .collect();
            Value::Object(record)
        })
        .collect();

    body.insert(locations_param.to_string(), Value::Array(records));

    serde_json::to_string(&Value::Object(body)).map_err(|e| SyncError::Internal(e.to_string()))
}

/// Encodes a batch as `application/x-www-form-urlencoded`.
pub fn encode_form(
    samples: &[Sample],
    locations_param: &str,
    extra_params: &BTreeMap<String, String>,
    fields: &[UploadField],
) -> String {
    let mut form = form_urlencoded::Serializer::new(String::new());

    for (key, value) in extra_params {
        if key != locations_param {
            form.append_pair(key, value);
        }
    }

    for (index, sample) in samples.iter().enumerate() {
        for &field in fields {
            let key = format!("{locations_param}[{index}][{field}]");
            form.append_pair(&key, &sample.form_value(field));
        }
    }

    form.finish()
}

// =============================================================================
// Uploader
// =============================================================================

/// Sends batches to the configured endpoint.
///
/// Holds a pooled HTTP client; clone freely.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: reqwest::Client,
}

impl Uploader {
    /// Creates an uploader with its own HTTP client.
    pub fn new() -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {e}")))?;

        Ok(Uploader { client })
    }

    /// Delivers `samples` in one POST.
    ///
    /// ## Returns
    /// - `Ok(true)`: the endpoint answered 2xx
    /// - `Ok(false)`: delivery failed; the caller keeps the batch
    /// - `Err(_)`: the request is misconfigured; nothing was sent
    pub async fn upload(&self, samples: &[Sample], request: &UploadRequest) -> SyncResult<bool> {
        let fields = geotrail_core::validation::parse_upload_fields(&request.fields)?;
        geotrail_core::validation::validate_locations_param(&request.locations_param)?;

        let url = url::Url::parse(&request.endpoint)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Upload URL must use http:// or https://, got: {}",
                request.endpoint
            )));
        }

        let body = match request.format {
            RequestFormat::Json => encode_json(
                samples,
                &request.locations_param,
                &request.extra_params,
                &fields,
            )?,
            RequestFormat::FormUrlEncoded => encode_form(
                samples,
                &request.locations_param,
                &request.extra_params,
                &fields,
            ),
        };

        debug!(
            count = samples.len(),
            bytes = body.len(),
            format = %request.format,
            "Uploading batch"
        );

        let result = self
            .client
            .post(url)
            .timeout(request.timeout)
            .header(reqwest::header::CONTENT_TYPE, request.format.content_type())
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(
                    count = samples.len(),
                    status = response.status().as_u16(),
                    "Batch delivered"
                );
                Ok(true)
            }
            Ok(response) => {
                warn!(
                    count = samples.len(),
                    status = response.status().as_u16(),
                    "Upload rejected by server"
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    count = samples.len(),
                    timeout = e.is_timeout(),
                    error = %e,
                    "Upload failed"
                );
                Ok(false)
            }
        }
    }
}
