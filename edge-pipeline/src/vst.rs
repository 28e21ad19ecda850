use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::types::{PipelineError, Result};

const NAME_TAKEN: &str = "User given name is invalid or already exists";

/// RTSP stream advertised by the camera-management service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtspStream {
    pub stream_id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SensorInfo {
    #[serde(default)]
    name: String,
    #[serde(rename = "sensorId")]
    sensor_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Substream {
    #[serde(rename = "isMain", default)]
    is_main: bool,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddSensorRequest<'a> {
    sensor_url: &'a str,
    name: &'a str,
    username: &'a str,
    password: &'a str,
    location: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_message: String,
}

/// Client for the camera-management REST API (sensor and stream listing).
pub struct VstClient {
    client: Client,
    base_url: Url,
}

impl VstClient {
    /// `base_url` like `http://0.0.0.0:81`; a trailing slash is added if missing.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        Ok(Self {
            client,
            base_url: Url::parse(&normalized)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Register an RTSP sensor. Returns the HTTP status the service answered with.
    pub async fn add_rtsp_stream(&self, url: &str, name: &str, location: &str) -> Result<StatusCode> {
        let response = self.add_sensor(url, name, location).await?;
        Ok(response.status())
    }

    async fn add_sensor(&self, url: &str, name: &str, location: &str) -> Result<Response> {
        let body = AddSensorRequest {
            sensor_url: url,
            name,
            username: "",
            password: "",
            location,
        };
        let response = self
            .client
            .post(self.endpoint("api/v1/sensor/add")?)
            .json(&body)
            .send()
            .await?;
        debug!(name = %name, status = %response.status(), "Add sensor request finished");
        Ok(response)
    }

    pub async fn remove_rtsp_stream(&self, sensor_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("api/v1/sensor/{}", sensor_id))?)
            .send()
            .await?;
        if !response.status().is_success() {
            warn!(sensor_id = %sensor_id, "Removing sensor returned HTTP {}", response.status());
        }
        Ok(())
    }

    /// Sensor id of the first sensor called `name`.
    pub async fn sensor_id(&self, name: &str) -> Result<Option<String>> {
        let sensors: Vec<SensorInfo> = self
            .client
            .get(self.endpoint("api/v1/sensor/list")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(sensors
            .into_iter()
            .find(|sensor| sensor.name == name)
            .map(|sensor| sensor.sensor_id))
    }

    /// Add a stream, replacing an existing sensor of the same name.
    pub async fn readd_rtsp_stream(&self, url: &str, name: &str, location: &str) -> Result<StatusCode> {
        let response = self.add_sensor(url, name, location).await?;
        if response.status() != StatusCode::BAD_REQUEST {
            return Ok(response.status());
        }

        let status = response.status();
        let body: ErrorBody = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(name = %name, "Add sensor rejected with unreadable body: {}", e);
                return Ok(status);
            }
        };
        if body.error_message != NAME_TAKEN {
            return Ok(status);
        }

        match self.sensor_id(name).await? {
            Some(sensor_id) => {
                info!(name = %name, sensor_id = %sensor_id, "Replacing existing sensor");
                self.remove_rtsp_stream(&sensor_id).await?;
                self.add_rtsp_stream(url, name, location).await
            }
            None => Ok(status),
        }
    }

    /// Main substreams with a playable URL.
    pub async fn rtsp_streams(&self) -> Result<Vec<RtspStream>> {
        let response = self
            .client
            .get(self.endpoint("api/v1/live/streams")?)
            .send()
            .await?
            .error_for_status()?;
        let streams: Vec<HashMap<String, Vec<Substream>>> = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedResponse(format!("stream list: {}", e)))?;

        let mut rtsp_streams = Vec::new();
        for stream in streams {
            for (stream_id, substreams) in stream {
                for substream in substreams {
                    if substream.is_main && !substream.url.is_empty() {
                        rtsp_streams.push(RtspStream {
                            stream_id: stream_id.clone(),
                            name: substream.name,
                            url: substream.url,
                        });
                    }
                }
            }
        }
        Ok(rtsp_streams)
    }
}
