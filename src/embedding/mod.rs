//! Client for the external neural embedding service
//!
//! The service accepts an audio file over multipart HTTP and returns a
//! 2048-dimensional embedding. Requests are synchronous with a hard 30 s
//! timeout; on any failure the caller falls back to hand-crafted feature
//! extraction.

use crate::{Error, Result};
use serde::Deserialize;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

const DEFAULT_SERVICE_URL: &str = "http://localhost:5002";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
    #[serde(default)]
    dimension: usize,
}

/// Blocking HTTP client for the embedding service
pub struct EmbeddingClient {
    service_url: String,
    client: reqwest::blocking::Client,
}

impl EmbeddingClient {
    /// Create a client for the given endpoint (empty selects the default)
    pub fn new(service_url: &str) -> Result<Self> {
        let service_url = if service_url.is_empty() {
            DEFAULT_SERVICE_URL.to_string()
        } else {
            service_url.trim_end_matches('/').to_string()
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            service_url,
            client,
        })
    }

    /// Endpoint this client talks to
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Verify the embedding service is up; `GET /health` must return 200
    pub fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.service_url))
            .send()
            .map_err(|e| Error::Embedding(format!("embedding service not reachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Embedding(format!(
                "embedding service unhealthy: status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    /// Generate an embedding from an audio file on disk
    pub fn embed_file<P: AsRef<Path>>(&self, audio_path: P) -> Result<Vec<f64>> {
        let path = audio_path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::Embedding(format!("failed to open audio file: {}", e)))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        self.embed_bytes(data, &filename)
    }

    /// Generate an embedding from in-memory audio bytes
    pub fn embed_bytes(&self, audio_data: Vec<u8>, filename: &str) -> Result<Vec<f64>> {
        let part = reqwest::blocking::multipart::Part::bytes(audio_data)
            .file_name(filename.to_string());
        let form = reqwest::blocking::multipart::Form::new().part("audio", part);

        let response = self
            .client
            .post(format!("{}/embed", self.service_url))
            .multipart(form)
            .send()
            .map_err(|e| Error::Embedding(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding service returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::Embedding(format!("failed to decode response: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(Error::Embedding("received empty embedding".into()));
        }

        log::debug!(
            "received embedding: {} dims (service reported {})",
            parsed.embedding.len(),
            parsed.dimension
        );

        Ok(parsed.embedding)
    }

    /// Generate an embedding from decoded samples by encoding a WAV in memory
    pub fn embed_samples(&self, samples: &[f64], sample_rate: u32) -> Result<Vec<f64>> {
        let wav = encode_wav(samples, sample_rate)?;
        self.embed_bytes(wav, "capture.wav")
    }
}

fn encode_wav(samples: &[f64], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(format!("failed to create WAV writer: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample as f32)
                .map_err(|e| Error::Audio(format!("failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Audio(format!("failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let client = EmbeddingClient::new("").unwrap();
        assert_eq!(client.service_url(), "http://localhost:5002");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = EmbeddingClient::new("http://embedder:9000/").unwrap();
        assert_eq!(client.service_url(), "http://embedder:9000");
    }

    #[test]
    fn test_encode_wav_header() {
        let samples = vec![0.0f64; 128];
        let wav = encode_wav(&samples, 44100).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_unreachable_service_errors() {
        // Port 9 (discard) is never serving HTTP in test environments
        let client = EmbeddingClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(client.health_check(), Err(Error::Embedding(_))));
    }
}
