//! Azure Cognitive Services speech-to-text client (spec §4.E "Voice
//! path" transcription step). A direct port of
//! `original_source/pkg/azr/speech.go`'s REST contract — region,
//! subscription key, 10s client timeout — onto an async `reqwest`
//! client in the teacher's HTTP-client style (`auth.rs`:
//! `reqwest::Client::builder().timeout(..)`).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

const SPEECH_ENDPOINT_TMPL: &str =
    "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1";

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub region: String,
    pub language: String,
    pub subscription_key: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: std::env::var("AZURE_REGION").unwrap_or_else(|_| "eastus".to_string()),
            language: std::env::var("AZURE_SPEECH_LANG").unwrap_or_else(|_| "ru-RU".to_string()),
            subscription_key: std::env::var("AZURE_SPEECH2TEXT_KEY").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(rename = "RecognitionStatus")]
    recognition_status: String,
    #[serde(rename = "DisplayText", default)]
    display_text: String,
}

pub struct SpeechClient {
    http: reqwest::Client,
    config: SpeechConfig,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    /// Transcribes an Ogg/Opus voice recording. Returns the recognized
    /// text, or an error if Azure reports anything other than
    /// `Success`.
    pub async fn recognize(&self, audio: Vec<u8>) -> Result<String> {
        if self.config.subscription_key.is_empty() {
            bail!("AZURE_SPEECH2TEXT_KEY is not set");
        }

        let url = format!(
            "{}?language={}",
            SPEECH_ENDPOINT_TMPL.replace("{region}", &self.config.region),
            self.config.language
        );

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "audio/ogg; codecs=opus")
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .body(audio)
            .send()
            .await
            .context("speech-to-text request failed")?;

        if !response.status().is_success() {
            bail!("Azure speech-to-text returned {}", response.status());
        }

        let parsed: SpeechResponse = response
            .json()
            .await
            .context("malformed speech-to-text response")?;

        if parsed.recognition_status != "Success" {
            bail!("speech recognition status: {}", parsed.recognition_status);
        }
        Ok(parsed.display_text)
    }
}
