//! HTTP-Sprachsynthese
//!
//! JSON-POST `{model, input, voice, response_format}`, Antwort ist rohes
//! Audio. Liefert der Dienst 16-Bit PCM, wird es fuer den Carrier in 8kHz
//! µ-law umgewandelt; andere Formate gehen unveraendert durch.

use async_trait::async_trait;
use bytes::Bytes;
use parlor_pipeline::{PipelineError, PipelineResult, Sprachsynthese};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::mulaw;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheseConfig {
    pub url: String,
    pub modell: String,
    pub stimme: String,
    /// `pcm` wird nach µ-law umgewandelt, alles andere durchgereicht
    pub antwort_format: String,
    /// Abtastrate der PCM-Antwort
    pub quell_rate: u32,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SyntheseConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/audio/speech".into(),
            modell: "tts-1".into(),
            stimme: "alloy".into(),
            antwort_format: "pcm".into(),
            quell_rate: 24_000,
            api_key: None,
        }
    }
}

#[derive(Clone)]
pub struct HttpSynthese {
    client: reqwest::Client,
    config: SyntheseConfig,
}

impl HttpSynthese {
    pub fn neu(config: SyntheseConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn fuer_carrier(&self, audio: Bytes) -> Bytes {
        if self.config.antwort_format == "pcm" {
            Bytes::from(mulaw::pcm_zu_mulaw(&audio, self.config.quell_rate))
        } else {
            audio
        }
    }
}

#[async_trait]
impl Sprachsynthese for HttpSynthese {
    async fn synthetisieren(&self, text: &str) -> PipelineResult<Bytes> {
        let koerper = json!({
            "model": self.config.modell,
            "input": text,
            "voice": self.config.stimme,
            "response_format": self.config.antwort_format,
        });
        let mut anfrage = self.client.post(&self.config.url).json(&koerper);
        if let Some(key) = &self.config.api_key {
            anfrage = anfrage.bearer_auth(key);
        }

        let antwort = anfrage
            .send()
            .await
            .map_err(|e| PipelineError::Synthese(e.to_string()))?;
        if !antwort.status().is_success() {
            return Err(PipelineError::Synthese(crate::fehler_aus_antwort(antwort).await));
        }
        let audio = antwort
            .bytes()
            .await
            .map_err(|e| PipelineError::Synthese(e.to_string()))?;
        Ok(self.fuer_carrier(audio))
    }
}
