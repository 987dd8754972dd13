//! Carrier-REST-Anbindung fuer ausgehende Anrufe
//!
//! Form-kodierter POST auf `{api_basis}/Accounts/{sid}/Calls.json` mit
//! Basic-Auth. Der Carrier holt sich danach das Anweisungsdokument von der
//! uebergebenen URL.

use async_trait::async_trait;
use parlor_core::{AnrufInitiator, CallSid, ParlorError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    pub api_basis: String,
    pub account_sid: String,
    /// Absender-Rufnummer fuer ausgehende Anrufe
    pub von_nummer: String,
    #[serde(skip)]
    pub auth_token: Option<String>,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            api_basis: "https://api.twilio.com/2010-04-01".into(),
            account_sid: String::new(),
            von_nummer: String::new(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnrufAntwort {
    sid: String,
}

#[derive(Clone)]
pub struct RestAnrufInitiator {
    client: reqwest::Client,
    config: CarrierConfig,
}

impl RestAnrufInitiator {
    pub fn neu(config: CarrierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.api_basis.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl AnrufInitiator for RestAnrufInitiator {
    async fn anruf_starten(&self, ziel: &str, anweisungs_url: &str) -> parlor_core::Result<CallSid> {
        if self.config.account_sid.is_empty() || self.config.von_nummer.is_empty() {
            return Err(ParlorError::Konfiguration(
                "Carrier: account_sid und von_nummer muessen gesetzt sein".into(),
            ));
        }

        let formular = [
            ("To", ziel),
            ("From", self.config.von_nummer.as_str()),
            ("Url", anweisungs_url),
        ];
        let antwort = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, self.config.auth_token.as_deref())
            .form(&formular)
            .send()
            .await
            .map_err(|e| ParlorError::dienst("carrier", e.to_string()))?;
        if !antwort.status().is_success() {
            return Err(ParlorError::dienst(
                "carrier",
                crate::fehler_aus_antwort(antwort).await,
            ));
        }
        let anruf: AnrufAntwort = antwort
            .json()
            .await
            .map_err(|e| ParlorError::dienst("carrier", e.to_string()))?;
        tracing::info!(call_sid = %anruf.sid, ziel, "Ausgehender Anruf gestartet");
        Ok(CallSid(anruf.sid))
    }
}
