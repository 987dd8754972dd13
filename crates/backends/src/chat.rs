//! OpenAI-kompatible Chat-Completion mit Streaming (SSE)
//!
//! Sendet den Kontext als `messages`-Array mit `stream: true` und liest die
//! Antwort als Server-Sent-Events. Text-Deltas werden sofort weitergereicht,
//! Werkzeugaufrufe ueber mehrere Deltas hinweg gesammelt und erst am Ende
//! des Streams vollstaendig gemeldet.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use parlor_pipeline::{
    ModellAnfrage, ModellEreignis, Nachricht, PipelineError, PipelineResult, Rolle, Sprachmodell,
    Werkzeugaufruf,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

const STREAM_KANAL_KAPAZITAET: usize = 100;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Basis-URL der API (ohne `/chat/completions`)
    pub basis_url: String,
    pub modell: String,
    pub temperatur: f32,
    pub max_tokens: Option<u32>,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            basis_url: "https://api.openai.com/v1".into(),
            modell: "gpt-4o-mini".into(),
            temperatur: 0.7,
            max_tokens: None,
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAiChat
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    config: ChatConfig,
}

impl OpenAiChat {
    pub fn neu(config: ChatConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn anfrage_koerper(&self, anfrage: &ModellAnfrage) -> Value {
        let mut koerper = json!({
            "model": self.config.modell,
            "messages": anfrage.nachrichten.iter().map(nachricht_json).collect::<Vec<_>>(),
            "temperature": self.config.temperatur,
            "stream": true,
        });
        if let Some(max) = self.config.max_tokens {
            koerper["max_tokens"] = json!(max);
        }
        if !anfrage.werkzeuge.is_empty() {
            koerper["tools"] = anfrage
                .werkzeuge
                .iter()
                .map(|w| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": w.name,
                            "description": w.beschreibung,
                            "parameters": w.parameter,
                        }
                    })
                })
                .collect();
        }
        koerper
    }
}

#[async_trait]
impl Sprachmodell for OpenAiChat {
    async fn streamen(
        &self,
        anfrage: ModellAnfrage,
    ) -> PipelineResult<mpsc::Receiver<PipelineResult<ModellEreignis>>> {
        let url = format!("{}/chat/completions", self.config.basis_url.trim_end_matches('/'));
        let mut http = self.client.post(&url).json(&self.anfrage_koerper(&anfrage));
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let antwort = http
            .send()
            .await
            .map_err(|e| PipelineError::Sprachmodell(e.to_string()))?;
        if !antwort.status().is_success() {
            return Err(PipelineError::Sprachmodell(
                crate::fehler_aus_antwort(antwort).await,
            ));
        }
        tracing::debug!(modell = %self.config.modell, "SSE-Stream geoeffnet");

        let (tx, rx) = mpsc::channel(STREAM_KANAL_KAPAZITAET);
        tokio::spawn(async move {
            let mut stream = antwort.bytes_stream();
            let mut zeilen = SseZeilen::default();
            let mut sammler = WerkzeugSammler::default();

            'stream: while let Some(teil) = stream.next().await {
                let teil = match teil {
                    Ok(teil) => teil,
                    Err(e) => {
                        let _ = tx.send(Err(PipelineError::Sprachmodell(e.to_string()))).await;
                        return;
                    }
                };
                for zeile in zeilen.hinzufuegen(&teil) {
                    let ereignisse = match zeile_auswerten(&zeile, &mut sammler) {
                        Ok(Some(ereignisse)) => ereignisse,
                        Ok(None) => break 'stream,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    for ereignis in ereignisse {
                        if tx.send(Ok(ereignis)).await.is_err() {
                            return;
                        }
                    }
                }
            }

            for aufruf in sammler.abschliessen() {
                if tx.send(Ok(ModellEreignis::Werkzeugaufruf(aufruf))).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Nachrichten-Format
// ---------------------------------------------------------------------------

fn nachricht_json(nachricht: &Nachricht) -> Value {
    let mut wert = json!({
        "role": nachricht.rolle,
        "content": nachricht.inhalt,
    });
    if nachricht.rolle == Rolle::Assistent && !nachricht.werkzeugaufrufe.is_empty() {
        wert["tool_calls"] = nachricht
            .werkzeugaufrufe
            .iter()
            .map(|a| {
                json!({
                    "id": a.id,
                    "type": "function",
                    "function": { "name": a.name, "arguments": a.argumente },
                })
            })
            .collect();
    }
    if let Some(id) = &nachricht.werkzeug_id {
        wert["tool_call_id"] = json!(id);
    }
    wert
}

// ---------------------------------------------------------------------------
// SSE-Verarbeitung
// ---------------------------------------------------------------------------

/// Zerlegt den Byte-Strom in Zeilen (UTF-8 sicher ueber Chunk-Grenzen)
#[derive(Debug, Default)]
struct SseZeilen {
    puffer: Vec<u8>,
}

impl SseZeilen {
    fn hinzufuegen(&mut self, daten: &[u8]) -> Vec<String> {
        self.puffer.extend_from_slice(daten);
        let mut zeilen = Vec::new();
        while let Some(pos) = self.puffer.iter().position(|&b| b == b'\n') {
            let zeile: Vec<u8> = self.puffer.drain(..=pos).collect();
            let zeile = String::from_utf8_lossy(&zeile).trim().to_string();
            if !zeile.is_empty() {
                zeilen.push(zeile);
            }
        }
        zeilen
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WerkzeugDelta>,
}

#[derive(Debug, Deserialize)]
struct WerkzeugDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunktionsDelta>,
}

#[derive(Debug, Deserialize)]
struct FunktionsDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Setzt Werkzeugaufrufe aus Deltas zusammen (nach `index`)
#[derive(Debug, Default)]
struct WerkzeugSammler {
    aufrufe: BTreeMap<usize, Werkzeugaufruf>,
}

impl WerkzeugSammler {
    fn delta(&mut self, delta: WerkzeugDelta) {
        let aufruf = self.aufrufe.entry(delta.index).or_insert_with(|| Werkzeugaufruf {
            id: String::new(),
            name: String::new(),
            argumente: String::new(),
        });
        if let Some(id) = delta.id {
            aufruf.id = id;
        }
        if let Some(funktion) = delta.function {
            if let Some(name) = funktion.name {
                aufruf.name.push_str(&name);
            }
            if let Some(argumente) = funktion.arguments {
                aufruf.argumente.push_str(&argumente);
            }
        }
    }

    fn abschliessen(&mut self) -> Vec<Werkzeugaufruf> {
        std::mem::take(&mut self.aufrufe)
            .into_values()
            .filter(|a| !a.name.is_empty())
            .collect()
    }
}

/// Wertet eine SSE-Zeile aus
///
/// `Ok(None)` signalisiert das Stream-Ende (`[DONE]`).
fn zeile_auswerten(
    zeile: &str,
    sammler: &mut WerkzeugSammler,
) -> PipelineResult<Option<Vec<ModellEreignis>>> {
    let Some(daten) = zeile.strip_prefix("data:") else {
        // Kommentare, `event:`-Zeilen usw.
        return Ok(Some(Vec::new()));
    };
    let daten = daten.trim();
    if daten == "[DONE]" {
        return Ok(None);
    }

    let chunk: StreamChunk = match serde_json::from_str(daten) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(fehler = %e, "SSE-Chunk nicht lesbar, uebersprungen");
            return Ok(Some(Vec::new()));
        }
    };
    if let Some(fehler) = chunk.error {
        return Err(PipelineError::Sprachmodell(fehler.to_string()));
    }

    let mut ereignisse = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            ereignisse.push(ModellEreignis::Text(text));
        }
        for delta in choice.delta.tool_calls {
            sammler.delta(delta);
        }
    }
    Ok(Some(ereignisse))
}
