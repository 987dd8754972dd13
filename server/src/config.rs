//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist. Zugangsdaten stehen nie in der Datei; sie nennt nur die
//! Umgebungsvariable, aus der gelesen wird.

use std::time::Duration;

use parlor_backends::{CarrierConfig, ChatConfig, SyntheseConfig, TranskriptionsDienstConfig};
use parlor_observability::{filter_bauen, log_format_gueltig};
use parlor_pipeline::{GeneratorConfig, MultiplexerConfig, TranskriptionsConfig};
use parlor_session::{SessionEinstellungen, STANDARD_BEGRUESSUNG};
use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk und oeffentlicher Hostname
    pub server: ServerEinstellungen,
    /// Gespraechsverhalten (Begruessung, Barge-in, Timeouts)
    pub session: SessionKonfig,
    /// Sprachmodell fuer die Antworten
    pub sprachmodell: SprachmodellEinstellungen,
    /// Text-zu-Sprache
    pub synthese: SyntheseEinstellungen,
    /// Sprache-zu-Text
    pub transkription: TranskriptionsEinstellungen,
    /// Carrier-REST-API fuer ausgehende Anrufe
    pub carrier: CarrierEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Hostname, unter dem der Carrier den Server erreicht (leer = Host-Header)
    pub oeffentlicher_host: String,
    /// Bind-Adresse fuer HTTP und WebSocket
    pub bind_adresse: String,
    pub port: u16,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            oeffentlicher_host: String::new(),
            bind_adresse: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Gespraechsverhalten
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionKonfig {
    /// Begruessung bei Anrufen ohne Startnachricht (`•` markiert Pausen)
    pub begruessung: String,
    /// Mindestlaenge einer Aeusserung, ab der sie die Wiedergabe unterbricht
    pub unterbrechung_min_zeichen: usize,
    /// Wartezeit auf ein fehlendes Audio-Fragment
    pub luecken_timeout_ms: u64,
    /// Zeitfenster fuer die Wiederverbindung zur Transkription
    pub wiederverbindungs_fenster_ms: u64,
    /// Obergrenze des Audio-Puffers fuer die Wiederverbindung
    pub max_replay_bytes: usize,
}

impl Default for SessionKonfig {
    fn default() -> Self {
        Self {
            begruessung: STANDARD_BEGRUESSUNG.into(),
            unterbrechung_min_zeichen: 6,
            luecken_timeout_ms: 2000,
            wiederverbindungs_fenster_ms: 5000,
            max_replay_bytes: 320 * 1024,
        }
    }
}

/// Anweisung an das Modell, falls die Konfiguration keine nennt
pub const STANDARD_SYSTEM_PROMPT: &str = "You are a friendly phone assistant. \
Keep your answers short and conversational, ask one question at a time and never use lists or markdown. \
Insert a '•' symbol every 5 to 10 words at natural pauses so your reply can be spoken in pieces.";

/// Sprachmodell
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SprachmodellEinstellungen {
    #[serde(flatten)]
    pub dienst: ChatConfig,
    /// Umgebungsvariable mit dem API-Key
    pub api_key_env: String,
    pub system_prompt: String,
    /// Maximale Anzahl Nachrichten im Gespraechsverlauf
    pub max_verlauf: usize,
    pub max_werkzeugrunden: usize,
}

impl Default for SprachmodellEinstellungen {
    fn default() -> Self {
        let generator = GeneratorConfig::default();
        Self {
            dienst: ChatConfig::default(),
            api_key_env: "OPENAI_API_KEY".into(),
            system_prompt: STANDARD_SYSTEM_PROMPT.into(),
            max_verlauf: generator.max_verlauf,
            max_werkzeugrunden: generator.max_werkzeugrunden,
        }
    }
}

/// Text-zu-Sprache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheseEinstellungen {
    #[serde(flatten)]
    pub dienst: SyntheseConfig,
    pub api_key_env: String,
}

impl Default for SyntheseEinstellungen {
    fn default() -> Self {
        Self {
            dienst: SyntheseConfig::default(),
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

/// Sprache-zu-Text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranskriptionsEinstellungen {
    #[serde(flatten)]
    pub dienst: TranskriptionsDienstConfig,
    pub api_key_env: String,
}

impl Default for TranskriptionsEinstellungen {
    fn default() -> Self {
        Self {
            dienst: TranskriptionsDienstConfig::default(),
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

/// Carrier-REST-API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierEinstellungen {
    #[serde(flatten)]
    pub dienst: CarrierConfig,
    pub auth_token_env: String,
}

impl Default for CarrierEinstellungen {
    fn default() -> Self {
        Self {
            dienst: CarrierConfig::default(),
            auth_token_env: "TWILIO_AUTH_TOKEN".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Filter-Direktive: ein Level wie "debug" oder z.B. "info,parlor_session=trace"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Haengt `/metrics` und `/health` an den Haupt-Router
    pub aktiviert: bool,
    /// Aktiviert `/sessions` und das manuelle Zuruecksetzen der Transkription
    pub admin_routen: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            admin_routen: true,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if let Err(e) = filter_bauen(&self.logging.level) {
            anyhow::bail!("logging.level '{}': {e}", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        if self.session.unterbrechung_min_zeichen == 0 {
            anyhow::bail!("session.unterbrechung_min_zeichen muss mindestens 1 sein");
        }
        if self.session.luecken_timeout_ms == 0 {
            anyhow::bail!("session.luecken_timeout_ms muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.server.bind_adresse, self.server.port)
    }

    /// Einstellungen, die jede neue Session erhaelt
    pub fn session_einstellungen(&self) -> SessionEinstellungen {
        let transkription = TranskriptionsConfig {
            wiederverbindungs_fenster: Duration::from_millis(self.session.wiederverbindungs_fenster_ms),
            max_replay_bytes: self.session.max_replay_bytes,
            ..TranskriptionsConfig::default()
        };
        SessionEinstellungen {
            begruessung: self.session.begruessung.clone(),
            unterbrechung_min_zeichen: self.session.unterbrechung_min_zeichen,
            generator: GeneratorConfig {
                system_prompt: self.sprachmodell.system_prompt.clone(),
                max_verlauf: self.sprachmodell.max_verlauf,
                max_werkzeugrunden: self.sprachmodell.max_werkzeugrunden,
            },
            multiplexer: MultiplexerConfig {
                luecken_timeout: Duration::from_millis(self.session.luecken_timeout_ms),
            },
            transkription,
        }
    }

    /// Sprachmodell-Konfiguration inklusive API-Key aus der Umgebung
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            api_key: geheimnis_lesen(&self.sprachmodell.api_key_env),
            ..self.sprachmodell.dienst.clone()
        }
    }

    pub fn synthese_config(&self) -> SyntheseConfig {
        SyntheseConfig {
            api_key: geheimnis_lesen(&self.synthese.api_key_env),
            ..self.synthese.dienst.clone()
        }
    }

    pub fn transkriptions_config(&self) -> TranskriptionsDienstConfig {
        TranskriptionsDienstConfig {
            api_key: geheimnis_lesen(&self.transkription.api_key_env),
            ..self.transkription.dienst.clone()
        }
    }

    pub fn carrier_config(&self) -> CarrierConfig {
        CarrierConfig {
            auth_token: geheimnis_lesen(&self.carrier.auth_token_env),
            ..self.carrier.dienst.clone()
        }
    }
}

/// Liest eine Umgebungsvariable; leere Werte zaehlen als nicht gesetzt
pub fn geheimnis_lesen(variable: &str) -> Option<String> {
    std::env::var(variable)
        .ok()
        .map(|wert| wert.trim().to_string())
        .filter(|wert| !wert.is_empty())
}
