//! Werkzeuge, die das Sprachmodell waehrend einer Antwort aufrufen kann
//!
//! Werkzeugaufrufe erzeugen nie selbst Fragmente. Ihr Ergebnis geht als
//! Text zurueck an das Modell, das danach weiter antwortet.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;

/// Beschreibung eines Werkzeugs fuer das Modell (JSON-Schema der Parameter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WerkzeugBeschreibung {
    pub name: String,
    pub beschreibung: String,
    pub parameter: serde_json::Value,
}

/// Vom Modell angeforderter Aufruf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Werkzeugaufruf {
    pub id: String,
    pub name: String,
    /// Argumente als rohes JSON, so wie das Modell sie geliefert hat
    pub argumente: String,
}

#[async_trait]
pub trait Werkzeug: Send + Sync {
    fn beschreibung(&self) -> WerkzeugBeschreibung;

    async fn ausfuehren(&self, argumente: serde_json::Value) -> PipelineResult<String>;
}

/// Registry aller verfuegbaren Werkzeuge
#[derive(Clone, Default)]
pub struct Werkzeugkasten {
    werkzeuge: HashMap<String, Arc<dyn Werkzeug>>,
}

impl Werkzeugkasten {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert ein Werkzeug unter seinem Namen (ersetzt ein vorhandenes)
    pub fn registrieren(mut self, werkzeug: impl Werkzeug + 'static) -> Self {
        let name = werkzeug.beschreibung().name;
        tracing::debug!(werkzeug = %name, "Werkzeug registriert");
        self.werkzeuge.insert(name, Arc::new(werkzeug));
        self
    }

    pub fn ist_leer(&self) -> bool {
        self.werkzeuge.is_empty()
    }

    /// Beschreibungen aller Werkzeuge, sortiert nach Name
    pub fn beschreibungen(&self) -> Vec<WerkzeugBeschreibung> {
        let mut liste: Vec<_> = self.werkzeuge.values().map(|w| w.beschreibung()).collect();
        liste.sort_by(|a, b| a.name.cmp(&b.name));
        liste
    }

    /// Fuehrt einen Aufruf aus
    ///
    /// Schlaegt nie fehl: Fehler werden als Text an das Modell zurueckgegeben.
    pub async fn aufrufen(&self, aufruf: &Werkzeugaufruf) -> String {
        let Some(werkzeug) = self.werkzeuge.get(&aufruf.name) else {
            tracing::warn!(werkzeug = %aufruf.name, "Unbekanntes Werkzeug angefordert");
            return fehlertext(format!("Unbekanntes Werkzeug: {}", aufruf.name));
        };

        let argumente = if aufruf.argumente.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&aufruf.argumente) {
                Ok(wert) => wert,
                Err(e) => return fehlertext(format!("Ungueltige Argumente: {e}")),
            }
        };

        match werkzeug.ausfuehren(argumente).await {
            Ok(ergebnis) => {
                tracing::debug!(werkzeug = %aufruf.name, "Werkzeug ausgefuehrt");
                ergebnis
            }
            Err(e) => {
                tracing::warn!(werkzeug = %aufruf.name, fehler = %e, "Werkzeug fehlgeschlagen");
                fehlertext(e.to_string())
            }
        }
    }
}

fn fehlertext(nachricht: String) -> String {
    serde_json::json!({ "error": nachricht }).to_string()
}
