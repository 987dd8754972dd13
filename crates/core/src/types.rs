//! Datenmodell einer Anruf-Session
//!
//! Identifikatoren verwenden das Newtype-Pattern, damit Stream- und
//! Call-Kennungen des Carriers nicht verwechselt werden koennen.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Laufende Nummer eines Sprecherwechsels (Anrufer-Turn + Antwort)
pub type InteraktionsId = u32;

/// Kennung des Medien-Streams (vom Carrier beim `start` vergeben)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamSid(pub String);

impl StreamSid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamSid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for StreamSid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kennung des Anrufs beim Carrier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallSid(pub String);

impl CallSid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallSid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for CallSid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Antwort-Fragment
// ---------------------------------------------------------------------------

/// Ein sprechbares Stueck einer gestreamten Modell-Antwort
///
/// `index` ist nur fuer eine komplette, nicht gestreamte Antwort `None`
/// (z.B. die Begruessung).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFragment {
    pub interaktion: InteraktionsId,
    pub index: Option<u32>,
    pub text: String,
    pub ist_final: bool,
}

impl ResponseFragment {
    /// Komplette Antwort ohne Streaming (Sequenz-Index `None`)
    pub fn komplett(interaktion: InteraktionsId, text: impl Into<String>) -> Self {
        Self {
            interaktion,
            index: None,
            text: text.into(),
            ist_final: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Audio-Chunk
// ---------------------------------------------------------------------------

/// Synthetisiertes Audio fuer genau ein Fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub interaktion: InteraktionsId,
    pub index: Option<u32>,
    /// Marker-Label fuer die Abspiel-Bestaetigung
    pub label: String,
    /// Rohes Audio im Ausgabeformat des Carriers
    pub audio: Bytes,
}

impl AudioChunk {
    /// Leitet das Marker-Label aus Interaktion und Index ab
    ///
    /// `"{interaktion}-{index}"`, bei kompletten Antworten nur `"{interaktion}"`.
    pub fn label_fuer(interaktion: InteraktionsId, index: Option<u32>) -> String {
        match index {
            Some(i) => format!("{interaktion}-{i}"),
            None => interaktion.to_string(),
        }
    }
}
