//! Medien-Stream-Nachrichten (WebSocket, JSON)
//!
//! Jede WebSocket-Textnachricht traegt genau ein Ereignis. Das Feld
//! `event` bestimmt den Nachrichtentyp.
//!
//! ## Eingehend
//! `connected`, `start`, `media`, `mark`, `stop`
//!
//! ## Ausgehend
//! `media` (Audio), `mark` (Abspiel-Bestaetigung anfordern), `clear`
//! (gepuffertes Audio beim Carrier verwerfen)

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use parlor_core::{CallSid, StreamSid};
use serde::{Deserialize, Serialize};

use crate::error::ProtokollResult;

// ---------------------------------------------------------------------------
// Eingehende Nachrichten
// ---------------------------------------------------------------------------

/// Nachricht vom Carrier an Parlor
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum EingehendeNachricht {
    /// Verbindung aufgebaut, noch kein Stream
    Connected,
    /// Stream gestartet
    Start { start: StartDaten },
    /// Ein Audio-Frame vom Anrufer
    Media { media: MediaNutzlast },
    /// Bestaetigung, dass ein Marker abgespielt wurde
    Mark {
        mark: MarkDaten,
        #[serde(rename = "sequenceNumber", default)]
        sequenz: Option<SequenzNummer>,
    },
    /// Stream beendet
    Stop,
}

impl EingehendeNachricht {
    /// Parst eine WebSocket-Textnachricht
    pub fn parsen(text: &str) -> ProtokollResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Metadaten des `start`-Ereignisses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDaten {
    pub stream_sid: StreamSid,
    #[serde(default)]
    pub call_sid: Option<CallSid>,
    /// Freie Parameter aus dem Anweisungsdokument
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartDaten {
    /// Optionale Startnachricht fuer den Antwort-Generator
    pub fn erste_nachricht(&self) -> Option<&str> {
        self.parameter("firstMessage")
    }

    /// Rufnummer des Gegenuebers (falls uebergeben)
    pub fn anrufer(&self) -> Option<&str> {
        self.parameter("callerNumber")
    }

    fn parameter(&self, name: &str) -> Option<&str> {
        self.custom_parameters
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Base64-kodiertes Audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaNutzlast {
    pub payload: String,
}

impl MediaNutzlast {
    pub fn kodieren(audio: &[u8]) -> Self {
        Self {
            payload: STANDARD.encode(audio),
        }
    }

    /// Dekodiert die Nutzlast zu rohem Audio
    pub fn audio(&self) -> ProtokollResult<Bytes> {
        Ok(Bytes::from(STANDARD.decode(self.payload.as_bytes())?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDaten {
    pub name: String,
}

/// Sequenznummer des Carriers (wird als Zahl oder als String geliefert)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SequenzNummer {
    Zahl(u64),
    Text(String),
}

impl SequenzNummer {
    pub fn als_zahl(&self) -> Option<u64> {
        match self {
            Self::Zahl(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Nachrichten
// ---------------------------------------------------------------------------

/// Nachricht von Parlor an den Carrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum AusgehendeNachricht {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: StreamSid,
        media: MediaNutzlast,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: StreamSid,
        mark: MarkDaten,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: StreamSid,
    },
}

impl AusgehendeNachricht {
    pub fn media(stream_sid: StreamSid, audio: &[u8]) -> Self {
        Self::Media {
            stream_sid,
            media: MediaNutzlast::kodieren(audio),
        }
    }

    pub fn mark(stream_sid: StreamSid, label: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid,
            mark: MarkDaten { name: label.into() },
        }
    }

    pub fn clear(stream_sid: StreamSid) -> Self {
        Self::Clear { stream_sid }
    }

    /// Marker-Label, falls es sich um eine `mark`-Nachricht handelt
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Mark { mark, .. } => Some(&mark.name),
            _ => None,
        }
    }

    pub fn ist_clear(&self) -> bool {
        matches!(self, Self::Clear { .. })
    }

    pub fn zu_json(&self) -> ProtokollResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_mit_parametern_parsen() {
        let json = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ1",
                "callSid": "CA1",
                "tracks": ["inbound"],
                "customParameters": {"firstMessage": "Hello", "callerNumber": "+4912345"}
            },
            "streamSid": "MZ1"
        }"#;
        let nachricht = EingehendeNachricht::parsen(json).unwrap();
        let EingehendeNachricht::Start { start } = nachricht else {
            panic!("Erwartet Start-Ereignis");
        };
        assert_eq!(start.stream_sid.as_str(), "MZ1");
        assert_eq!(start.call_sid, Some(CallSid::from("CA1")));
        assert_eq!(start.erste_nachricht(), Some("Hello"));
        assert_eq!(start.anrufer(), Some("+4912345"));
    }

    #[test]
    fn leere_startnachricht_zaehlt_als_fehlend() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ1","customParameters":{"firstMessage":"  "}}}"#;
        let EingehendeNachricht::Start { start } = EingehendeNachricht::parsen(json).unwrap() else {
            panic!("Erwartet Start-Ereignis");
        };
        assert_eq!(start.erste_nachricht(), None);
        assert_eq!(start.call_sid, None);
    }

    #[test]
    fn media_nutzlast_dekodieren() {
        let json = r#"{"event":"media","media":{"track":"inbound","payload":"AQID"}}"#;
        let EingehendeNachricht::Media { media } = EingehendeNachricht::parsen(json).unwrap() else {
            panic!("Erwartet Media-Ereignis");
        };
        assert_eq!(media.audio().unwrap().as_ref(), &[1u8, 2, 3]);
    }

    #[test]
    fn ungueltiges_base64_ist_fehler() {
        let media = MediaNutzlast {
            payload: "%%%".into(),
        };
        assert!(media.audio().is_err());
    }

    #[test]
    fn mark_mit_sequenznummer_als_string() {
        let json = r#"{"event":"mark","sequenceNumber":"7","mark":{"name":"2-1"}}"#;
        let nachricht = EingehendeNachricht::parsen(json).unwrap();
        let EingehendeNachricht::Mark { mark, sequenz } = nachricht else {
            panic!("Erwartet Mark-Ereignis");
        };
        assert_eq!(mark.name, "2-1");
        assert_eq!(sequenz.and_then(|s| s.als_zahl()), Some(7));
    }

    #[test]
    fn stop_und_connected_ignorieren_zusatzfelder() {
        let stop = r#"{"event":"stop","stop":{"callSid":"CA1"},"streamSid":"MZ1"}"#;
        assert_eq!(EingehendeNachricht::parsen(stop).unwrap(), EingehendeNachricht::Stop);
        let connected = r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#;
        assert_eq!(
            EingehendeNachricht::parsen(connected).unwrap(),
            EingehendeNachricht::Connected
        );
    }

    #[test]
    fn unbekanntes_ereignis_ist_fehler() {
        assert!(EingehendeNachricht::parsen(r#"{"event":"dtmf"}"#).is_err());
        assert!(EingehendeNachricht::parsen("kein json").is_err());
    }

    #[test]
    fn ausgehende_nachrichten_format() {
        let sid = StreamSid::from("MZ9");
        let media = AusgehendeNachricht::media(sid.clone(), &[1, 2, 3]);
        let wert: serde_json::Value = serde_json::from_str(&media.zu_json().unwrap()).unwrap();
        assert_eq!(
            wert,
            serde_json::json!({"event": "media", "streamSid": "MZ9", "media": {"payload": "AQID"}})
        );

        let mark = AusgehendeNachricht::mark(sid.clone(), "0-2");
        assert_eq!(mark.label(), Some("0-2"));
        let wert: serde_json::Value = serde_json::from_str(&mark.zu_json().unwrap()).unwrap();
        assert_eq!(
            wert,
            serde_json::json!({"event": "mark", "streamSid": "MZ9", "mark": {"name": "0-2"}})
        );

        let clear = AusgehendeNachricht::clear(sid);
        assert!(clear.ist_clear());
        assert_eq!(
            clear.zu_json().unwrap(),
            r#"{"event":"clear","streamSid":"MZ9"}"#
        );
    }
}
