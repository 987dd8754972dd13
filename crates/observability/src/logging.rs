//! Log-Ausgabe der Sessions
//!
//! Der Filter ist eine `EnvFilter`-Direktive, also entweder ein einzelnes
//! Level (`debug`) oder eine Liste wie `info,parlor_session=trace`. Dieselbe
//! Syntax gilt fuer die Konfigurationsdatei und fuer `PARLOR_LOG_LEVEL`.
//! `PARLOR_LOG_FORMAT` waehlt zwischen Text und JSON.

use std::str::FromStr;

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

pub const LEVEL_VARIABLE: &str = "PARLOR_LOG_LEVEL";
pub const FORMAT_VARIABLE: &str = "PARLOR_LOG_FORMAT";

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// Eine JSON-Zeile pro Ereignis, fuer Log-Sammler
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unbekanntes Log-Format '{0}' (text oder json)")]
pub struct UnbekanntesFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnbekanntesFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anderes => Err(UnbekanntesFormat(anderes.to_string())),
        }
    }
}

/// Fehler beim Lesen einer Filter-Direktive
#[derive(Debug, thiserror::Error)]
pub enum FilterFehler {
    /// `EnvFilter` wuerde aus einer leeren Direktive stillschweigend `error` machen
    #[error("leere Filter-Direktive")]
    Leer,
    #[error("ungueltige Filter-Direktive: {0}")]
    Ungueltig(#[from] ParseError),
}

/// Baut den Filter aus einer Direktive
pub fn filter_bauen(direktive: &str) -> Result<EnvFilter, FilterFehler> {
    let direktive = direktive.trim();
    if direktive.is_empty() {
        return Err(FilterFehler::Leer);
    }
    Ok(EnvFilter::try_new(direktive)?)
}

/// Installiert den globalen Subscriber
///
/// Gesetzte Umgebungsvariablen haben Vorrang vor `level` und `format`. Eine
/// ungueltige Direktive faellt auf `info` zurueck und wird nach dem Start
/// gemeldet. Ein zweiter Aufruf bleibt wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let direktive = std::env::var(LEVEL_VARIABLE).unwrap_or_else(|_| level.to_string());
    let (filter, filter_fehler) = match filter_bauen(&direktive) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new("info"), Some(e)),
    };

    let format_wert = std::env::var(FORMAT_VARIABLE).unwrap_or_else(|_| format.to_string());
    let log_format = format_wert.parse::<LogFormat>().unwrap_or_default();

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installiert = match log_format {
        LogFormat::Json => builder
            .json()
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if installiert.is_err() {
        return;
    }

    if let Some(e) = filter_fehler {
        tracing::warn!(direktive = %direktive, fehler = %e, "Ungueltiger Log-Filter, verwende info");
    }
    if format_wert.parse::<LogFormat>().is_err() {
        tracing::warn!(format = %format_wert, "Unbekanntes Log-Format, verwende text");
    }
}

pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einfache_level_sind_gueltig() {
        for level in ["trace", "debug", "info", "warn", "error", "off"] {
            assert!(filter_bauen(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn direktiven_sind_gueltig() {
        assert!(filter_bauen("info,parlor_session=debug").is_ok());
        assert!(filter_bauen("warn,parlor_pipeline::reorder=trace").is_ok());
        assert!(filter_bauen(" debug ").is_ok());
    }

    #[test]
    fn kaputte_direktiven_werden_abgelehnt() {
        assert!(filter_bauen("").is_err());
        assert!(filter_bauen("   ").is_err());
        assert!(filter_bauen("parlor_session=lautstark").is_err());
    }

    #[test]
    fn filter_bauen_liefert_den_fehler() {
        assert!(matches!(filter_bauen(""), Err(FilterFehler::Leer)));
        assert!(matches!(
            filter_bauen("parlor_session=lautstark"),
            Err(FilterFehler::Ungueltig(_))
        ));
        let filter = filter_bauen("parlor_session=debug").unwrap();
        assert!(filter.to_string().contains("parlor_session=debug"));
    }

    #[test]
    fn log_format_werte() {
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(
            "JSON".parse::<LogFormat>(),
            Err(UnbekanntesFormat("JSON".into()))
        );
        assert!(!log_format_gueltig("xml"));
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
