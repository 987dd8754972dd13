//! Port fuer ausgehende Anrufe
//!
//! Die Session kennt nur diese Schnittstelle; die konkrete Carrier-Anbindung
//! liegt in `parlor-backends`.

use crate::types::CallSid;
use async_trait::async_trait;

/// Startet einen ausgehenden Anruf beim Carrier
#[async_trait]
pub trait AnrufInitiator: Send + Sync {
    /// Waehlt `ziel` an. Der Carrier holt sich das Anweisungsdokument
    /// anschliessend von `anweisungs_url`.
    async fn anruf_starten(&self, ziel: &str, anweisungs_url: &str) -> crate::Result<CallSid>;
}
