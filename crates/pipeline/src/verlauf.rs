//! Begrenzter Gespraechsverlauf als Kontext fuer das Sprachmodell

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::werkzeug::Werkzeugaufruf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rolle {
    System,
    #[serde(rename = "user")]
    Benutzer,
    #[serde(rename = "assistant")]
    Assistent,
    #[serde(rename = "tool")]
    Werkzeug,
}

/// Eine Nachricht im Modell-Kontext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nachricht {
    pub rolle: Rolle,
    pub inhalt: String,
    /// Nur bei Assistent-Nachrichten, die Werkzeuge anfordern
    pub werkzeugaufrufe: Vec<Werkzeugaufruf>,
    /// Nur bei Werkzeug-Ergebnissen: ID des beantworteten Aufrufs
    pub werkzeug_id: Option<String>,
}

impl Nachricht {
    fn neu(rolle: Rolle, inhalt: impl Into<String>) -> Self {
        Self {
            rolle,
            inhalt: inhalt.into(),
            werkzeugaufrufe: Vec::new(),
            werkzeug_id: None,
        }
    }

    pub fn system(inhalt: impl Into<String>) -> Self {
        Self::neu(Rolle::System, inhalt)
    }

    pub fn benutzer(inhalt: impl Into<String>) -> Self {
        Self::neu(Rolle::Benutzer, inhalt)
    }

    pub fn assistent(inhalt: impl Into<String>) -> Self {
        Self::neu(Rolle::Assistent, inhalt)
    }

    /// Assistent-Nachricht, die Werkzeugaufrufe anfordert
    pub fn werkzeug_anforderung(inhalt: impl Into<String>, aufrufe: Vec<Werkzeugaufruf>) -> Self {
        Self {
            werkzeugaufrufe: aufrufe,
            ..Self::neu(Rolle::Assistent, inhalt)
        }
    }

    pub fn werkzeug_ergebnis(id: impl Into<String>, inhalt: impl Into<String>) -> Self {
        Self {
            werkzeug_id: Some(id.into()),
            ..Self::neu(Rolle::Werkzeug, inhalt)
        }
    }
}

/// Rollierender Verlauf abgeschlossener Interaktionen
#[derive(Debug, Clone)]
pub struct Verlauf {
    system_prompt: String,
    nachrichten: VecDeque<Nachricht>,
    max_nachrichten: usize,
}

impl Verlauf {
    pub fn neu(system_prompt: impl Into<String>, max_nachrichten: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            nachrichten: VecDeque::new(),
            max_nachrichten,
        }
    }

    /// Haengt eine abgeschlossene Interaktion an und kuerzt von vorne
    pub fn interaktion_anhaengen(&mut self, anfrage: &str, antwort: &str) {
        self.nachrichten.push_back(Nachricht::benutzer(anfrage));
        if !antwort.is_empty() {
            self.nachrichten.push_back(Nachricht::assistent(antwort));
        }
        while self.nachrichten.len() > self.max_nachrichten {
            self.nachrichten.pop_front();
        }
    }

    /// Kontext fuer eine neue Anfrage: System-Prompt, Verlauf, Anfrage
    pub fn kontext(&self, anfrage: &str) -> Vec<Nachricht> {
        let mut kontext = Vec::with_capacity(self.nachrichten.len() + 2);
        if !self.system_prompt.is_empty() {
            kontext.push(Nachricht::system(self.system_prompt.clone()));
        }
        kontext.extend(self.nachrichten.iter().cloned());
        kontext.push(Nachricht::benutzer(anfrage));
        kontext
    }

    pub fn len(&self) -> usize {
        self.nachrichten.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nachrichten.is_empty()
    }
}
