//! Schneidet gestreamten Modell-Text in sprechbare Fragmente
//!
//! Geschnitten wird an Satzgrenzen (`.`, `!`, `?` gefolgt von Leerraum) oder
//! am expliziten Trennzeichen `•`, je nachdem was zuerst kommt. Das
//! Trennzeichen selbst wird nicht gesprochen und entfaellt.

/// Explizites Trennzeichen, mit dem das Modell Sprechpausen markiert
pub const TRENNZEICHEN: char = '•';

/// Sammelt Text-Deltas und gibt vollstaendige Fragmente heraus
#[derive(Debug, Default)]
pub struct FragmentSchneider {
    puffer: String,
}

impl FragmentSchneider {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt ein Delta an und gibt alle dadurch abgeschlossenen Fragmente zurueck
    pub fn hinzufuegen(&mut self, delta: &str) -> Vec<String> {
        self.puffer.push_str(delta);
        let mut fragmente = Vec::new();
        while let Some((ende, weiter)) = self.naechster_schnitt() {
            let fragment = self.puffer[..ende].trim().to_string();
            self.puffer.drain(..weiter);
            if !fragment.is_empty() {
                fragmente.push(fragment);
            }
        }
        fragmente
    }

    /// Gibt den restlichen Text am Stream-Ende zurueck
    pub fn abschliessen(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.puffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    /// Sucht die erste Schnittstelle im Puffer
    ///
    /// Liefert (Ende des Fragments, Beginn des Rests) als Byte-Offsets.
    fn naechster_schnitt(&self) -> Option<(usize, usize)> {
        let mut zeichen = self.puffer.char_indices().peekable();
        while let Some((pos, c)) = zeichen.next() {
            match c {
                TRENNZEICHEN => return Some((pos, pos + c.len_utf8())),
                '.' | '!' | '?' => {
                    if let Some(&(naechste_pos, naechstes)) = zeichen.peek() {
                        if naechstes.is_whitespace() {
                            return Some((naechste_pos, naechste_pos));
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
}
