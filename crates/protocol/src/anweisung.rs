//! Anweisungsdokument fuer den Carrier
//!
//! Das Dokument weist den Carrier an, einen bidirektionalen Medien-Stream
//! zu Parlor aufzubauen. Zusatzparameter landen beim `start`-Ereignis in
//! `customParameters`.

/// Builder fuer `<Response><Connect><Stream>`
#[derive(Debug, Clone, Default)]
pub struct StreamAnweisung {
    url: String,
    parameter: Vec<(String, String)>,
}

impl StreamAnweisung {
    pub fn neu(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            parameter: Vec::new(),
        }
    }

    /// Haengt einen `<Parameter>` an den Stream an
    pub fn parameter(mut self, name: impl Into<String>, wert: impl Into<String>) -> Self {
        self.parameter.push((name.into(), wert.into()));
        self
    }

    /// Rendert das XML-Dokument
    pub fn als_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push_str("<Response><Connect>");
        if self.parameter.is_empty() {
            xml.push_str(&format!(r#"<Stream url="{}"/>"#, escapen(&self.url)));
        } else {
            xml.push_str(&format!(r#"<Stream url="{}">"#, escapen(&self.url)));
            for (name, wert) in &self.parameter {
                xml.push_str(&format!(
                    r#"<Parameter name="{}" value="{}"/>"#,
                    escapen(name),
                    escapen(wert)
                ));
            }
            xml.push_str("</Stream>");
        }
        xml.push_str("</Connect></Response>");
        xml
    }
}

/// Escaped Sonderzeichen fuer XML-Attribute
fn escapen(text: &str) -> String {
    let mut aus = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => aus.push_str("&amp;"),
            '<' => aus.push_str("&lt;"),
            '>' => aus.push_str("&gt;"),
            '"' => aus.push_str("&quot;"),
            '\'' => aus.push_str("&apos;"),
            _ => aus.push(c),
        }
    }
    aus
}
