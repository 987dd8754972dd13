//! G.711 µ-law und WAV-Hilfsfunktionen
//!
//! Der Carrier liefert und erwartet 8kHz µ-law mono. Transkriptions-Dienste
//! wollen WAV, Synthese-Dienste liefern meist 16-Bit PCM mit hoeherer Rate.

use std::io::Cursor;

/// Abtastrate des Carriers
pub const CARRIER_RATE: u32 = 8000;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// µ-law Byte → 16-Bit PCM
pub fn dekodieren(mu: u8) -> i16 {
    let u = !mu;
    let exponent = (u >> 4) & 0x07;
    let mantisse = (u & 0x0F) as i32;
    let betrag = (((mantisse << 3) + BIAS) << exponent) - BIAS;
    if (u & 0x80) != 0 {
        -betrag as i16
    } else {
        betrag as i16
    }
}

/// 16-Bit PCM → µ-law Byte
pub fn kodieren(sample: i16) -> u8 {
    let mut s = sample as i32;
    let vorzeichen: u8 = if s < 0 {
        s = -s;
        0x80
    } else {
        0
    };
    s = s.min(CLIP) + BIAS;

    let mut exponent: u8 = 7;
    let mut maske = 0x4000;
    while exponent > 0 && (s & maske) == 0 {
        exponent -= 1;
        maske >>= 1;
    }
    let mantisse = ((s >> (exponent + 3)) & 0x0F) as u8;
    !(vorzeichen | (exponent << 4) | mantisse)
}

/// Dekodiert einen kompletten µ-law Puffer
pub fn puffer_dekodieren(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&b| dekodieren(b)).collect()
}

/// 16-Bit PCM (little endian) mit `quell_rate` → 8kHz µ-law
///
/// Reduziert die Rate durch Auslassen von Samples; fuer Sprache am Telefon
/// ausreichend.
pub fn pcm_zu_mulaw(pcm_le: &[u8], quell_rate: u32) -> Vec<u8> {
    let schritt = (quell_rate / CARRIER_RATE).max(1) as usize;
    pcm_le
        .chunks_exact(2)
        .step_by(schritt)
        .map(|paar| kodieren(i16::from_le_bytes([paar[0], paar[1]])))
        .collect()
}

/// Schreibt 16-Bit Mono-Samples als WAV in den Speicher
pub fn wav_kodieren(samples: &[i16], rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
