//! ==============================================================================
//! parser.rs - serial line decoding and reading parser
//! ==============================================================================
//!
//! purpose:
//!     turns one raw line from the board into a typed `Reading`.
//!
//!     board line format (ascii, newline terminated):
//!         temperature,humidity,light,gas,rain
//!         e.g. `25.0,60.0,80,150,20`
//!
//!     anything else is rejected silently: wrong field count, a field that
//!     does not convert, or a blank line. no partial readings are produced.
//!
//! relationships:
//!     - used by: telemetry.rs (once per line read from the link)
//!     - produces: domain.rs (Reading)
//!
//! ==============================================================================

use crate::domain::Reading;

const FIELD_COUNT: usize = 5;

/// decode raw bytes as text, dropping invalid utf-8 sequences
///
/// undecodable bytes are skipped rather than replaced, and the result is
/// trimmed of surrounding whitespace (including the `\r\n` terminator).
pub fn decode_line(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text.trim().to_string()
}

/// parse one decoded line into a reading
pub fn parse_reading(line: &str) -> Option<Reading> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != FIELD_COUNT {
        tracing::trace!("rejected line with {} fields: {:?}", parts.len(), line);
        return None;
    }

    let reading = Reading {
        temperature: parse_finite(parts[0])?,
        humidity: parse_finite(parts[1])?,
        light: parts[2].trim().parse().ok()?,
        gas_level: parts[3].trim().parse().ok()?,
        rain: parts[4].trim().parse().ok()?,
    };
    Some(reading)
}

// `f64::from_str` takes "NaN" and "inf", which are not readings
fn parse_finite(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_example_line() {
        let r = parse_reading("25.0,60.0,80,150,20").unwrap();
        assert_eq!(
            r,
            Reading { temperature: 25.0, humidity: 60.0, light: 80, gas_level: 150, rain: 20 }
        );
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        for count in 0..=10usize {
            let line = vec!["1"; count].join(",");
            let parsed = parse_reading(&line);
            if count == FIELD_COUNT {
                assert!(parsed.is_some(), "five fields should parse");
            } else {
                assert!(parsed.is_none(), "{count} fields should be rejected");
            }
        }
    }

    #[test]
    fn test_formatted_values_come_back_unchanged() {
        let samples = [
            (21.5, 43.25, 512_i64, 87_i64, 3_i64),
            (-4.0, 99.9, 0, 1023, 90),
            (38.125, 0.0, 75, 500, 1023),
        ];
        for (t, h, l, g, r) in samples {
            let line = format!("{t},{h},{l},{g},{r}");
            let reading = parse_reading(&line).unwrap();
            assert_eq!(reading.temperature, t);
            assert_eq!(reading.humidity, h);
            assert_eq!(reading.light, l);
            assert_eq!(reading.gas_level, g);
            assert_eq!(reading.rain, r);
        }
    }

    #[test]
    fn test_bad_conversion_is_rejected() {
        assert!(parse_reading("abc,60.0,80,150,20").is_none());
        assert!(parse_reading("25.0,60.0,80.5,150,20").is_none());
        assert!(parse_reading("25.0,60.0,80,150,").is_none());
        assert!(parse_reading("25.0,,80,150,20").is_none());
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        assert!(parse_reading("NaN,inf,80,150,20").is_none());
        assert!(parse_reading("25.0,infinity,80,150,20").is_none());
        assert!(parse_reading("-inf,60.0,80,150,20").is_none());
        assert!(parse_reading("25.0,nan,80,150,20").is_none());
    }

    #[test]
    fn test_integers_accepted_for_float_fields() {
        let r = parse_reading("25,60,80,150,20").unwrap();
        assert_eq!(r.temperature, 25.0);
        assert_eq!(r.humidity, 60.0);
    }

    #[test]
    fn test_field_whitespace_is_tolerated() {
        let r = parse_reading("25.0, 60.0 ,80, 150,20").unwrap();
        assert_eq!(r.humidity, 60.0);
        assert_eq!(r.gas_level, 150);
    }

    #[test]
    fn test_decode_strips_terminator() {
        assert_eq!(decode_line(b"25.0,60.0,80,150,20\r\n"), "25.0,60.0,80,150,20");
        assert_eq!(decode_line(b"   \n"), "");
    }

    #[test]
    fn test_decode_drops_invalid_bytes() {
        let raw = b"\xff25.0,60.0,8\xfe0,150,20\n";
        let line = decode_line(raw);
        assert_eq!(line, "25.0,60.0,80,150,20");
        assert!(parse_reading(&line).is_some());
    }
}
