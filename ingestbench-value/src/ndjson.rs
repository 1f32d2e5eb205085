use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Encodes records as newline-delimited JSON: one object per line, each line
/// terminated by `\n` (including the last one).
pub fn encode_ndjson<T: Serialize>(records: &[T]) -> Result<Bytes> {
    let mut buf = Vec::with_capacity(records.len().saturating_mul(128));
    for rec in records {
        serde_json::to_writer(&mut buf, rec)?;
        buf.push(b'\n');
    }
    Ok(Bytes::from(buf))
}

/// Decodes a newline-delimited JSON body. Blank lines are skipped; line numbers
/// in errors are 1-based.
pub fn decode_ndjson<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>> {
    body.split(|b| *b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
        .map(|(idx, line)| {
            serde_json::from_slice(line).map_err(|source| Error::Line {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{MetricRecord, Payload, Value};

    fn metric(step: u64, v: f64) -> MetricRecord {
        let mut data = Payload::new();
        data.insert("train/loss".to_string(), Value::Float(v));
        MetricRecord {
            time: 1,
            step,
            data,
        }
    }

    #[test]
    fn one_object_per_line_with_trailing_newline() {
        let body = encode_ndjson(&[metric(1, 0.5), metric(2, 0.25)]).unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn non_finite_values_encode_without_error() {
        let body = encode_ndjson(&[metric(1, f64::NAN), metric(2, f64::INFINITY)]).unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("\"NaN\""));
        assert!(text.contains("\"Infinity\""));
    }

    #[test]
    fn decode_reports_bad_line_number() {
        let err = decode_ndjson::<MetricRecord>(b"{\"time\":1,\"step\":1,\"data\":{}}\nnope\n")
            .unwrap_err();
        assert!(matches!(err, Error::Line { line: 2, .. }), "{err}");
    }

    #[test]
    fn decode_skips_blank_lines() {
        let body = encode_ndjson(&[metric(3, 0.1)]).unwrap();
        let decoded: Vec<MetricRecord> = decode_ndjson(&body).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].step, 3);
    }
}
