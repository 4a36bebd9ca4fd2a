// Analyzer output decoding
//
// Pure and stateless: every call decodes its input independently.
// Text mode is a best-effort field extractor, not a protocol parser; when
// the patterns miss, the result degrades to just `raw`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

use crate::domain::OutputFormat;

static SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(PAT|PMT|SDT|NIT|EIT|CAT|TOT|TDT)\b").unwrap());

static SERVICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bService\b").unwrap());

static BITRATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)bitrate[:\s]+(\d+(?:\.\d+)?)\s*(?:([KMG])(?:bps|b/s)|bps|b/s)?").unwrap()
});

static PACKETS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:TS\s+)?packets?[:\s]+(\d+)").unwrap());

static PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)PID\s+(\d+)[:\s]+(.+)").unwrap());

/// Fields extracted from text-mode analyzer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysis {
    pub raw: String,
    pub errors: String,
    pub sections: Vec<String>,
    pub services: Vec<String>,
    pub pids: BTreeMap<u32, String>,
    /// Bits per second
    pub bitrate: Option<f64>,
    pub packet_count: Option<u64>,
}

/// One decoded stdout chunk
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedOutput {
    /// Single JSON value, or an ordered array when a chunk held several
    Json(serde_json::Value),
    Text(TextAnalysis),
}

impl DecodedOutput {
    /// Payload persisted in the analysis record
    pub fn into_payload(self) -> serde_json::Value {
        match self {
            DecodedOutput::Json(value) => value,
            DecodedOutput::Text(text) => serde_json::to_value(text).unwrap_or_else(|e| {
                // BTreeMap<u32, String> keys serialize as strings, so this is unreachable
                serde_json::json!({ "error": e.to_string() })
            }),
        }
    }
}

/// Decode one chunk of analyzer stdout
///
/// `stderr` is only used in text mode, copied verbatim into `errors`.
/// JSON mode returns `None` when no line parsed; text mode always returns
/// a container.
pub fn decode(stdout: &str, stderr: &str, format: OutputFormat) -> Option<DecodedOutput> {
    match format {
        OutputFormat::Json => decode_json(stdout).map(DecodedOutput::Json),
        OutputFormat::Text => Some(DecodedOutput::Text(decode_text(stdout, stderr))),
    }
}

fn decode_json(stdout: &str) -> Option<serde_json::Value> {
    let mut values: Vec<serde_json::Value> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(value) => Some(value),
            Err(e) => {
                trace!(error = %e, "Dropping malformed JSON line");
                None
            }
        })
        .collect();

    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(serde_json::Value::Array(values)),
    }
}

fn decode_text(stdout: &str, stderr: &str) -> TextAnalysis {
    let mut result = TextAnalysis {
        raw: stdout.to_string(),
        errors: stderr.to_string(),
        sections: Vec::new(),
        services: Vec::new(),
        pids: BTreeMap::new(),
        bitrate: None,
        packet_count: None,
    };

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if SECTION_RE.is_match(line) {
            result.sections.push(line.to_string());
        }

        if SERVICE_RE.is_match(line) {
            result.services.push(line.to_string());
        }

        if let Some(bitrate) = parse_bitrate(line) {
            result.bitrate = Some(bitrate);
        }

        if let Some(count) = PACKETS_RE
            .captures(line)
            .and_then(|c| c[1].parse::<u64>().ok())
        {
            result.packet_count = Some(count);
        }

        if let Some(caps) = PID_RE.captures(line) {
            if let Ok(pid) = caps[1].parse::<u32>() {
                result.pids.insert(pid, caps[2].trim().to_string());
            }
        }
    }

    result
}

/// Normalize `bitrate: <n> [K|M|G]bps` to bits per second
fn parse_bitrate(line: &str) -> Option<f64> {
    let caps = BITRATE_RE.captures(line)?;
    let value: f64 = caps[1].parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(unit) if unit == "K" => 1e3,
        Some(unit) if unit == "M" => 1e6,
        Some(unit) if unit == "G" => 1e9,
        _ => 1.0,
    };
    Some(value * multiplier)
}
