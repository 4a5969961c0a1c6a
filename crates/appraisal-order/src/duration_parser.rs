use serde::{de, Deserialize, Deserializer};
use std::time::Duration;

/// Parse human-readable duration strings into milliseconds
/// Supports formats like: "1s", "500ms", "2m", "1.5s", "30", "2h"
pub fn parse_duration(input: &str) -> Result<u64, String> {
    let input = input.trim();

    // Try to parse as plain number first (assumes milliseconds)
    if let Ok(ms) = input.parse::<u64>() {
        return Ok(ms);
    }

    let (number_part, unit_part) = split_number_and_unit(input)?;
    let value: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {number_part}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("Duration must be a non-negative number: {input}"));
    }

    let multiplier = match unit_part.trim() {
        "ms" | "milliseconds" | "millisecond" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "" => 1.0,
        other => return Err(format!("Unknown time unit: {other}")),
    };

    Ok((value * multiplier) as u64)
}

fn split_number_and_unit(input: &str) -> Result<(&str, &str), String> {
    let split_pos = input
        .char_indices()
        .find(|(_, ch)| ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    let number_part = &input[..split_pos];
    let unit_part = &input[split_pos..];

    if number_part.trim().is_empty() {
        return Err(format!("No numeric value in duration: {input}"));
    }

    Ok((number_part, unit_part))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

/// Serde adapter accepting either integer milliseconds or a duration string.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
        RawDuration::Text(text) => parse_duration(&text)
            .map(Duration::from_millis)
            .map_err(de::Error::custom),
    }
}

/// Like [`deserialize_duration`] for optional fields; `null` stays `None`.
pub fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawDuration>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDuration::Millis(ms)) => Ok(Some(Duration::from_millis(ms))),
        Some(RawDuration::Text(text)) => parse_duration(&text)
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(de::Error::custom),
    }
}

pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}
