use std::collections::HashMap;

use serde::Deserialize;

/// Outcome of decoding provider text. Malformed content is not an error:
/// the pipeline keeps running with an empty value and the reason is
/// surfaced to the caller for logging.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Degraded(T, String),
}

impl<T> ParseOutcome<T> {
    pub fn into_value(self) -> T {
        match self {
            Self::Parsed(value) => value,
            Self::Degraded(value, _) => value,
        }
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Self::Parsed(_) => None,
            Self::Degraded(_, reason) => Some(reason.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MaterialsRecord {
    #[serde(rename = "itemName", alias = "ItemName")]
    item_name: String,
    #[serde(alias = "Materials")]
    materials: Vec<String>,
}

/// Strips one leading markdown code fence (with or without a `json` tag)
/// and one trailing fence. The provider wraps JSON answers this way often
/// enough that every decode goes through here first.
pub fn clean_response(input: &str) -> &str {
    let mut text = input.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

pub fn parse_string_list(text: &str) -> ParseOutcome<Vec<String>> {
    let cleaned = clean_response(text);
    match serde_json::from_str::<Vec<String>>(cleaned) {
        Ok(values) => ParseOutcome::Parsed(values),
        Err(error) => ParseOutcome::Degraded(
            Vec::new(),
            format!("response is not a JSON string array: {error}"),
        ),
    }
}

/// Decodes `[{"itemName": ..., "materials": [...]}]` into a map keyed by
/// item name. Duplicate names fold last-write-wins.
pub fn parse_materials_map(text: &str) -> ParseOutcome<HashMap<String, Vec<String>>> {
    let cleaned = clean_response(text);
    match serde_json::from_str::<Vec<MaterialsRecord>>(cleaned) {
        Ok(records) => {
            let mut map = HashMap::with_capacity(records.len());
            for record in records {
                map.insert(record.item_name, record.materials);
            }
            ParseOutcome::Parsed(map)
        }
        Err(error) => ParseOutcome::Degraded(
            HashMap::new(),
            format!("response is not a JSON materials array: {error}"),
        ),
    }
}
