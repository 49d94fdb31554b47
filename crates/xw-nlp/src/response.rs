//! Decoding and validating completion-service output.

use serde_json::{Map, Value};
use xw_protocol::{CommandArgs, Intent, ParsedCommand, REMOTE_DEFAULT_CONFIDENCE};

use crate::error::{PipelineError, PipelineResult};
use crate::fallback::{FALLBACK_CONFIDENCE, intent_for_command};
use crate::prompt::extract_json;

fn malformed(reason: impl Into<String>) -> PipelineError {
    PipelineError::MalformedResponse(reason.into())
}

fn arg_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn decode_args(obj: &Map<String, Value>) -> CommandArgs {
    match obj.get("args") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| arg_value(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => CommandArgs::new(),
    }
}

/// Turn raw completion text into a `ParsedCommand` for `raw`.
///
/// Requires `normalized_command` (string, or list for action sequences) and
/// `intent`. Missing confidence means `REMOTE_DEFAULT_CONFIDENCE`; reported
/// confidence at or below the fallback level is rejected.
pub fn decode_response(text: &str, raw: &str) -> PipelineResult<ParsedCommand> {
    let value: Value = serde_json::from_str(extract_json(text))
        .map_err(|e| malformed(format!("not JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object"))?;

    let intent_label = obj
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing intent"))?;

    let mut args = decode_args(obj);
    let (normalized_command, intent) = match obj.get("normalized_command") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let command = s.trim().to_string();
            let intent = match Intent::from_label(intent_label) {
                Intent::Unknown => intent_for_command(&command),
                known => known,
            };
            (command, intent)
        }
        Some(Value::Array(items)) => {
            let commands: Vec<&str> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            let (first, rest) = commands
                .split_first()
                .ok_or_else(|| malformed("empty command sequence"))?;
            if !rest.is_empty() {
                args.insert("sequence".to_string(), rest.join(","));
            }
            (first.to_string(), Intent::ActionSequence)
        }
        _ => return Err(malformed("missing normalized_command")),
    };

    let confidence = match obj.get("confidence").and_then(Value::as_f64) {
        Some(c) => c.clamp(0.0, 1.0),
        None => REMOTE_DEFAULT_CONFIDENCE,
    };
    if confidence <= FALLBACK_CONFIDENCE {
        return Err(PipelineError::LowConfidence { confidence });
    }

    Ok(ParsedCommand {
        raw: raw.to_string(),
        normalized_command,
        intent,
        args,
        explanation: obj
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence,
    })
}
