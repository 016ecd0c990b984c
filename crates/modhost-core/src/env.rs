//! `.env` file parsing and `${NAME}` interpolation (spec.md §4.5, §6).
//!
//! Both pieces are pure, allocation-light utilities shared by the
//! orchestrator: parsing never touches the host process environment (a
//! `.env` file's values stay in an in-memory map), and interpolation
//! resolves a precedence chain the orchestrator assembles per load.

use std::collections::HashMap;

/// Parse `KEY=VALUE` lines, skipping blank lines and `#`-comments, with
/// optional single/double quotes stripped from values.
pub fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote(value.trim()));
    }
    map
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Best-effort load of a `.env` file at `path`: a missing file is fine and
/// yields an empty map (spec.md §4.6: "best-effort; missing file is fine").
pub async fn load_env_file(path: &std::path::Path) -> HashMap<String, String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_env_file(&contents),
        Err(_) => HashMap::new(),
    }
}

/// Replace every `${NAME}` occurrence in `input` using, in precedence
/// order, the maps in `scopes` (earliest wins) and finally the host process
/// environment; unresolved variables become the empty string (spec.md
/// §4.5).
pub fn interpolate(input: &str, scopes: &[&HashMap<String, String>]) -> String {
    let mut output = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = input[i + 2..].find('}') {
                let name = &input[i + 2..i + 2 + end];
                output.push_str(&resolve(name, scopes));
                i = i + 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        output.push(ch);
        i += ch.len_utf8();
    }
    output
}

fn resolve(name: &str, scopes: &[&HashMap<String, String>]) -> String {
    for scope in scopes {
        if let Some(value) = scope.get(name) {
            return value.clone();
        }
    }
    std::env::var(name).unwrap_or_default()
}

/// Walk every string leaf in a JSON tree and interpolate it in place.
pub fn interpolate_json(value: &mut serde_json::Value, scopes: &[&HashMap<String, String>]) {
    match value {
        serde_json::Value::String(s) => {
            *s = interpolate(s, scopes);
        }
        serde_json::Value::Array(items) => {
            for item in items {
                interpolate_json(item, scopes);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                interpolate_json(v, scopes);
            }
        }
        _ => {}
    }
}
