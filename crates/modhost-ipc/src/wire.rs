//! The line-delimited JSON wire format exchanged with a foreign-language
//! child process (spec.md §3, §4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    pub id: i64,
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    pub id: i64,
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// The one-time `{"ready": true}` frame a child emits on stdout once its
/// runtime is initialized (spec.md §4.3's startup handshake).
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyFrame {
    pub ready: bool,
}

pub fn is_ready_frame(line: &str) -> bool {
    serde_json::from_str::<ReadyFrame>(line)
        .map(|frame| frame.ready)
        .unwrap_or(false)
}
