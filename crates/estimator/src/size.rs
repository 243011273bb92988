use serde::{Serialize, Deserialize};
use gasbench_types::ExecuteMsg;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeEstimate {
    /// UTF-8 bytes of the stored content (the regression's x).
    pub content_bytes: u64,
    /// Bytes of the full execute message JSON, escapes included.
    pub message_bytes: u64,
}

impl SizeEstimate {
    /// JSON envelope + escaping overhead on top of the content.
    pub fn overhead(&self) -> u64 {
        self.message_bytes.saturating_sub(self.content_bytes)
    }
}

#[inline]
pub fn content_bytes(content: &str) -> u64 {
    content.len() as u64
}

pub fn estimate_message_size(msg: &ExecuteMsg) -> Result<SizeEstimate, serde_json::Error> {
    let encoded = serde_json::to_vec(msg)?;
    Ok(SizeEstimate {
        content_bytes: content_bytes(msg.content()),
        message_bytes: encoded.len() as u64,
    })
}
