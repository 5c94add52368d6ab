//! Log sanitization
//!
//! Response bodies can carry TXT payloads, DKIM keys or echoed tokens; only a
//! bounded prefix is ever logged.

/// 日志中保留的最大字节数
const TRUNCATE_LIMIT: usize = 256;

/// First `TRUNCATE_LIMIT` bytes of `s` (cut on a char boundary) plus the total length.
pub fn truncate_for_log(s: &str) -> String {
    if s.len() <= TRUNCATE_LIMIT {
        return s.to_string();
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= TRUNCATE_LIMIT)
        .last()
        .unwrap_or(0);
    format!("{}... [truncated, total {} bytes]", &s[..cut], s.len())
}
