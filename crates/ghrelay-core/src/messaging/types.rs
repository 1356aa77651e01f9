use std::time::Duration;

/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}

/// True when a channel error text signals throttling ("Too Many Requests").
pub fn is_too_many_requests(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("too many requests") || lower.contains("retry after")
}

/// Extract the retry delay from a throttling error text.
///
/// Accepts `retry after 30`, `retry-after: 30`, `retry_after=30` and the
/// Bot API JSON shape `"retry_after":30` (seconds).
pub fn parse_retry_after(text: &str) -> Option<Duration> {
    let lower = text.to_ascii_lowercase();
    for marker in ["retry after", "retry-after", "retry_after"] {
        let Some(pos) = lower.find(marker) else {
            continue;
        };
        let rest = lower[pos + marker.len()..].trim_start_matches([' ', ':', '=', '"']);
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(secs) = digits.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
    }
    None
}
