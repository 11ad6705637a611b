//! ID generation utilities for webpilot
//!
//! Provides functions for generating identifiers for task runs and
//! interaction requests.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique task run ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2`
pub fn generate_task_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{:04x}", timestamp, random)
}

/// Generate an interaction request ID
///
/// Format: `req_{random_hex}` with 16 hex digits
pub fn generate_request_id() -> String {
    let random: u64 = rand::rng().random();
    format!("req_{:016x}", random)
}

/// Generate a mailbox command ID
///
/// Format: `cmd-{timestamp_ms}-{random_hex}`
pub fn generate_command_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("cmd-{}-{:04x}", timestamp, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_task_id_format() {
        let id = generate_task_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_request_id_format() {
        let id = generate_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 4 + 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_request_id_uniqueness() {
        let ids: std::collections::HashSet<String> = (0..100).map(|_| generate_request_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_generate_command_id_format() {
        let id = generate_command_id();
        assert!(id.starts_with("cmd-"));
        assert_eq!(id.split('-').count(), 3);
    }
}
