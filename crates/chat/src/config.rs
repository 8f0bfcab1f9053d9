use serde::Deserialize;

/// Tuning knobs for the chat subsystem, embedded in the host's config.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Attempts to fetch a peer's public key before giving up. Default: 2
    #[serde(default = "default_peer_key_retries")]
    pub peer_key_retries: u32,
    /// Delay between peer key fetch attempts, in milliseconds. Default: 1000
    #[serde(default = "default_peer_key_retry_delay_ms")]
    pub peer_key_retry_delay_ms: u64,
    /// Capacity of the derived conversation key cache. Default: 256
    #[serde(default = "default_cache_capacity")]
    pub key_cache_capacity: usize,
    /// Capacity of the peer public key cache. Default: 256
    #[serde(default = "default_cache_capacity")]
    pub peer_cache_capacity: usize,
    /// Capacity of the conversation salt cache. Default: 256
    #[serde(default = "default_cache_capacity")]
    pub salt_cache_capacity: usize,
}

fn default_peer_key_retries() -> u32 {
    2
}
fn default_peer_key_retry_delay_ms() -> u64 {
    1000
}
fn default_cache_capacity() -> usize {
    256
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            peer_key_retries: default_peer_key_retries(),
            peer_key_retry_delay_ms: default_peer_key_retry_delay_ms(),
            key_cache_capacity: default_cache_capacity(),
            peer_cache_capacity: default_cache_capacity(),
            salt_cache_capacity: default_cache_capacity(),
        }
    }
}

impl ChatConfig {
    pub fn peer_key_retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.peer_key_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ChatConfig::default();
        assert_eq!(config.peer_key_retries, 2);
        assert_eq!(config.peer_key_retry_delay_ms, 1000);
        assert_eq!(config.key_cache_capacity, 256);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: ChatConfig = serde_json::from_str(r#"{"peer_key_retries": 5}"#).unwrap();
        assert_eq!(config.peer_key_retries, 5);
        assert_eq!(config.peer_key_retry_delay_ms, 1000);
    }
}
