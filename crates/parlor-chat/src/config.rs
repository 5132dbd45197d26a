use tracing::warn;

/// Tunables for the chat layer.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// How many recent messages a live message feed carries by default.
    pub message_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { message_window: 50 }
    }
}

impl ChatConfig {
    /// Read overrides from the environment, keeping defaults for anything
    /// unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("PARLOR_MESSAGE_WINDOW") {
            config.apply_message_window(&raw);
        }
        config
    }

    /// Apply a raw window override; anything that does not parse to a
    /// positive integer is warned about and the current value kept.
    fn apply_message_window(&mut self, raw: &str) {
        match raw.parse::<usize>() {
            Ok(window) if window > 0 => self.message_window = window,
            _ => warn!(
                value = %raw,
                "ignoring invalid PARLOR_MESSAGE_WINDOW, keeping {}",
                self.message_window
            ),
        }
    }
}
