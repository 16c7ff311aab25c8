use serde::{Deserialize, Serialize};

/// Result of a single presence probe. Recomputed on every call, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderPresence {
    pub connected: bool,
    pub reader: String,
    pub message: String,
    pub has_card: bool,
}

impl ReaderPresence {
    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            reader: String::new(),
            message: message.into(),
            has_card: false,
        }
    }

    pub(crate) fn waiting(reader: String) -> Self {
        Self {
            connected: true,
            reader,
            message: "Reader ready - waiting for MyKad".to_string(),
            has_card: false,
        }
    }

    pub(crate) fn card_ready(reader: String) -> Self {
        Self {
            connected: true,
            reader,
            message: "MyKad detected and ready to read".to_string(),
            has_card: true,
        }
    }
}
