use std::fmt;

/// Whether a notification belongs to a live or a test-mode event.
///
/// Derived per event from Stripe's `livemode` flag and passed explicitly to
/// every notification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMode {
    #[default]
    Live,
    Test,
}

impl DeliveryMode {
    pub fn from_livemode(livemode: bool) -> Self {
        if livemode {
            DeliveryMode::Live
        } else {
            DeliveryMode::Test
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Live => "live",
            DeliveryMode::Test => "test",
        }
    }

    pub fn is_test(&self) -> bool {
        matches!(self, DeliveryMode::Test)
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
