//! Named values inherited down the frame tree.

use std::fmt;

/// A typed key for a frame context value.
///
/// A value set on a frame is visible to the frame and all its descendants.
/// Children shadow a name by setting it on themselves; an ancestor's entry
/// is never modified from below. Keys are usually declared as statics:
///
/// ```
/// use corral::Context;
///
/// static REQUEST_ID: Context<u64> = Context::new("request-id");
/// ```
pub struct Context<T: 'static> {
    name: &'static str,
    default: Option<fn() -> T>,
}

impl<T: 'static> Context<T> {
    /// A key with no default value.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            default: None,
        }
    }

    /// A key that falls back to `default()` when no frame in the chain sets it.
    #[must_use]
    pub const fn with_default(name: &'static str, default: fn() -> T) -> Self {
        Self {
            name,
            default: Some(default),
        }
    }

    /// The key's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The fallback value, if the key has one.
    #[must_use]
    pub fn default_value(&self) -> Option<T> {
        self.default.map(|default| default())
    }
}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer() -> u32 {
        42
    }

    #[test]
    fn default_is_computed_per_lookup() {
        static KEY: Context<u32> = Context::with_default("answer", answer);
        static BARE: Context<u32> = Context::new("bare");
        assert_eq!(KEY.name(), "answer");
        assert_eq!(KEY.default_value(), Some(42));
        assert_eq!(BARE.default_value(), None);
    }
}
