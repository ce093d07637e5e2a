//! Session configuration and resource limits
//!
//! [`SessionOptions`] bounds what a validation session may retain between
//! documents and when a document is abandoned.

use crate::error::{Error, Result};

/// Default number of dense NameID slots
pub const DEFAULT_NAME_DENSE_THRESHOLD: usize = 4096;

/// Default arena high-watermark in bytes
pub const DEFAULT_ARENA_HIGH_WATERMARK: usize = 1024 * 1024;

/// Default cap on `expected` entries in a diagnostic
pub const DEFAULT_MAX_EXPECTED: usize = 32;

/// Per-session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Fatal threshold on recorded validation errors (0 = unlimited)
    pub max_errors: usize,

    /// NameIDs below this value use dense slots; the rest use a map
    pub name_dense_threshold: usize,

    /// Arenas with capacity above this are released on reset
    pub arena_high_watermark: usize,

    /// ID tables larger than this are dropped rather than cleared on reset
    pub id_table_threshold: usize,

    /// Maximum number of `expected` entries per diagnostic
    pub max_expected: usize,

    /// Maximum element nesting depth
    pub max_depth: usize,

    /// Whether ID / IDREF values are tracked
    pub track_ids: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_errors: 0,
            name_dense_threshold: DEFAULT_NAME_DENSE_THRESHOLD,
            arena_high_watermark: DEFAULT_ARENA_HIGH_WATERMARK,
            id_table_threshold: 4096,
            max_expected: DEFAULT_MAX_EXPECTED,
            max_depth: 4096,
            track_ids: true,
        }
    }
}

impl SessionOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for untrusted input: stop early, retain little
    pub fn strict() -> Self {
        Self {
            max_errors: 100,
            name_dense_threshold: 1024,
            arena_high_watermark: 256 * 1024,
            id_table_threshold: 1024,
            max_expected: 16,
            max_depth: 256,
            track_ids: true,
        }
    }

    /// Options for large trusted documents (use with caution)
    pub fn permissive() -> Self {
        Self {
            max_errors: 0,
            name_dense_threshold: 65536,
            arena_high_watermark: 64 * 1024 * 1024,
            id_table_threshold: 1 << 20,
            max_expected: 64,
            max_depth: 65536,
            track_ids: true,
        }
    }

    /// Set the fatal error threshold
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Set the arena high-watermark
    pub fn with_arena_high_watermark(mut self, bytes: usize) -> Self {
        self.arena_high_watermark = bytes;
        self
    }

    /// Enable or disable ID tracking
    pub fn with_id_tracking(mut self, track: bool) -> Self {
        self.track_ids = track;
        self
    }

    /// Check whether `count` recorded errors exceed the threshold
    pub fn check_errors(&self, count: usize) -> Result<()> {
        if self.max_errors != 0 && count > self.max_errors {
            Err(Error::TooManyErrors(count))
        } else {
            Ok(())
        }
    }

    /// Check if element depth is within limits
    pub fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            Err(Error::State(format!(
                "element depth {} exceeds maximum {}",
                depth, self.max_depth
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = SessionOptions::default();
        assert_eq!(opts.name_dense_threshold, 4096);
        assert_eq!(opts.max_expected, 32);
        assert!(opts.check_errors(1_000_000).is_ok());
    }

    #[test]
    fn test_strict_options() {
        let opts = SessionOptions::strict();
        assert!(opts.max_depth < SessionOptions::default().max_depth);
        assert!(opts.check_errors(100).is_ok());
        assert_eq!(opts.check_errors(101), Err(Error::TooManyErrors(101)));
    }

    #[test]
    fn test_permissive_options() {
        let opts = SessionOptions::permissive();
        assert!(opts.arena_high_watermark > SessionOptions::default().arena_high_watermark);
        assert!(opts.check_depth(5000).is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let opts = SessionOptions::new().with_max_errors(2).with_id_tracking(false);
        assert!(!opts.track_ids);
        assert!(opts.check_errors(3).is_err());
    }
}
