// File: src/api/ids.rs

//! Identifier types for backend entities.
//!
//! The backend hands out integer primary keys. Each entity gets its own
//! newtype so a session id can never be passed where a message id is expected.

use core::fmt;
use core::num::ParseIntError;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declare an integer newtype with a consistent API.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw backend key.
            #[inline]
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Extract the raw backend key.
            #[inline]
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            #[inline]
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

define_numeric_id!(
    /// User account identifier.
    UserId
);

define_numeric_id!(
    /// Identifier of a conversation session.
    SessionId
);

define_numeric_id!(
    /// Identifier of a persisted message.
    MessageId
);

define_numeric_id!(
    /// Identifier of a batch image analysis job.
    AnalysisId
);

define_numeric_id!(
    /// Identifier of a single image result inside a batch analysis.
    AnalysisResultId
);

impl MessageId {
    /// Sentinel id carried by the in-flight streaming draft.
    ///
    /// The backend never issues negative keys.
    pub const DRAFT: Self = Self(-1);

    /// Whether this id is the draft sentinel.
    #[must_use]
    pub const fn is_draft(self) -> bool {
        self.0 == Self::DRAFT.0
    }
}
