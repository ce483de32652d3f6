//! Identifier newtypes.
//!
//! Stream, session and client ids are all plain strings on the wire but
//! distinct types here. Only [`StreamId`] is minted locally; session and
//! client ids always come from the server.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random suffix in generated stream IDs.
const STREAM_ID_SUFFIX_LEN: usize = 9;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the id.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Client-generated identifier for one streamed LLM response.
    StreamId
}

branded_id! {
    /// Server-assigned identifier for a long-running backend session.
    SessionId
}

branded_id! {
    /// Server-assigned identifier for this client's connection.
    ClientId
}

impl StreamId {
    /// Generate a new stream ID: `stream_<unix-millis>_<9 base36 chars>`.
    ///
    /// The timestamp orders IDs roughly by creation; the random suffix makes
    /// collisions between IDs created in the same millisecond negligible.
    #[must_use]
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::rng();
        let suffix: String = (0..STREAM_ID_SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
            .collect();
        Self(format!("stream_{millis}_{suffix}"))
    }
}
