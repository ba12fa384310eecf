// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions
//!
//! All generated identifiers are 21 characters from the URL-safe alphabet
//! `[A-Za-z0-9_-]`, with the first and last character restricted to
//! `[A-Za-z0-9]` so the IDs survive being embedded in hostnames, object
//! keys, and shell-adjacent contexts.

/// Byte length of a generated ID.
pub const ID_LEN: usize = 21;

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Generate a fresh 21-character identifier.
///
/// Regenerates until the boundary characters are alphanumeric; the URL-safe
/// alphabet makes a retry rare (two chars out of 64 per boundary).
pub fn generate_id() -> String {
    loop {
        let id = nanoid::nanoid!(ID_LEN);
        let bytes = id.as_bytes();
        let first = bytes.first().copied().unwrap_or(b'-');
        let last = bytes.last().copied().unwrap_or(b'-');
        if first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric() {
            return id;
        }
    }
}

/// Fixed-size inline ID buffer. Always ≤ 21 ASCII bytes, `Copy`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdBuf {
    len: u8,
    buf: [u8; ID_LEN],
}

impl std::hash::Hash for IdBuf {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash only the active bytes so it matches str::hash,
        // which is required for Borrow<str> HashMap lookups.
        self.as_str().hash(state);
    }
}

impl IdBuf {
    pub const fn empty() -> Self {
        Self { len: 0, buf: [0; ID_LEN] }
    }

    pub fn new(s: &str) -> Self {
        debug_assert!(
            s.len() <= ID_LEN,
            "ID exceeds {} bytes ({} bytes): {:?}",
            ID_LEN,
            s.len(),
            s,
        );
        let len = s.len().min(ID_LEN);
        let mut buf = [0u8; ID_LEN];
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self { len: len as u8, buf }
    }

    pub fn as_str(&self) -> &str {
        // Invariant: only constructed from &str, always valid UTF-8.
        std::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::borrow::Borrow<str> for IdBuf {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Debug for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl serde::Serialize for IdBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for IdBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.len() > ID_LEN {
            return Err(serde::de::Error::custom(format!(
                "ID exceeds {} bytes: {:?}",
                ID_LEN, s
            )));
        }
        Ok(IdBuf::new(&s))
    }
}

/// Define a newtype ID wrapper around [`IdBuf`].
///
/// Generates `new()` for random ID generation, `from_string()` for parsing,
/// `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, `Borrow<str>`, and `Deref`
/// implementations. Generated IDs are 21 characters (see [`generate_id`]).
///
/// ```ignore
/// define_id! {
///     /// Doc comment for the ID type.
///     pub struct SessionId;
/// }
/// ```
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $crate::id::IdBuf);

        impl $name {
            /// Generate a new random ID
            pub fn new() -> Self {
                Self($crate::id::IdBuf::new(&$crate::id::generate_id()))
            }

            /// Create ID from existing string (for parsing/deserialization)
            pub fn from_string(id: impl AsRef<str>) -> Self {
                Self($crate::id::IdBuf::new(id.as_ref()))
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                $crate::id::short(self.0.as_str(), n)
            }

            /// Returns true if the ID is an empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_string(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_string(s)
            }
        }

        impl From<&String> for $name {
            fn from(s: &String) -> Self {
                Self::from_string(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0.as_str() == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0.as_str() == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                self.0.as_str()
            }
        }
    };
}

define_id! {
    /// Identifier of a logical session (groups files and interpreter state).
    pub struct SessionId;
}

define_id! {
    /// Identifier of a stored file within a session.
    pub struct FileId;
}

define_id! {
    /// Identifier of a single code execution.
    pub struct ExecutionId;
}

define_id! {
    /// Identifier attached to an HTTP request for tracing and error reports.
    pub struct RequestId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
