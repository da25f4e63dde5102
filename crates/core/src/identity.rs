//! Identity keys used to namespace profiles and cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The namespacing key under which a profile and its cache entry are scoped.
///
/// An unauthenticated session gets the anonymous sentinel, which never
/// collides with any authenticated user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum IdentityKey {
    Anonymous,
    User(String),
}

impl IdentityKey {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    /// Stable, filesystem-safe key for cache storage.
    ///
    /// The mapping is injective: `[a-zA-Z0-9-]` passes through, every other
    /// byte (including `_`, the escape character itself) is hex-escaped, and
    /// the `anon`/`user_` prefixes keep the two variants in disjoint
    /// namespaces. Two distinct identities can never share a storage key.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Anonymous => "anon".to_string(),
            Self::User(id) => {
                let mut key = String::with_capacity(id.len() + 5);
                key.push_str("user_");
                for byte in id.bytes() {
                    match byte {
                        b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => {
                            key.push(byte as char);
                        }
                        other => {
                            key.push('_');
                            key.push_str(&format!("{:02x}", other));
                        }
                    }
                }
                key
            }
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_key_is_disjoint_from_user_keys() {
        assert_eq!(IdentityKey::Anonymous.storage_key(), "anon");
        // A user literally named "anon" must not collide with the sentinel.
        assert_ne!(
            IdentityKey::user("anon").storage_key(),
            IdentityKey::Anonymous.storage_key()
        );
    }

    #[test]
    fn storage_keys_are_injective_for_hostile_ids() {
        let pairs = [
            ("a_b", "a|b"),
            ("user 1", "user-1"),
            ("../../etc", "././etc"),
            ("Ab", "ab"),
        ];
        for (left, right) in pairs {
            assert_ne!(
                IdentityKey::user(left).storage_key(),
                IdentityKey::user(right).storage_key(),
                "{left:?} and {right:?} collided"
            );
        }
    }

    #[test]
    fn storage_key_escapes_path_separators() {
        let key = IdentityKey::user("../evil").storage_key();
        assert!(!key.contains('/'));
        assert!(!key.contains('.'));
    }
}
