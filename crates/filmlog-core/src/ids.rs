use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(PostId, "post");
branded_id!(InquiryId, "inq");
// Principals are normally issued by the auth provider; `new()` is for local providers.
branded_id!(PrincipalId, "usr");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_id_has_prefix() {
        let id = PostId::new();
        assert!(id.as_str().starts_with("post_"), "got: {id}");
    }

    #[test]
    fn inquiry_id_has_prefix() {
        let id = InquiryId::new();
        assert!(id.as_str().starts_with("inq_"), "got: {id}");
    }

    #[test]
    fn ids_are_unique() {
        let a = PostId::new();
        let b = PostId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn principal_from_provider_is_kept_verbatim() {
        let id = PrincipalId::from_raw("4f1c2a9e-uid");
        assert_eq!(id.as_str(), "4f1c2a9e-uid");
        assert_eq!(id.to_string(), "4f1c2a9e-uid");
    }

    #[test]
    fn serde_is_transparent() {
        let id = PostId::from_raw("post_abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"post_abc\"");
        let parsed: PostId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn monotonic_ordering() {
        let ids: Vec<PostId> = (0..50).map(|_| PostId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1], "not monotonic: {} >= {}", w[0], w[1]);
        }
    }
}
