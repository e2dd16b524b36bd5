use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a stage in the production line.
    pub struct StageId;
}

/// Identifies a token. Basic tokens carry a short random alphanumeric id;
/// composites carry `"{first}+{second}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl TokenId {
    /// Length of a freshly generated basic token id.
    pub const LEN: usize = 6;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the composite built from `first` and `second`.
    pub fn composite(first: &TokenId, second: &TokenId) -> Self {
        Self(format!("{}+{}", first.0, second.0))
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
