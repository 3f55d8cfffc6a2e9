// Copyright 2026 The Matrix.org Foundation C.I.C.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Identifiers of accounts, conversations and contacts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a peer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContactId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContactId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A conversation of an account.
///
/// At most one outbound sharing session exists per path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationPath {
    pub account_id: String,
    pub conversation_id: String,
}

impl ConversationPath {
    pub fn new(account_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), conversation_id: conversation_id.into() }
    }
}

impl fmt::Display for ConversationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.conversation_id)
    }
}

/// The arguments the map view is opened with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationArgs {
    pub account_id: String,
    pub conversation_id: String,
    /// Whether the sharing controls are expanded when the view opens.
    #[serde(default)]
    pub show_controls: bool,
}

impl NavigationArgs {
    pub fn new(
        account_id: impl Into<String>,
        conversation_id: impl Into<String>,
        show_controls: bool,
    ) -> Self {
        Self { account_id: account_id.into(), conversation_id: conversation_id.into(), show_controls }
    }

    pub fn conversation_path(&self) -> ConversationPath {
        ConversationPath::new(self.account_id.clone(), self.conversation_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::{ContactId, ConversationPath, NavigationArgs};

    #[test]
    fn test_navigation_args_deserialization() {
        let args: NavigationArgs = serde_json::from_value(serde_json::json!({
            "account_id": "acc1",
            "conversation_id": "swarm:1234",
        }))
        .unwrap();

        assert!(!args.show_controls);
        assert_eq!(args.conversation_path(), ConversationPath::new("acc1", "swarm:1234"));
    }

    #[test]
    fn test_paths_are_ordered_by_account_first() {
        let a = ConversationPath::new("a", "z");
        let b = ConversationPath::new("b", "a");
        assert!(a < b);
        assert_eq!(a.to_string(), "a/z");
    }

    #[test]
    fn test_contact_id_is_transparent() {
        let id = ContactId::from("bob");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("bob"));
    }
}
