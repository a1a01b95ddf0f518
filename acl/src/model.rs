// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Data types for permissions and roles.

use iii_iv_core::model::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of grantee, resource and role identifiers.
const MAX_NAME_LENGTH: usize = 256;

/// Validates that `s`, which represents a `what`, is a valid identifier.
fn validate_name(what: &str, s: &str) -> ModelResult<()> {
    if s.is_empty() {
        return Err(ModelError(format!("{} cannot be empty", what)));
    }
    if s.len() > MAX_NAME_LENGTH {
        return Err(ModelError(format!("{} is too long", what)));
    }
    if s.chars().any(char::is_control) {
        return Err(ModelError(format!("{} cannot contain control characters", what)));
    }
    Ok(())
}

/// Generates a validated string wrapper type.
macro_rules! name_type [
    ( $name:ident, $what:expr, $doc:expr ) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from an untrusted string `s`, making sure it is valid.
            pub fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
                let s = s.into();
                validate_name($what, &s)?;
                Ok(Self(s))
            }

            /// Returns a string view of the identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ModelError;

            fn try_from(value: String) -> ModelResult<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        #[cfg(any(test, feature = "testutils"))]
        impl From<&'static str> for $name {
            fn from(value: &'static str) -> Self {
                Self::new(value).expect("Hardcoded identifiers must be valid")
            }
        }
    };
];

name_type!(Grantee, "Grantee", "The principal that receives a permission: a user or a role.");
name_type!(Resource, "Resource", "The thing a permission protects.");
name_type!(RoleName, "Role name", "The name of a role.");

impl Grantee {
    /// Prefix of the grantees that stand for all members of a role.
    ///
    /// Usernames cannot contain a colon, so role grantees never collide with user grantees.
    pub const ROLE_PREFIX: &'static str = "role:";

    /// Returns the name of the role this grantee stands for, if it is a role.
    pub fn role(&self) -> Option<&str> {
        self.0.strip_prefix(Self::ROLE_PREFIX)
    }
}

impl From<RoleName> for Grantee {
    fn from(role: RoleName) -> Self {
        Self(format!("{}{}", Self::ROLE_PREFIX, role.0))
    }
}

impl From<&iii_iv_core::model::Username> for Grantee {
    fn from(username: &iii_iv_core::model::Username) -> Self {
        Self(username.as_str().to_owned())
    }
}

/// Operations that can be granted on a resource.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Allows fetching the resource.
    Read,

    /// Allows modifying or deleting the resource.
    Write,
}

impl Action {
    /// Returns the textual representation of the action as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "READ",
            Action::Write => "WRITE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "READ" => Ok(Action::Read),
            "WRITE" => Ok(Action::Write),
            _ => Err(ModelError(format!("Unknown action '{}'", s))),
        }
    }
}

/// A grant of `action` on `resource` to `grantee`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Permission {
    /// Who receives the permission.
    pub grantee: Grantee,

    /// What the permission protects.
    pub resource: Resource,

    /// What the grantee can do on the resource.
    pub action: Action,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_ok() {
        assert_eq!("notes/1", Resource::new("notes/1").unwrap().as_str());
        assert_eq!("admins", RoleName::new("admins").unwrap().to_string());
    }

    #[test]
    fn test_name_errors() {
        assert_eq!(
            ModelError("Grantee cannot be empty".to_owned()),
            Grantee::new("").unwrap_err()
        );
        assert_eq!(
            ModelError("Resource is too long".to_owned()),
            Resource::new("x".repeat(MAX_NAME_LENGTH + 1)).unwrap_err()
        );
        assert_eq!(
            ModelError("Role name cannot contain control characters".to_owned()),
            RoleName::new("a\nb").unwrap_err()
        );
    }

    #[test]
    fn test_grantee_from_role_is_distinct_from_user() {
        let role = Grantee::from(RoleName::from("admins"));
        assert_eq!("role:admins", role.as_str());
        assert_eq!(Some("admins"), role.role());

        let user = Grantee::from(&iii_iv_core::model::Username::new("admins").unwrap());
        assert_ne!(role, user);
        assert_eq!(None, user.role());
    }

    #[test]
    fn test_name_deserialize_validates() {
        assert!(serde_json::from_str::<Grantee>("\"someone\"").is_ok());
        let err = serde_json::from_str::<Grantee>("\"\"").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_action_round_trip() {
        for action in [Action::Read, Action::Write] {
            assert_eq!(action, Action::from_str(action.as_str()).unwrap());
            assert_eq!(format!("\"{}\"", action), serde_json::to_string(&action).unwrap());
        }
        assert_eq!(
            ModelError("Unknown action 'read'".to_owned()),
            Action::from_str("read").unwrap_err()
        );
    }
}
