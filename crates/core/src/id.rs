// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers.
//!
//! Rows the control plane owns (projects, users, services, requests) are
//! keyed by UUIDs; objects a provider owns (machines, volumes) are keyed by
//! whatever opaque string the provider hands back. Two macros cover the two
//! families.

/// Define a newtype ID over [`uuid::Uuid`].
///
/// Generates `new()` for random v4 generation, `parse()`, `as_uuid()`,
/// `Display` (hyphenated lowercase), `FromStr`, and serde transparency.
///
/// ```ignore
/// define_uuid_id! {
///     /// Doc comment for the ID type.
///     pub struct ProjectId;
/// }
/// ```
#[macro_export]
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Parse from a hyphenated or simple hex string.
            pub fn parse(s: impl AsRef<str>) -> Result<Self, uuid::Error> {
                Ok(Self(uuid::Uuid::parse_str(s.as_ref())?))
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }
    };
}

/// Define a newtype ID over an opaque provider-issued string.
///
/// ```ignore
/// define_opaque_id! {
///     /// Doc comment for the ID type.
///     pub struct MachineId;
/// }
/// ```
#[macro_export]
macro_rules! define_opaque_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

crate::define_uuid_id! {
    /// Unique identifier for a project.
    ///
    /// The preview gateway routes on the first 8 hex characters of this id
    /// (see [`ProjectId::prefix8`]); the store keeps that prefix indexed.
    pub struct ProjectId;
}

impl ProjectId {
    /// First 8 lowercase hex characters of the id, the preview host prefix.
    pub fn prefix8(&self) -> String {
        let simple = self.0.simple().to_string();
        simple.chars().take(8).collect()
    }
}

crate::define_uuid_id! {
    /// Stable user identity extracted from a validated bearer token.
    pub struct UserId;
}

crate::define_uuid_id! {
    /// Unique identifier for an auxiliary infra service.
    pub struct ServiceId;
}

crate::define_uuid_id! {
    /// Per-request correlation id, generated by the auth middleware.
    pub struct RequestId;
}

crate::define_opaque_id! {
    /// Provider-issued machine identifier.
    pub struct MachineId;
}

crate::define_opaque_id! {
    /// Provider-issued volume identifier.
    pub struct VolumeId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
