//! Permission flags.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A single permission on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Read the resource and its descendants.
    Read,
    /// Modify the resource and its descendants.
    Write,
    /// Manage the policy governing the resource.
    Administrate,
}

impl Permission {
    /// All permissions, in declaration order.
    pub const ALL: [Permission; 3] = [
        Permission::Read,
        Permission::Write,
        Permission::Administrate,
    ];
}

impl From<Permission> for Permissions {
    fn from(p: Permission) -> Self {
        match p {
            Permission::Read => Permissions::READ,
            Permission::Write => Permissions::WRITE,
            Permission::Administrate => Permissions::ADMINISTRATE,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Administrate => "ADMINISTRATE",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// A set of [`Permission`]s, stored as bit flags so grant/revoke
    /// bookkeeping stays a pair of integer operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permissions: u8 {
        const READ         = 0b001;
        const WRITE        = 0b010;
        const ADMINISTRATE = 0b100;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::empty()
    }
}

impl Permissions {
    /// Whether this set grants the single permission.
    pub fn grants(&self, permission: Permission) -> bool {
        self.contains(permission.into())
    }

    /// The individual permissions present in this set.
    pub fn each(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL
            .iter()
            .copied()
            .filter(move |p| self.grants(*p))
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Permissions::empty(), |acc, p| acc | p.into())
    }
}
