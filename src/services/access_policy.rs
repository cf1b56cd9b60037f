//! Ownership and visibility rules shared by both protocol front ends.

use crate::models::{actor::Actor, bucket::Bucket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl Permissions {
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Read => self.read,
            Permission::Write => self.write,
            Permission::Delete => self.delete,
        }
    }
}

/// What `actor` may do with `bucket`.
///
/// A public bucket grants write as well as read to every authenticated
/// actor. Delete is always reserved to the owner.
pub fn permissions(actor: &Actor, bucket: &Bucket) -> Permissions {
    let is_owner = actor.id == bucket.owner_id;
    Permissions {
        read: is_owner || bucket.is_public,
        write: is_owner || bucket.is_public,
        delete: is_owner,
    }
}
