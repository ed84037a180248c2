//! Closed set of collectible facts known to the system.
//!
//! `CollectibleItem` lets diff elements and reports hold any fact without
//! generics, while `CollectibleKind` names a category and drives decoding
//! when the wire format only says "the next bytes are a Group".

use std::fmt;

use crate::collector::Collectible;
use crate::collector::users::{Group, Sudoer, User};
use crate::error::{EncodingError, FormatError};

/// Category of a collected fact. The derived order is the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectibleKind {
    User,
    Group,
    Sudoer,
}

impl CollectibleKind {
    /// Stable element name used in report trees and relational exports.
    pub fn name(self) -> &'static str {
        match self {
            CollectibleKind::User => User::ELEMENT_NAME,
            CollectibleKind::Group => Group::ELEMENT_NAME,
            CollectibleKind::Sudoer => Sudoer::ELEMENT_NAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::User, Self::Group, Self::Sudoer]
            .into_iter()
            .find(|k| k.name() == name)
    }

    /// Decodes one fact of this kind from the front of `data`.
    pub fn decode(self, data: &[u8]) -> Result<(CollectibleItem, &[u8]), FormatError> {
        Ok(match self {
            CollectibleKind::User => {
                let (v, rest) = User::from_bytes(data)?;
                (v.into_item(), rest)
            }
            CollectibleKind::Group => {
                let (v, rest) = Group::from_bytes(data)?;
                (v.into_item(), rest)
            }
            CollectibleKind::Sudoer => {
                let (v, rest) = Sudoer::from_bytes(data)?;
                (v.into_item(), rest)
            }
        })
    }
}

impl fmt::Display for CollectibleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectibleItem {
    User(User),
    Group(Group),
    Sudoer(Sudoer),
}

impl CollectibleItem {
    pub fn kind(&self) -> CollectibleKind {
        match self {
            CollectibleItem::User(_) => CollectibleKind::User,
            CollectibleItem::Group(_) => CollectibleKind::Group,
            CollectibleItem::Sudoer(_) => CollectibleKind::Sudoer,
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            CollectibleItem::User(v) => v.encode_into(buf),
            CollectibleItem::Group(v) => v.encode_into(buf),
            CollectibleItem::Sudoer(v) => v.encode_into(buf),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Display for CollectibleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectibleItem::User(v) => write!(f, "{v}"),
            CollectibleItem::Group(v) => write!(f, "{v}"),
            CollectibleItem::Sudoer(v) => write!(f, "{v}"),
        }
    }
}

impl From<User> for CollectibleItem {
    fn from(v: User) -> Self {
        CollectibleItem::User(v)
    }
}

impl From<Group> for CollectibleItem {
    fn from(v: Group) -> Self {
        CollectibleItem::Group(v)
    }
}

impl From<Sudoer> for CollectibleItem {
    fn from(v: Sudoer) -> Self {
        CollectibleItem::Sudoer(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(CollectibleKind::User.name(), "User");
        assert_eq!(CollectibleKind::Group.name(), "Group");
        assert_eq!(CollectibleKind::Sudoer.name(), "Sudoer");
        assert_eq!(CollectibleKind::from_name("Sudoer"), Some(CollectibleKind::Sudoer));
        assert_eq!(CollectibleKind::from_name("Process"), None);
    }

    #[test]
    fn test_decode_dispatches_on_kind() {
        let item: CollectibleItem = Group::new(27, "sudo").into();
        let mut bytes = item.to_bytes().unwrap();
        bytes.push(0xAA);

        let (decoded, rest) = CollectibleKind::Group.decode(&bytes).unwrap();
        assert_eq!(decoded, item);
        assert_eq!(decoded.kind(), CollectibleKind::Group);
        assert_eq!(rest, &[0xAA]);
    }
}
