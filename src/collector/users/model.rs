//! Facts gathered by the users collector and their byte layouts.

use std::fmt;

use crate::codec::{put_len, put_str, put_varint, take_str, take_varint};
use crate::collector::item::{CollectibleItem, CollectibleKind};
use crate::collector::Collectible;
use crate::error::{EncodingError, FormatError};

/// An account: `VarInt(uid) VarInt(len) name VarInt(n) VarInt(gid)*n`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub uid: u64,
    pub name: String,
    /// Group ids, primary group first.
    pub groups: Vec<u64>,
}

impl User {
    pub fn new(uid: u64, name: impl Into<String>, groups: Vec<u64>) -> Self {
        Self {
            uid,
            name: name.into(),
            groups,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.groups.iter().map(u64::to_string).collect();
        write!(
            f,
            "<User: uid={}, name={}, groups={}>",
            self.uid,
            self.name,
            groups.join(",")
        )
    }
}

impl Collectible for User {
    const ELEMENT_NAME: &'static str = "User";
    const KIND: CollectibleKind = CollectibleKind::User;

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        put_varint(buf, self.uid)?;
        put_str(buf, &self.name)?;
        put_len(buf, self.groups.len())?;
        for gid in &self.groups {
            put_varint(buf, *gid)?;
        }
        Ok(())
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, &[u8]), FormatError> {
        let (uid, rest) = take_varint(data)?;
        let (name, rest) = take_str(rest)?;
        let (count, mut rest) = take_varint(rest)?;

        let mut groups = Vec::new();
        for _ in 0..count {
            let (gid, next) = take_varint(rest)?;
            groups.push(gid);
            rest = next;
        }

        Ok((Self { uid, name, groups }, rest))
    }

    fn into_item(self) -> CollectibleItem {
        CollectibleItem::User(self)
    }
}

/// A group: `VarInt(gid) VarInt(len) name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    pub gid: u64,
    pub name: String,
}

impl Group {
    pub fn new(gid: u64, name: impl Into<String>) -> Self {
        Self {
            gid,
            name: name.into(),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Group: gid={}, name={}>", self.gid, self.name)
    }
}

impl Collectible for Group {
    const ELEMENT_NAME: &'static str = "Group";
    const KIND: CollectibleKind = CollectibleKind::Group;

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        put_varint(buf, self.gid)?;
        put_str(buf, &self.name)
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, &[u8]), FormatError> {
        let (gid, rest) = take_varint(data)?;
        let (name, rest) = take_str(rest)?;
        Ok((Self { gid, name }, rest))
    }

    fn into_item(self) -> CollectibleItem {
        CollectibleItem::Group(self)
    }
}

/// A user with administrative rights: `VarInt(uid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sudoer {
    pub uid: u64,
}

impl Sudoer {
    pub fn new(uid: u64) -> Self {
        Self { uid }
    }
}

impl fmt::Display for Sudoer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Sudoer: {}>", self.uid)
    }
}

impl Collectible for Sudoer {
    const ELEMENT_NAME: &'static str = "Sudoer";
    const KIND: CollectibleKind = CollectibleKind::Sudoer;

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        put_varint(buf, self.uid)
    }

    fn from_bytes(data: &[u8]) -> Result<(Self, &[u8]), FormatError> {
        let (uid, rest) = take_varint(data)?;
        Ok((Self { uid }, rest))
    }

    fn into_item(self) -> CollectibleItem {
        CollectibleItem::Sudoer(self)
    }
}
