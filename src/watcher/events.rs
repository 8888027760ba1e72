//! Raw filesystem events and their classification.

#![allow(clippy::missing_const_for_fn)]

use std::fmt;
use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// Bitset of low-level operations carried by one notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OpMask(u8);

impl OpMask {
    pub const CREATE: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const REMOVE: Self = Self(1 << 2);
    pub const RENAME: Self = Self(1 << 3);
    pub const CHMOD: Self = Self(1 << 4);

    /// Mask with no bits set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if the only bit set is chmod.
    #[must_use]
    pub const fn is_chmod_only(self) -> bool {
        self.0 == Self::CHMOD.0
    }
}

impl std::ops::BitOr for OpMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for OpMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OpMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = EventKind::PRIORITY
            .iter()
            .filter(|kind| self.contains(kind.bit()))
            .map(|kind| kind.as_str().to_uppercase())
            .collect::<Vec<_>>();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Canonical event kind used by rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
    Unknown,
}

impl EventKind {
    /// Classification order when several bits are set. Existing rule sets
    /// depend on this order, e.g. write+chmod classifies as write.
    pub const PRIORITY: [Self; 5] = [
        Self::Create,
        Self::Write,
        Self::Remove,
        Self::Rename,
        Self::Chmod,
    ];

    /// Classify an operation mask by the first bit set in priority order.
    #[must_use]
    pub fn classify(op: OpMask) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|kind| op.contains(kind.bit()))
            .unwrap_or(Self::Unknown)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Rename => "rename",
            Self::Chmod => "chmod",
            Self::Unknown => "unknown",
        }
    }

    fn bit(self) -> OpMask {
        match self {
            Self::Create => OpMask::CREATE,
            Self::Write => OpMask::WRITE,
            Self::Remove => OpMask::REMOVE,
            Self::Rename => OpMask::RENAME,
            Self::Chmod => OpMask::CHMOD,
            Self::Unknown => OpMask::empty(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Absolute path of the affected file.
    pub path: PathBuf,
    /// Operations reported for the path.
    pub op: OpMask,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, op: OpMask) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Split a notify event into one raw event per path.
    ///
    /// Access notifications produce nothing. A rename is reported through its
    /// `From` and `To` halves; the combined `Both` notification that follows
    /// them produces nothing so each rename is dispatched once.
    #[must_use]
    pub fn from_notify(event: &notify::Event) -> Vec<Self> {
        use notify::EventKind as Kind;

        let op = match event.kind {
            Kind::Access(_) => return Vec::new(),
            Kind::Create(_) => OpMask::CREATE,
            Kind::Remove(_) => OpMask::REMOVE,
            Kind::Modify(ModifyKind::Metadata(_)) => OpMask::CHMOD,
            Kind::Modify(ModifyKind::Name(RenameMode::To)) => OpMask::CREATE,
            Kind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
            Kind::Modify(ModifyKind::Name(_)) => OpMask::RENAME,
            Kind::Modify(_) => OpMask::WRITE,
            Kind::Any | Kind::Other => OpMask::empty(),
        };

        event
            .paths
            .iter()
            .map(|p| Self::new(p.clone(), op))
            .collect()
    }
}
