//! Identity types for the patch graph.
//!
//! `ObjectId`s are handed out from a process-wide counter so an id is never
//! reused, even after the patch that owned it was torn down. Since the counter
//! only grows, ordering by id is the same as ordering by creation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_OBJECT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifier of a live patch object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub const INVALID: ObjectId = ObjectId(0);

    /// Allocate the next process-unique id.
    ///
    /// # Panics
    ///
    /// Panics when the 32-bit id space is exhausted. Ids are never recycled,
    /// so this is a hard limit on objects created per process.
    pub fn next() -> Self {
        let id = NEXT_OBJECT_ID
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
            .unwrap_or_else(|_| panic!("object id space exhausted"));
        ObjectId(id)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ObjectId(INVALID)")
        } else {
            write!(f, "ObjectId({})", self.0)
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a link in the graph's link table. Unique per graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub u32);

impl LinkId {
    pub const INVALID: LinkId = LinkId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "LinkId(INVALID)")
        } else {
            write!(f, "LinkId({})", self.0)
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link {}", self.0)
    }
}
