//! Event intervals
//!
//! Walks the forest bottom-up in height order and yields, for every interval
//! between consecutive node heights, the branches crossing it. The last
//! interval is unbounded above. The branches are lent from the walker and
//! stay valid until it advances.
//!

use super::node::Parent;
use super::store::NodeStore;

/// A branch crossing an interval, keyed by the height of its upper end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contemporary {
    pub parent_height: f64,
    pub branch: usize,
}

impl Contemporary {
    fn precedes(&self, other: &Contemporary) -> bool {
        self.parent_height < other.parent_height
            || (self.parent_height == other.parent_height && self.branch < other.branch)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    /// Node whose height opens the interval.
    pub node: usize,
    pub start: f64,
    pub end: f64,
}

/// Binary min-heap over a plain vector.
///
/// The array order after every push and pop is part of the sampling result,
/// since targets are drawn by position. Sift-up and sift-down follow the
/// classic array heap: a pop moves the last item to the top, walks it down
/// along the smaller children to a leaf and then back up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContemporaryHeap {
    items: Vec<Contemporary>,
}

impl ContemporaryHeap {
    pub fn as_slice(&self) -> &[Contemporary] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn peek(&self) -> Option<&Contemporary> {
        self.items.first()
    }

    pub fn push(&mut self, item: Contemporary) {
        self.items.push(item);
        let last = self.items.len() - 1;
        self.sift_down(0, last);
    }

    pub fn pop(&mut self) -> Option<Contemporary> {
        let last = self.items.pop()?;
        if self.items.is_empty() {
            return Some(last);
        }
        let top = std::mem::replace(&mut self.items[0], last);
        self.sift_up(0);
        Some(top)
    }

    /// Moves the item at `pos` towards `start` while it precedes its parent.
    fn sift_down(&mut self, start: usize, mut pos: usize) {
        let item = self.items[pos];
        while pos > start {
            let parent_pos = (pos - 1) >> 1;
            let parent = self.items[parent_pos];
            if item.precedes(&parent) {
                self.items[pos] = parent;
                pos = parent_pos;
                continue;
            }
            break;
        }
        self.items[pos] = item;
    }

    /// Moves the item at `pos` down to a leaf along the smaller children,
    /// then back up into place.
    fn sift_up(&mut self, mut pos: usize) {
        let end = self.items.len();
        let start = pos;
        let item = self.items[pos];
        let mut child_pos = 2 * pos + 1;
        while child_pos < end {
            let right_pos = child_pos + 1;
            if right_pos < end && !self.items[child_pos].precedes(&self.items[right_pos]) {
                child_pos = right_pos;
            }
            self.items[pos] = self.items[child_pos];
            pos = child_pos;
            child_pos = 2 * pos + 1;
        }
        self.items[pos] = item;
        self.sift_down(start, pos);
    }
}

pub struct EventIterator<'a> {
    store: &'a NodeStore,
    pending: Option<usize>,
    contemporaries: ContemporaryHeap,
}

impl<'a> EventIterator<'a> {
    pub fn new(store: &'a NodeStore) -> Self {
        Self {
            store,
            pending: store.next_used(0),
            contemporaries: ContemporaryHeap::default(),
        }
    }

    /// Advances to the next interval of positive length.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            let node = self.pending?;
            self.pending = self.store.next_used(node + 1);
            let start = self.store.height(node);

            if let Parent::Node(parent) = self.store.parent(node) {
                self.contemporaries.push(Contemporary {
                    parent_height: self.store.height(parent),
                    branch: node,
                });
            }
            while self
                .contemporaries
                .peek()
                .is_some_and(|top| top.parent_height <= start)
            {
                self.contemporaries.pop();
            }

            let end = match self.pending {
                None => f64::INFINITY,
                Some(next) => self.store.height(next),
            };
            // zero length intervals are skipped
            if end > start {
                return Some(Event { node, start, end });
            }
        }
    }

    /// Branches crossing the current interval, in heap order.
    pub fn contemporaries(&self) -> &[Contemporary] {
        self.contemporaries.as_slice()
    }
}
