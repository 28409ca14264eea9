use derive_more::Display;

/// Link from a node slot to the node above it.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum Parent {
    /// Unused slot.
    #[default]
    #[display("-")]
    Empty,
    /// Used node without a parent.
    #[display("root")]
    Root,
    /// Used node below node `_0`.
    #[display("{_0}")]
    Node(usize),
}

impl Parent {
    pub fn is_used(&self) -> bool {
        !matches!(self, Parent::Empty)
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Parent::Root)
    }

    /// Index of the parent node, if there is one.
    pub fn node(&self) -> Option<usize> {
        match self {
            Parent::Node(idx) => Some(*idx),
            _ => None,
        }
    }
}

/// Relation of a node to the local tree.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, PartialOrd, Ord)]
pub enum TreeStatus {
    /// Not ancestral to any sample at the current position.
    #[default]
    #[display("0")]
    Disjoint,
    /// Ancestral to all samples: the local MRCA and the nodes above it.
    #[display("1")]
    Ancestral,
    /// The branch above the node belongs to the local tree.
    #[display("2")]
    Local,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_accessors() {
        assert!(!Parent::Empty.is_used());
        assert!(Parent::Root.is_used());
        assert!(Parent::Root.is_root());
        assert_eq!(Parent::Node(4).node(), Some(4));
        assert_eq!(Parent::Root.node(), None);
        assert_eq!(Parent::Node(4).to_string(), "4");
        assert_eq!(Parent::Root.to_string(), "root");
    }

    #[test]
    fn status_codes() {
        assert_eq!(TreeStatus::default(), TreeStatus::Disjoint);
        assert_eq!(TreeStatus::Local.to_string(), "2");
        assert!(TreeStatus::Ancestral > TreeStatus::Disjoint);
    }
}
