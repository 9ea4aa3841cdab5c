//! Node paths
//!
//! Every error the compiler raises names the node it happened at with a
//! dotted path from the tree root, e.g. `Subnetwork.secondaryRanges[2].range`.

use std::fmt;

/// A segment in a node path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named node (resource, property or attribute)
    Field(String),
    /// An element of a list
    Index(usize),
}

/// Path from the tree root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath {
    segments: Vec<PathSegment>,
}

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Field(name.into())],
        }
    }

    /// A new path extended by a named segment
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Field(name.into()));
        next
    }

    /// A new path extended by an index segment
    pub fn index(&self, i: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Index(i));
        next
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i == 0 => write!(f, "{}", name)?,
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dotted_with_index() {
        let path = NodePath::new("resource")
            .field("nested")
            .field("arrayField")
            .index(2);
        assert_eq!(path.to_string(), "resource.nested.arrayField[2]");
    }

    #[test]
    fn test_root_display() {
        assert_eq!(NodePath::root().to_string(), "<root>");
        assert!(NodePath::root().is_root());
    }
}
