use std::collections::HashMap;
use std::rc::Rc;

use crate::entity::{Kind, Uri};

/// The edge kind the store treats as ownership: disposing an entity
/// cascades to everything pointing at it through an incoming edge of
/// this kind.
pub const PARENT_EDGE: &str = "parent";

/// A directed, typed connection between two entities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: Uri,
    pub kind: Kind,
    pub to: Uri,
}

impl Edge {
    pub fn new(from: impl AsRef<str>, kind: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        Self {
            from: Rc::from(from.as_ref()),
            kind: Rc::from(kind.as_ref()),
            to: Rc::from(to.as_ref()),
        }
    }
}

#[derive(Default)]
struct Link {
    prev: Option<Uri>,
    next: Option<Uri>,
}

/// Doubly linked list of `from` URIs sharing one `(to, kind)` target.
///
/// Gives O(1) append/prepend/unlink on edge churn and O(window) ordered
/// walks starting anywhere in the chain, which is what windowed tree
/// UIs iterate with.
#[derive(Default)]
pub(crate) struct SiblingChain {
    head: Option<Uri>,
    tail: Option<Uri>,
    links: HashMap<Uri, Link>,
}

impl SiblingChain {
    pub(crate) fn contains(&self, uri: &str) -> bool {
        self.links.contains_key(uri)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub(crate) fn push_back(&mut self, uri: Uri) {
        if self.contains(&uri) {
            return;
        }
        let link = Link {
            prev: self.tail.clone(),
            next: None,
        };
        if let Some(tail) = &self.tail {
            if let Some(tail_link) = self.links.get_mut(tail) {
                tail_link.next = Some(uri.clone());
            }
        } else {
            self.head = Some(uri.clone());
        }
        self.tail = Some(uri.clone());
        self.links.insert(uri, link);
    }

    pub(crate) fn push_front(&mut self, uri: Uri) {
        if self.contains(&uri) {
            return;
        }
        let link = Link {
            prev: None,
            next: self.head.clone(),
        };
        if let Some(head) = &self.head {
            if let Some(head_link) = self.links.get_mut(head) {
                head_link.prev = Some(uri.clone());
            }
        } else {
            self.tail = Some(uri.clone());
        }
        self.head = Some(uri.clone());
        self.links.insert(uri, link);
    }

    pub(crate) fn unlink(&mut self, uri: &str) -> bool {
        let Some(link) = self.links.remove(uri) else {
            return false;
        };
        match &link.prev {
            Some(prev) => {
                if let Some(prev_link) = self.links.get_mut(prev) {
                    prev_link.next = link.next.clone();
                }
            }
            None => self.head = link.next.clone(),
        }
        match &link.next {
            Some(next) => {
                if let Some(next_link) = self.links.get_mut(next) {
                    next_link.prev = link.prev.clone();
                }
            }
            None => self.tail = link.prev.clone(),
        }
        true
    }

    /// Head-to-tail order.
    pub(crate) fn iter(&self) -> Vec<Uri> {
        let mut out = Vec::with_capacity(self.links.len());
        let mut cursor = self.head.clone();
        while let Some(uri) = cursor {
            cursor = self.links.get(&uri).and_then(|l| l.next.clone());
            out.push(uri);
        }
        out
    }

    /// Ordered walk from `start` (inclusive or not), forward toward the
    /// tail or backward toward the head. Unknown starts yield nothing.
    pub(crate) fn walk_from(&self, start: &str, inclusive: bool, forward: bool) -> Vec<Uri> {
        let Some((start_uri, _)) = self.links.get_key_value(start) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = Some(start_uri.clone());
        let mut first = true;
        while let Some(uri) = cursor {
            let link = self.links.get(&uri);
            cursor = link.and_then(|l| {
                if forward {
                    l.next.clone()
                } else {
                    l.prev.clone()
                }
            });
            if !first || inclusive {
                out.push(uri);
            }
            first = false;
        }
        out
    }
}
