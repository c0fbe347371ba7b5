//! The identifier graph: connected components over link claims plus each
//! record's own identifier clique.
//!
//! This is always a full batch recomputation. A single new edge can merge two
//! large components, so there is no incremental path.

use std::collections::HashMap;

use crate::{
  Orgid,
  record::{IdentifierLink, OrganisationRecord},
};

/// Union-find over interned identifiers.
#[derive(Debug, Default)]
pub struct IdentityGraph {
  index:  HashMap<Orgid, usize>,
  ids:    Vec<Orgid>,
  parent: Vec<usize>,
  rank:   Vec<u8>,
}

impl IdentityGraph {
  pub fn new() -> Self { Self::default() }

  /// Build the graph for a snapshot of live records and links.
  pub fn from_parts(records: &[OrganisationRecord], links: &[IdentifierLink]) -> Self {
    let mut graph = Self::new();
    for record in records {
      graph.add_clique(&record.organisation.org_ids);
      // `org_ids` always holds `org_id` once normalized, but a record with no
      // claims must still own a component.
      graph.add(record.org_id());
    }
    for link in links {
      graph.add_link(&link.org_id_a, &link.org_id_b);
    }
    graph
  }

  /// Register an identifier as a node without connecting it.
  pub fn add(&mut self, id: &Orgid) -> usize {
    if let Some(&i) = self.index.get(id) {
      return i;
    }
    let i = self.ids.len();
    self.index.insert(id.clone(), i);
    self.ids.push(id.clone());
    self.parent.push(i);
    self.rank.push(0);
    i
  }

  pub fn add_link(&mut self, a: &Orgid, b: &Orgid) {
    let a = self.add(a);
    let b = self.add(b);
    self.union(a, b);
  }

  /// Treat every identifier in `ids` as equivalent to every other. A star
  /// around the first element gives the same closure as the full clique.
  pub fn add_clique(&mut self, ids: &[Orgid]) {
    let Some((first, rest)) = ids.split_first() else { return };
    let root = self.add(first);
    for id in rest {
      let other = self.add(id);
      self.union(root, other);
    }
  }

  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }

  fn find(&mut self, mut i: usize) -> usize {
    while self.parent[i] != i {
      self.parent[i] = self.parent[self.parent[i]];
      i = self.parent[i];
    }
    i
  }

  fn union(&mut self, a: usize, b: usize) {
    let (a, b) = (self.find(a), self.find(b));
    if a == b {
      return;
    }
    match self.rank[a].cmp(&self.rank[b]) {
      std::cmp::Ordering::Less => self.parent[a] = b,
      std::cmp::Ordering::Greater => self.parent[b] = a,
      std::cmp::Ordering::Equal => {
        self.parent[b] = a;
        self.rank[a] += 1;
      }
    }
  }

  /// Resolve every node to its component.
  ///
  /// Each component's members are sorted lexicographically and the components
  /// themselves are ordered by their first member, so the result does not
  /// depend on the order edges were added in.
  pub fn components(mut self) -> Components {
    let mut by_root: HashMap<usize, Vec<Orgid>> = HashMap::new();
    for i in 0..self.ids.len() {
      let root = self.find(i);
      by_root.entry(root).or_default().push(self.ids[i].clone());
    }

    let mut groups: Vec<Vec<Orgid>> = by_root
      .into_values()
      .map(|mut members| {
        members.sort();
        members
      })
      .collect();
    groups.sort_by(|a, b| a[0].cmp(&b[0]));

    let mut component_of = HashMap::with_capacity(self.ids.len());
    for (c, members) in groups.iter().enumerate() {
      for id in members {
        component_of.insert(id.clone(), c);
      }
    }

    Components { component_of, groups }
  }
}

/// Index of a component within [`Components`].
pub type ComponentId = usize;

/// The partition of all identifiers into components.
#[derive(Debug, Clone, Default)]
pub struct Components {
  component_of: HashMap<Orgid, ComponentId>,
  groups:       Vec<Vec<Orgid>>,
}

impl Components {
  pub fn component_of(&self, id: &Orgid) -> Option<ComponentId> {
    self.component_of.get(id).copied()
  }

  /// The sorted, de-duplicated identifier list of `id`'s component.
  pub fn linked_orgs(&self, id: &Orgid) -> Option<&[Orgid]> {
    self.component_of(id).map(|c| self.groups[c].as_slice())
  }

  pub fn members(&self, component: ComponentId) -> &[Orgid] { &self.groups[component] }

  pub fn len(&self) -> usize { self.groups.len() }

  pub fn is_empty(&self) -> bool { self.groups.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &[Orgid])> {
    self.groups.iter().enumerate().map(|(c, g)| (c, g.as_slice()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn id(s: &str) -> Orgid { Orgid::parse(s).unwrap() }

  fn ids(list: &[&str]) -> Vec<Orgid> { list.iter().map(|s| id(s)).collect() }

  #[test]
  fn links_connect_transitively() {
    let mut g = IdentityGraph::new();
    g.add_link(&id("XA-A-1"), &id("XB-B-2"));
    g.add_link(&id("XC-C-3"), &id("XB-B-2"));
    g.add_link(&id("XC-C-3"), &id("XD-D-4"));
    g.add(&id("XE-E-5"));

    let c = g.components();
    assert_eq!(c.len(), 2);
    assert_eq!(
      c.linked_orgs(&id("XD-D-4")).unwrap(),
      ids(&["XA-A-1", "XB-B-2", "XC-C-3", "XD-D-4"]).as_slice()
    );
    assert_eq!(c.linked_orgs(&id("XE-E-5")).unwrap(), ids(&["XE-E-5"]).as_slice());
    assert_ne!(c.component_of(&id("XA-A-1")), c.component_of(&id("XE-E-5")));
  }

  #[test]
  fn cliques_merge_with_links() {
    let mut g = IdentityGraph::new();
    g.add_clique(&ids(&["GB-CHC-1", "GB-COH-9"]));
    g.add_clique(&ids(&["GB-EDU-5", "GB-COH-9"]));
    let c = g.components();
    assert_eq!(c.len(), 1);
    assert_eq!(c.members(0), ids(&["GB-CHC-1", "GB-COH-9", "GB-EDU-5"]).as_slice());
  }

  #[test]
  fn result_is_independent_of_insertion_order() {
    let edges = [("XA-A-1", "XB-B-2"), ("XC-C-3", "XD-D-4"), ("XB-B-2", "XF-F-6")];

    let mut forward = IdentityGraph::new();
    for (a, b) in edges {
      forward.add_link(&id(a), &id(b));
    }
    let mut backward = IdentityGraph::new();
    for (a, b) in edges.iter().rev() {
      backward.add_link(&id(b), &id(a));
    }

    let f = forward.components();
    let b = backward.components();
    let f_groups: Vec<_> = f.iter().map(|(_, g)| g.to_vec()).collect();
    let b_groups: Vec<_> = b.iter().map(|(_, g)| g.to_vec()).collect();
    assert_eq!(f_groups, b_groups);
  }

  #[test]
  fn empty_clique_adds_nothing() {
    let mut g = IdentityGraph::new();
    g.add_clique(&[]);
    assert!(g.is_empty());
    assert!(g.components().is_empty());
  }
}
