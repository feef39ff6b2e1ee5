/*
  Copyright© 2023 Raúl Wolters(1)

  This file is part of rustronomy-maxtree.

  rustronomy is free software: you can redistribute it and/or modify it under
  the terms of the European Union Public License version 1.2 or later, as
  published by the European Commission.

  rustronomy is distributed in the hope that it will be useful, but WITHOUT ANY
  WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
  A PARTICULAR PURPOSE. See the European Union Public License for more details.

  You should have received a copy of the EUPL in an/all official language(s) of
  the European Union along with rustronomy.  If not, see
  <https://ec.europa.eu/info/european-union-public-licence_en/>.

  (1) Resident of the Kingdom of the Netherlands; agreement between licensor and
  licensee subject to Dutch law as per article 15 of the EUPL.
*/

//! Node arena of the max-tree.
//!
//! Nodes live in a single `Vec` owned by the `MaxTree` and refer to each other
//! by index (`NodeId`). The root is its own father. Each node owns the pixels
//! of its region that are not owned by one of its descendants, so the pixel
//! lists of all nodes partition the grid.

use std::collections::VecDeque;

use crate::attributes::AttributeSet;
use crate::connectivity::Connectivity;
use crate::error::{TreeError, TreeResult};
use crate::grid::Grid;

/// Index of a node in the arena of its tree
pub type NodeId = usize;

/// Inclusive bounding box of a region, in grid coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub xmin: usize,
  pub xmax: usize,
  pub ymin: usize,
  pub ymax: usize,
  pub zmin: usize,
  pub zmax: usize,
}

impl Default for BoundingBox {
  fn default() -> Self {
    BoundingBox {
      xmin: usize::MAX,
      xmax: 0,
      ymin: usize::MAX,
      ymax: 0,
      zmin: usize::MAX,
      zmax: 0,
    }
  }
}

impl BoundingBox {
  pub(crate) fn include(&mut self, [x, y, z]: [usize; 3]) {
    self.xmin = self.xmin.min(x);
    self.xmax = self.xmax.max(x);
    self.ymin = self.ymin.min(y);
    self.ymax = self.ymax.max(y);
    self.zmin = self.zmin.min(z);
    self.zmax = self.zmax.max(z);
  }

  pub(crate) fn merge(&mut self, other: &BoundingBox) {
    self.xmin = self.xmin.min(other.xmin);
    self.xmax = self.xmax.max(other.xmax);
    self.ymin = self.ymin.min(other.ymin);
    self.ymax = self.ymax.max(other.ymax);
    self.zmin = self.zmin.min(other.zmin);
    self.zmax = self.zmax.max(other.zmax);
  }
}

/// Derived per-region attributes. Cumulative values are taken over the whole
/// subtree of the node. Only the families selected when the tree was
/// attributed hold meaningful values, see `MaxTree::computed`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttributes {
  pub area: u64,
  /// saturates at the bounds of `i64`
  pub volume: i64,
  pub contrast: i64,

  pub sum: f64,
  pub sum_square: f64,
  pub mean: f64,
  pub variance: f64,

  pub area_nghb: u64,
  pub sum_nghb: f64,
  pub sum_square_nghb: f64,
  pub mean_nghb: f64,
  pub variance_nghb: f64,
  pub otsu: f64,

  pub area_d_area_n_h: f64,
  pub area_d_area_n_h_d: f64,
  pub area_d_h: f64,
  pub area_d_area_n: f64,
  pub mser: f64,
  pub area_d_delta_h: f64,
  pub area_d_delta_area_f: f64,

  pub contour_length: u64,
  /// Pixels (original offsets) that contributed to `contour_length`. Only
  /// recorded when the border gradient is computed.
  pub border_pixels: Vec<usize>,
  pub mean_gradient_border: f64,
  pub complexity: f64,
  pub compacity: f64,

  pub bounding_box: BoundingBox,
  pub sub_nodes: u64,
}

#[derive(Debug, Clone)]
pub struct Node {
  pub(crate) h: i64,
  pub(crate) ori_h: i64,
  pub(crate) label: usize,
  pub(crate) pixels: Vec<usize>,
  pub(crate) children: Vec<NodeId>,
  pub(crate) father: NodeId,
  pub(crate) active: bool,
  pub(crate) attributes: NodeAttributes,
}

impl Node {
  pub(crate) fn new(id: NodeId, h: i64, label: usize) -> Self {
    Node {
      h,
      ori_h: h,
      label,
      pixels: Vec::new(),
      children: Vec::new(),
      father: id,
      active: true,
      attributes: NodeAttributes::default(),
    }
  }

  /// Current grey level. Equal to `ori_h` until a direct reconstruction
  /// flattens an inactive node.
  pub fn h(&self) -> i64 {
    self.h
  }

  /// Grey level the node was created at
  pub fn ori_h(&self) -> i64 {
    self.ori_h
  }

  /// Component number among the nodes of the same level
  pub fn label(&self) -> usize {
    self.label
  }

  /// Offsets owned by this node alone
  pub fn pixels(&self) -> &[usize] {
    &self.pixels
  }

  pub fn children(&self) -> &[NodeId] {
    &self.children
  }

  pub fn father(&self) -> NodeId {
    self.father
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  pub fn attributes(&self) -> &NodeAttributes {
    &self.attributes
  }
}

/// Max-tree of a grid of samples of type `T`.
///
/// Built with a `MaxTreeTransform` (see `TreeBuilder`). The tree keeps its own
/// copy of the source grid, which the attribute passes read.
#[derive(Debug, Clone)]
pub struct MaxTree<T> {
  pub(crate) grid: Grid<T>,
  pub(crate) connectivity: Connectivity,
  pub(crate) nodes: Vec<Node>,
  pub(crate) root: Option<NodeId>,
  pub(crate) node_index: Grid<NodeId>,
  pub(crate) h_min: i64,
  pub(crate) h_max: i64,
  pub(crate) computed: AttributeSet,
}

impl<T: Copy> MaxTree<T> {
  pub fn root(&self) -> Option<NodeId> {
    self.root
  }

  /// Panics when `id` does not belong to this tree, like slice indexing does
  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id]
  }

  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn is_root(&self, id: NodeId) -> bool {
    self.nodes[id].father == id
  }

  pub fn grid(&self) -> &Grid<T> {
    &self.grid
  }

  pub fn connectivity(&self) -> &Connectivity {
    &self.connectivity
  }

  /// `(h_min, h_max)` of the source grid
  pub fn level_range(&self) -> (i64, i64) {
    (self.h_min, self.h_max)
  }

  /// Attribute families that hold valid values
  pub fn computed(&self) -> AttributeSet {
    self.computed
  }

  /// Dense per-pixel index of the node owning each pixel
  pub fn node_index(&self) -> &Grid<NodeId> {
    &self.node_index
  }

  /// Node owning the pixel at `(x, y, z)`, looked up in the dense index
  pub fn coord_to_node(&self, x: usize, y: usize, z: usize) -> TreeResult<NodeId> {
    self
      .node_index
      .at(x, y, z)
      .ok_or(TreeError::OutOfBounds { x, y, z, size: self.grid.size() })
  }

  /// Node owning `offset`, found by searching the pixel lists of the tree
  /// breadth-first. Does not use the dense index.
  pub fn offset_to_node(&self, offset: usize) -> Option<NodeId> {
    self.bfs_order().into_iter().find(|&n| self.nodes[n].pixels.contains(&offset))
  }

  /// Rebuilds the dense pixel-to-node index from the pixel lists
  pub fn indexed_nodes(&self) -> Vec<NodeId> {
    let mut index = vec![0; self.grid.len()];
    for n in self.bfs_order() {
      for &p in &self.nodes[n].pixels {
        index[p] = n;
      }
    }
    index
  }

  /// Node owning `(x, y, z)` according to an index from `indexed_nodes`
  pub fn indexed_coord_to_node(
    &self,
    x: usize,
    y: usize,
    z: usize,
    index: &[NodeId],
  ) -> Option<NodeId> {
    if !self.grid.is_valid([x as isize, y as isize, z as isize]) {
      return None;
    }
    index.get(self.grid.offset(x, y, z)).copied()
  }

  /// All nodes, root first, breadth-first. Reversing the order gives a
  /// traversal in which every node comes after all of its descendants.
  pub fn bfs_order(&self) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(self.nodes.len());
    let Some(root) = self.root else { return order };
    let mut fifo = VecDeque::from([root]);
    while let Some(n) = fifo.pop_front() {
      order.push(n);
      fifo.extend(self.nodes[n].children.iter().copied());
    }
    order
  }

  /// Iterator over the strict ancestors of `id`, father first, root last
  pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    let mut current = id;
    std::iter::from_fn(move || {
      let father = self.nodes[current].father;
      if father == current {
        None
      } else {
        current = father;
        Some(father)
      }
    })
  }
}
