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

//! Filtering and reconstruction.
//!
//! Filters never change the shape of a tree. They only switch nodes off
//! (`active = false`); the reconstruction rules then decide what an image made
//! from the remaining nodes looks like. `restore` undoes both the filters and
//! the level changes of a direct reconstruction, so one attributed tree can be
//! filtered and reconstructed many times.

use std::collections::VecDeque;

use ndarray as nd;

use crate::attributes::{Attribute, UNDEFINED};
use crate::connectivity::Connectivity;
use crate::error::{TreeError, TreeResult};
use crate::grid::{Grid, Sample};
use crate::tree::{MaxTree, NodeId};

/// How the surviving nodes of a filtered tree are turned back into an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructionRule {
  /// Pruning: an inactive node removes its whole subtree, which takes the
  /// level of the nearest surviving ancestor.
  #[default]
  Min,
  /// A node survives when it, or any of its descendants, is active. Survivors
  /// are painted like `Min`.
  Max,
  /// Inactive nodes are flattened onto the level of their father, while
  /// active descendants of inactive nodes keep their own level. Changes the
  /// `h` of the flattened nodes, see `MaxTree::restore`.
  Direct,
}

impl<T: Sample> MaxTree<T> {
  /// Resets every node to its original level and switches it back on
  pub fn restore(&mut self) {
    for node in self.nodes.iter_mut() {
      node.h = node.ori_h;
      node.active = true;
    }
  }

  /// Switches every node off
  pub fn set_inactive_all(&mut self) {
    for node in self.nodes.iter_mut() {
      node.active = false;
    }
  }

  /// Switches off every node whose `attribute` lies outside of the closed range
  /// `[t_min, t_max]`. Nodes are never switched back on. Returns the number of
  /// nodes this call deactivated.
  pub fn filter(&mut self, attribute: Attribute, t_min: f64, t_max: f64) -> TreeResult<usize> {
    if !self.computed.contains(attribute.family()) {
      return Err(TreeError::AttributeNotComputed(attribute));
    }
    let mut deactivated = 0;
    for n in self.bfs_order() {
      let v = self.value(n, attribute);
      let node = &mut self.nodes[n];
      if node.active && !(t_min..=t_max).contains(&v) {
        node.active = false;
        deactivated += 1;
      }
    }
    Ok(deactivated)
  }

  pub fn area_filtering(&mut self, t_min: u64, t_max: u64) -> TreeResult<usize> {
    self.filter(Attribute::Area, t_min as f64, t_max as f64)
  }

  pub fn volumic_filtering(&mut self, t_min: i64, t_max: i64) -> TreeResult<usize> {
    self.filter(Attribute::Volume, t_min as f64, t_max as f64)
  }

  pub fn contrast_filtering(&mut self, t_min: i64, t_max: i64) -> TreeResult<usize> {
    self.filter(Attribute::Contrast, t_min as f64, t_max as f64)
  }

  pub fn mser_filtering(&mut self, t_min: f64, t_max: f64) -> TreeResult<usize> {
    self.filter(Attribute::Mser, t_min, t_max)
  }

  pub fn otsu_filtering(&mut self, t_min: f64, t_max: f64) -> TreeResult<usize> {
    self.filter(Attribute::Otsu, t_min, t_max)
  }

  pub fn complexity_filtering(&mut self, t_min: f64, t_max: f64) -> TreeResult<usize> {
    self.filter(Attribute::Complexity, t_min, t_max)
  }

  pub fn compacity_filtering(&mut self, t_min: f64, t_max: f64) -> TreeResult<usize> {
    self.filter(Attribute::Compacity, t_min, t_max)
  }

  ////////////////////////////////////////////////////////////////////////////
  //                            PIXEL AGGREGATION                           //
  ////////////////////////////////////////////////////////////////////////////

  /// All offsets of the subtree rooted at `node`
  pub fn merge_pixels(&self, node: NodeId) -> Vec<usize> {
    let mut pixels = Vec::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
      pixels.extend_from_slice(&self.nodes[n].pixels);
      stack.extend_from_slice(&self.nodes[n].children);
    }
    pixels
  }

  /// Offsets of the run of inactive nodes starting at `node`: the descent
  /// stops at the first active node of every branch. Empty when `node` itself
  /// is active.
  pub fn merge_inactive_pixels(&self, node: NodeId) -> Vec<usize> {
    let mut pixels = Vec::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
      if self.nodes[n].active {
        continue;
      }
      pixels.extend_from_slice(&self.nodes[n].pixels);
      stack.extend_from_slice(&self.nodes[n].children);
    }
    pixels
  }

  /// Tests whether `connectivity`, used as a structuring element, fits inside
  /// the region of `node`
  pub fn fits_in(&self, node: NodeId, connectivity: &Connectivity) -> bool {
    connectivity.fits_in(&self.merge_pixels(node), self.grid.size())
  }

  fn check_output<U: Copy>(&self, res: &Grid<U>) -> TreeResult<()> {
    if res.size() != self.grid.size() {
      return Err(TreeError::SizeMismatch { expected: self.grid.len(), actual: res.len() });
    }
    Ok(())
  }

  /// Paints every node of the subtree of `node` with its own level
  pub fn construct_node(&self, res: &mut Grid<T>, node: NodeId) -> TreeResult<()> {
    self.check_output(res)?;
    let mut fifo = VecDeque::from([node]);
    while let Some(n) = fifo.pop_front() {
      let h = T::from_level(self.nodes[n].h);
      for &p in &self.nodes[n].pixels {
        res.set(p, h);
      }
      fifo.extend(self.nodes[n].children.iter().copied());
    }
    Ok(())
  }

  /// Paints the whole subtree of `node` with the level of `node`
  pub fn construct_node_direct(&self, res: &mut Grid<T>, node: NodeId) -> TreeResult<()> {
    self.check_output(res)?;
    let h = T::from_level(self.nodes[node].h);
    for p in self.merge_pixels(node) {
      res.set(p, h);
    }
    Ok(())
  }

  ////////////////////////////////////////////////////////////////////////////
  //                           IMAGE RECONSTRUCTION                         //
  ////////////////////////////////////////////////////////////////////////////

  /// Image of the filtered tree under `rule`. Samples no surviving node
  /// accounts for are zero.
  pub fn construct_image(&mut self, rule: ConstructionRule) -> Grid<T> {
    let mut res = Grid::new(self.grid.size(), T::zero());
    self.paint(&mut res, rule);
    res
  }

  /// Like `construct_image`, but writes into a caller-supplied grid of the
  /// same size as the source
  pub fn construct_image_into(
    &mut self,
    res: &mut Grid<T>,
    rule: ConstructionRule,
  ) -> TreeResult<()> {
    self.check_output(res)?;
    res.fill(T::zero());
    self.paint(res, rule);
    Ok(())
  }

  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "maxtree::construct_image"))]
  fn paint(&mut self, res: &mut Grid<T>, rule: ConstructionRule) {
    let Some(root) = self.root else { return };
    match rule {
      ConstructionRule::Min => {
        let alive: Vec<bool> = self.nodes.iter().map(|n| n.active).collect();
        self.paint_pruned(res, root, &alive);
      }
      ConstructionRule::Max => {
        //a node survives if anything in its subtree is active
        let mut alive: Vec<bool> = self.nodes.iter().map(|n| n.active).collect();
        for &n in self.bfs_order().iter().rev() {
          let f = self.nodes[n].father;
          if alive[n] && f != n {
            alive[f] = true;
          }
        }
        self.paint_pruned(res, root, &alive);
      }
      ConstructionRule::Direct => self.paint_direct(res, root),
    }
  }

  fn paint_pruned(&self, res: &mut Grid<T>, root: NodeId, alive: &[bool]) {
    if !alive[root] {
      return;
    }
    let mut fifo = VecDeque::from([root]);
    while let Some(n) = fifo.pop_front() {
      let h = T::from_level(self.nodes[n].h);
      for &p in &self.nodes[n].pixels {
        res.set(p, h);
      }
      for &c in &self.nodes[n].children {
        if alive[c] {
          fifo.push_back(c);
        } else {
          //cut: the whole subtree takes the level of n
          for p in self.merge_pixels(c) {
            res.set(p, h);
          }
        }
      }
    }
  }

  fn paint_direct(&mut self, res: &mut Grid<T>, root: NodeId) {
    //(1) topmost active nodes; samples above them stay at zero
    let mut tops = VecDeque::new();
    let mut fifo = VecDeque::from([root]);
    while let Some(n) = fifo.pop_front() {
      if self.nodes[n].active {
        tops.push_back(n);
      } else {
        fifo.extend(self.nodes[n].children.iter().copied());
      }
    }

    //(2) inactive nodes inherit the current level of their father
    while let Some(n) = tops.pop_front() {
      let h = self.nodes[n].h;
      let level = T::from_level(h);
      for &p in &self.nodes[n].pixels {
        res.set(p, level);
      }
      for i in 0..self.nodes[n].children.len() {
        let c = self.nodes[n].children[i];
        if !self.nodes[c].active {
          self.nodes[c].h = h;
        }
        tops.push_back(c);
      }
    }
  }

  ////////////////////////////////////////////////////////////////////////////
  //                         ATTRIBUTE RECONSTRUCTION                       //
  ////////////////////////////////////////////////////////////////////////////

  /// Image in which every sample holds the `value` attribute of a node picked
  /// from the branch above it:
  /// - `Min`: the ancestor with the smallest positive `selection` value
  /// - `Max`: the ancestor with the largest `selection` value below `UNDEFINED`
  /// - `Direct`: the node owning the sample (`selection` is ignored)
  ///
  /// The root is never picked over the node owning the sample.
  pub fn construct_attribute_image(
    &self,
    value: Attribute,
    selection: Attribute,
    rule: ConstructionRule,
  ) -> TreeResult<Grid<f64>> {
    self.attribute_image(value, selection, rule, None)
  }

  /// Like `construct_attribute_image`, with the walk up the branch bounded by
  /// a third attribute. The walk first climbs while the father's `limit`
  /// value is below `limit_min`, then only moves on to fathers whose `limit`
  /// value is at most `limit_max`.
  pub fn construct_attribute_image_limited(
    &self,
    value: Attribute,
    selection: Attribute,
    rule: ConstructionRule,
    limit: Attribute,
    limit_min: f64,
    limit_max: f64,
  ) -> TreeResult<Grid<f64>> {
    self.attribute_image(value, selection, rule, Some((limit, limit_min, limit_max)))
  }

  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "maxtree::attribute_image"))]
  fn attribute_image(
    &self,
    value: Attribute,
    selection: Attribute,
    rule: ConstructionRule,
    limit: Option<(Attribute, f64, f64)>,
  ) -> TreeResult<Grid<f64>> {
    let mut needed = vec![value];
    if rule != ConstructionRule::Direct {
      needed.push(selection);
    }
    needed.extend(limit.map(|(l, _, _)| l));
    if let Some(&missing) = needed.iter().find(|a| !self.computed.contains(a.family())) {
      return Err(TreeError::AttributeNotComputed(missing));
    }

    let Some(root) = self.root else {
      return Ok(Grid::new(self.grid.size(), 0.0));
    };

    //Every sample is an independent read-only walk up the tree
    let data = nd::Zip::from(self.node_index.view()).par_map_collect(|&n| {
      let picked = self.pick_node(n, root, selection, rule, limit);
      self.value(picked, value)
    });
    Ok(Grid::from_owned_array(data))
  }

  fn pick_node(
    &self,
    mut n: NodeId,
    root: NodeId,
    selection: Attribute,
    rule: ConstructionRule,
    limit: Option<(Attribute, f64, f64)>,
  ) -> NodeId {
    let father = |n: NodeId| self.nodes[n].father;

    if let Some((limit, limit_min, _)) = limit {
      while father(n) != root && self.value(father(n), limit) < limit_min {
        n = father(n);
      }
    }
    if rule == ConstructionRule::Direct {
      return n;
    }

    let within = |f: NodeId| limit.map_or(true, |(l, _, max)| self.value(f, l) <= max);
    let (mut picked, mut best) = (n, self.value(n, selection));
    while father(n) != root && within(father(n)) {
      n = father(n);
      let score = self.value(n, selection);
      let better = match rule {
        ConstructionRule::Min => score < best && score > 0.0,
        _ => score > best && score < UNDEFINED,
      };
      if better {
        (picked, best) = (n, score);
      }
    }
    picked
  }
}
