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

//! Attribute engine: per-node region descriptors computed by traversals of an
//! already flooded tree.
//!
//! Attributes are grouped in families (`AttributeSet`). Some families read the
//! values of others, so a request has to name its prerequisites explicitly:
//!
//! | family                         | requires                        |
//! |--------------------------------|---------------------------------|
//! | `VOLUME`, `MEAN_VARIANCE`      | `AREA`                          |
//! | `AREA_DERIVATIVES`             | `AREA`                          |
//! | `COMPLEXITY`                   | `AREA`, `CONTOUR`               |
//! | `BORDER_GRADIENT`              | `CONTOUR`                       |
//! | `OTSU`                         | `MEAN_VARIANCE`, `NEIGHBOURHOOD`|
//!
//! A request that breaks one of these rules is rejected with
//! `TreeError::MissingPrerequisite`; the engine never computes a family that
//! was not asked for.
//!
//! Scores that would divide by zero (or that need an ancestor that does not
//! exist) take the value `UNDEFINED` instead.

use std::time::Instant;

use bitflags::bitflags;

use crate::connectivity::Connectivity;
use crate::error::{TreeError, TreeResult};
use crate::flooding::BORDER;
use crate::grid::Sample;
use crate::tree::{BoundingBox, MaxTree, NodeAttributes, NodeId};

/// Sentinel for degenerate scores (zero denominators, missing ancestors)
pub const UNDEFINED: f64 = f64::MAX;

/// Neighbourhood radius used when none is configured
pub const DEFAULT_NEIGHBOURHOOD_RADIUS: usize = 3;
/// Grey-level gap used by the MSER family when none is configured
pub const DEFAULT_MSER_DELTA: u32 = 5;

bitflags! {
  /// Selection of attribute families
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct AttributeSet: u32 {
    const AREA = 1 << 0;
    const VOLUME = 1 << 1;
    const CONTRAST = 1 << 2;
    const MEAN_VARIANCE = 1 << 3;
    const NEIGHBOURHOOD = 1 << 4;
    const OTSU = 1 << 5;
    const AREA_DERIVATIVES = 1 << 6;
    const CONTOUR = 1 << 7;
    const COMPLEXITY = 1 << 8;
    const BORDER_GRADIENT = 1 << 9;
    const BOUNDING_BOX = 1 << 10;
    const SUB_NODES = 1 << 11;
  }
}

impl Default for AttributeSet {
  /// Area, contrast, volume, contour, complexity, bounding box and sub-nodes
  fn default() -> Self {
    AttributeSet::AREA
      | AttributeSet::CONTRAST
      | AttributeSet::VOLUME
      | AttributeSet::CONTOUR
      | AttributeSet::COMPLEXITY
      | AttributeSet::BOUNDING_BOX
      | AttributeSet::SUB_NODES
  }
}

impl AttributeSet {
  /// Name of the first family in the set
  fn name(self) -> &'static str {
    self.iter_names().next().map_or("NONE", |(name, _)| name)
  }
}

//(family, prerequisite) pairs
const PREREQUISITES: &[(AttributeSet, AttributeSet)] = &[
  (AttributeSet::VOLUME, AttributeSet::AREA),
  (AttributeSet::MEAN_VARIANCE, AttributeSet::AREA),
  (AttributeSet::AREA_DERIVATIVES, AttributeSet::AREA),
  (AttributeSet::COMPLEXITY, AttributeSet::AREA),
  (AttributeSet::COMPLEXITY, AttributeSet::CONTOUR),
  (AttributeSet::BORDER_GRADIENT, AttributeSet::CONTOUR),
  (AttributeSet::OTSU, AttributeSet::MEAN_VARIANCE),
  (AttributeSet::OTSU, AttributeSet::NEIGHBOURHOOD),
];

/// Single attribute value that can be read from a node, used to filter and to
/// build attribute images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
  /// current grey level, always available
  H,
  Area,
  AreaDAreaNH,
  AreaDAreaNHD,
  AreaDH,
  AreaDAreaN,
  Mser,
  AreaDDeltaH,
  AreaDDeltaAreaF,
  Mean,
  Variance,
  MeanNghb,
  VarianceNghb,
  Otsu,
  Contrast,
  Volume,
  MeanGradientBorder,
  ContourLength,
  Complexity,
  Compacity,
  SubNodes,
}

impl Attribute {
  /// Family that has to be computed before this attribute can be read
  pub fn family(self) -> AttributeSet {
    use Attribute::*;
    match self {
      H => AttributeSet::empty(),
      Area => AttributeSet::AREA,
      AreaDAreaNH | AreaDAreaNHD | AreaDH | AreaDAreaN | Mser | AreaDDeltaH | AreaDDeltaAreaF => {
        AttributeSet::AREA_DERIVATIVES
      }
      Mean | Variance => AttributeSet::MEAN_VARIANCE,
      MeanNghb | VarianceNghb => AttributeSet::NEIGHBOURHOOD,
      Otsu => AttributeSet::OTSU,
      Contrast => AttributeSet::CONTRAST,
      Volume => AttributeSet::VOLUME,
      MeanGradientBorder => AttributeSet::BORDER_GRADIENT,
      ContourLength => AttributeSet::CONTOUR,
      Complexity | Compacity => AttributeSet::COMPLEXITY,
      SubNodes => AttributeSet::SUB_NODES,
    }
  }
}

/// Which families to compute, plus the parameters of the families that take
/// one. Built with the same consuming setters as `TreeBuilder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRequest {
  attributes: AttributeSet,
  neighbourhood_radius: usize,
  mser_delta: u32,
}

impl Default for AttributeRequest {
  fn default() -> Self {
    AttributeRequest::new(AttributeSet::default())
  }
}

impl AttributeRequest {
  pub fn new(attributes: AttributeSet) -> Self {
    AttributeRequest {
      attributes,
      neighbourhood_radius: DEFAULT_NEIGHBOURHOOD_RADIUS,
      mser_delta: DEFAULT_MSER_DELTA,
    }
  }

  /// Radius of the Euclidean ball scanned around each region by the
  /// `NEIGHBOURHOOD` family
  pub fn set_neighbourhood_radius(mut self, radius: usize) -> Self {
    self.neighbourhood_radius = radius;
    self
  }

  /// Grey-level gap used by the MSER scores of the `AREA_DERIVATIVES` family
  pub fn set_mser_delta(mut self, delta: u32) -> Self {
    self.mser_delta = delta;
    self
  }

  pub fn attributes(&self) -> AttributeSet {
    self.attributes
  }

  pub fn neighbourhood_radius(&self) -> usize {
    self.neighbourhood_radius
  }

  pub fn mser_delta(&self) -> u32 {
    self.mser_delta
  }

  /// Checks the prerequisite rules and the parameters of the selection
  pub fn validate(&self) -> TreeResult<()> {
    for &(family, requires) in PREREQUISITES {
      if self.attributes.contains(family) && !self.attributes.contains(requires) {
        return Err(TreeError::MissingPrerequisite {
          family: family.name(),
          requires: requires.name(),
        });
      }
    }
    if self.attributes.contains(AttributeSet::NEIGHBOURHOOD) && self.neighbourhood_radius == 0 {
      return Err(TreeError::InvalidParameter {
        name: "neighbourhood_radius",
        value: "0".to_string(),
        reason: "the neighbourhood family needs a radius of at least one sample",
      });
    }
    Ok(())
  }
}

//Zeroes the fields of the families in `selected` before they are recomputed
fn reset_families(attr: &mut NodeAttributes, selected: AttributeSet) {
  if selected.contains(AttributeSet::AREA) {
    attr.area = 0;
  }
  if selected.contains(AttributeSet::VOLUME) {
    attr.volume = 0;
  }
  if selected.contains(AttributeSet::CONTRAST) {
    attr.contrast = 0;
  }
  if selected.contains(AttributeSet::MEAN_VARIANCE) {
    (attr.sum, attr.sum_square, attr.mean, attr.variance) = (0.0, 0.0, 0.0, 0.0);
  }
  if selected.contains(AttributeSet::NEIGHBOURHOOD) {
    attr.area_nghb = 0;
    (attr.sum_nghb, attr.sum_square_nghb) = (0.0, 0.0);
    (attr.mean_nghb, attr.variance_nghb) = (0.0, 0.0);
  }
  if selected.contains(AttributeSet::OTSU) {
    attr.otsu = 0.0;
  }
  if selected.contains(AttributeSet::CONTOUR) {
    attr.contour_length = 0;
    attr.border_pixels.clear();
  }
  if selected.contains(AttributeSet::BORDER_GRADIENT) {
    attr.mean_gradient_border = 0.0;
  }
  if selected.contains(AttributeSet::COMPLEXITY) {
    (attr.complexity, attr.compacity) = (0.0, 0.0);
  }
  if selected.contains(AttributeSet::BOUNDING_BOX) {
    attr.bounding_box = BoundingBox::default();
  }
  if selected.contains(AttributeSet::SUB_NODES) {
    attr.sub_nodes = 0;
  }
}

//numerator / denominator, UNDEFINED when the denominator is zero
#[inline]
fn ratio(numerator: f64, denominator: f64) -> f64 {
  if denominator == 0.0 {
    UNDEFINED
  } else {
    numerator / denominator
  }
}

////////////////////////////////////////////////////////////////////////////////
//                               ATTRIBUTE ENGINE                             //
////////////////////////////////////////////////////////////////////////////////

impl<T: Sample> MaxTree<T> {
  /// (Re)computes the families selected in `request`. Families that were not
  /// selected keep whatever values they had. Fails before touching the tree if
  /// the request breaks a prerequisite rule.
  pub fn compute_attributes(&mut self, request: &AttributeRequest) -> TreeResult<()> {
    self.attribute_passes(request).map(|_| ())
  }

  /// Runs the attribute passes and returns how long each of them took, in µs
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "maxtree::attributes"))]
  pub(crate) fn attribute_passes(
    &mut self,
    request: &AttributeRequest,
  ) -> TreeResult<Vec<(&'static str, usize)>> {
    request.validate()?;
    let selected = request.attributes;
    let mut timings = Vec::new();

    for node in self.nodes.iter_mut() {
      reset_families(&mut node.attributes, selected);
    }

    //Every pass after the neighbourhood one is a bottom-up (or order-free)
    //traversal, so one reversed breadth-first order serves them all
    let mut post_order = self.bfs_order();
    post_order.reverse();

    macro_rules! pass {
      ($family:expr, $name:literal, $body:expr) => {
        if selected.contains($family) {
          #[cfg(feature = "tracing")]
          let _span = tracing::info_span!($name).entered();
          let start = Instant::now();
          $body;
          timings.push(($name, start.elapsed().as_micros() as usize));
        }
      };
    }

    //(1) the neighbourhood pass runs top-down over whole subtrees
    pass!(
      AttributeSet::NEIGHBOURHOOD,
      "neighbourhood",
      self.neighbourhood(request.neighbourhood_radius)
    );

    //(2) bottom-up passes, in dependency order
    pass!(AttributeSet::AREA, "area", self.area(&post_order));
    pass!(AttributeSet::MEAN_VARIANCE, "mean_variance", self.mean_variance(&post_order));
    pass!(AttributeSet::OTSU, "otsu", self.otsu());
    pass!(AttributeSet::AREA_DERIVATIVES, "area_derivatives", {
      self.area_derivatives();
      self.mser(request.mser_delta as i64);
    });
    pass!(AttributeSet::CONTRAST, "contrast", self.contrast(&post_order));
    pass!(AttributeSet::VOLUME, "volume", self.volume(&post_order));
    pass!(
      AttributeSet::CONTOUR,
      "contour",
      self.contour(selected.contains(AttributeSet::BORDER_GRADIENT))
    );
    pass!(AttributeSet::BORDER_GRADIENT, "border_gradient", self.border_gradient());
    pass!(AttributeSet::COMPLEXITY, "complexity", self.complexity());
    pass!(AttributeSet::BOUNDING_BOX, "bounding_box", self.bounding_box(&post_order));
    pass!(AttributeSet::SUB_NODES, "sub_nodes", self.sub_nodes(&post_order));

    self.computed |= selected;
    Ok(timings)
  }

  /// Value of `attribute` for `node`. Fails when the family of the attribute
  /// was never computed for this tree.
  pub fn attribute(&self, node: NodeId, attribute: Attribute) -> TreeResult<f64> {
    if node >= self.nodes.len() {
      return Err(TreeError::InvalidParameter {
        name: "node",
        value: node.to_string(),
        reason: "no such node in this tree",
      });
    }
    if !self.computed.contains(attribute.family()) {
      return Err(TreeError::AttributeNotComputed(attribute));
    }
    Ok(self.value(node, attribute))
  }

  /// Unchecked read of an attribute value
  pub(crate) fn value(&self, node: NodeId, attribute: Attribute) -> f64 {
    let n = &self.nodes[node];
    let a = &n.attributes;
    use Attribute::*;
    match attribute {
      H => n.h as f64,
      Area => a.area as f64,
      AreaDAreaNH => a.area_d_area_n_h,
      AreaDAreaNHD => a.area_d_area_n_h_d,
      AreaDH => a.area_d_h,
      AreaDAreaN => a.area_d_area_n,
      Mser => a.mser,
      AreaDDeltaH => a.area_d_delta_h,
      AreaDDeltaAreaF => a.area_d_delta_area_f,
      Mean => a.mean,
      Variance => a.variance,
      MeanNghb => a.mean_nghb,
      VarianceNghb => a.variance_nghb,
      Otsu => a.otsu,
      Contrast => a.contrast as f64,
      Volume => a.volume as f64,
      MeanGradientBorder => a.mean_gradient_border,
      ContourLength => a.contour_length as f64,
      Complexity => a.complexity,
      Compacity => a.compacity,
      SubNodes => a.sub_nodes as f64,
    }
  }

  #[inline(always)]
  fn level_at(&self, offset: usize) -> i64 {
    self.grid.get(offset).to_level()
  }

  //////////////////////////////////////////////////////////////////////////////
  //                              ATTRIBUTE PASSES                            //
  //////////////////////////////////////////////////////////////////////////////

  fn area(&mut self, post_order: &[NodeId]) {
    for &n in post_order {
      let below: u64 = self.nodes[n].children.iter().map(|&c| self.nodes[c].attributes.area).sum();
      self.nodes[n].attributes.area = self.nodes[n].pixels.len() as u64 + below;
    }
  }

  fn mean_variance(&mut self, post_order: &[NodeId]) {
    for &n in post_order {
      let (mut sum, mut sum_square) = (0.0, 0.0);
      for &p in &self.nodes[n].pixels {
        let v = self.level_at(p) as f64;
        sum += v;
        sum_square += v * v;
      }
      for &c in &self.nodes[n].children {
        sum += self.nodes[c].attributes.sum;
        sum_square += self.nodes[c].attributes.sum_square;
      }

      let attr = &mut self.nodes[n].attributes;
      attr.sum = sum;
      attr.sum_square = sum_square;
      if attr.area > 0 {
        let area = attr.area as f64;
        attr.mean = sum / area;
        attr.variance = sum_square / area - attr.mean * attr.mean;
      }
    }
  }

  /// Grey statistics of the samples within `radius` of a region but outside
  /// of it. Every surrounding sample is counted once per region.
  fn neighbourhood(&mut self, radius: usize) {
    let size = self.grid.size();
    let ball = if size[2] > 1 {
      Connectivity::euclidean_ball_3d(radius)
    } else {
      Connectivity::euclidean_ball_2d(radius)
    };

    //Generation stamps: region k marks its own samples with 2k + 1 and the
    //samples it already counted with 2k + 2, so the buffer is never cleared
    let mut stamp = vec![0u64; self.grid.len()];
    let order = self.bfs_order();

    #[cfg(feature = "progress")]
    let bar = crate::set_up_bar(order.len() as u64, "neighbourhood");

    for (k, &n) in order.iter().enumerate() {
      let (inside, seen) = (2 * k as u64 + 1, 2 * k as u64 + 2);
      let region = self.merge_pixels(n);
      for &p in &region {
        stamp[p] = inside;
      }

      let (mut area, mut sum, mut sum_square) = (0u64, 0.0, 0.0);
      for &p in &region {
        let [x, y, z] = self.grid.coord(p);
        for d in ball.points() {
          let q = [x as isize + d[0], y as isize + d[1], z as isize + d[2]];
          if !self.grid.is_valid(q) {
            continue;
          }
          let q = self.grid.offset(q[0] as usize, q[1] as usize, q[2] as usize);
          if stamp[q] == inside || stamp[q] == seen {
            continue;
          }
          stamp[q] = seen;
          let v = self.level_at(q) as f64;
          area += 1;
          sum += v;
          sum_square += v * v;
        }
      }

      let attr = &mut self.nodes[n].attributes;
      attr.area_nghb = area;
      attr.sum_nghb = sum;
      attr.sum_square_nghb = sum_square;
      if area > 0 {
        attr.mean_nghb = sum / area as f64;
        attr.variance_nghb = sum_square / area as f64 - attr.mean_nghb * attr.mean_nghb;
      }

      #[cfg(feature = "progress")]
      bar.inc(1);
    }

    #[cfg(feature = "progress")]
    bar.finish_and_clear();
  }

  fn otsu(&mut self) {
    for node in self.nodes.iter_mut() {
      let a = &mut node.attributes;
      let spread = (a.mean - a.mean_nghb) * (a.mean - a.mean_nghb);
      a.otsu = ratio(spread, a.variance + a.variance_nghb);
    }
  }

  /// Area change with respect to the father node, per level and per area
  fn area_derivatives(&mut self) {
    for n in 0..self.nodes.len() {
      let f = self.nodes[n].father;
      let attr = if f == n {
        (UNDEFINED, UNDEFINED, UNDEFINED)
      } else {
        let area = self.nodes[n].attributes.area as f64;
        let growth = self.nodes[f].attributes.area as f64 - area;
        let d_h = ratio(growth, (self.nodes[n].ori_h - self.nodes[f].ori_h) as f64);
        let d_area_n_h = if d_h == UNDEFINED { UNDEFINED } else { ratio(d_h, area) };
        (d_h, ratio(growth, area), d_area_n_h)
      };
      let a = &mut self.nodes[n].attributes;
      (a.area_d_h, a.area_d_area_n, a.area_d_area_n_h) = attr;
    }

    //second derivative needs the first one of the father
    for n in 0..self.nodes.len() {
      let f = self.nodes[n].father;
      let own = self.nodes[n].attributes.area_d_area_n_h;
      let father = self.nodes[f].attributes.area_d_area_n_h;
      self.nodes[n].attributes.area_d_area_n_h_d =
        if f == n || own == UNDEFINED || father == UNDEFINED { UNDEFINED } else { father - own };
    }
  }

  /// MSER stability scores: area growth between a node and the first
  /// ancestor at least `delta` grey levels lower. The root is never used as
  /// that ancestor.
  fn mser(&mut self, delta: i64) {
    let scores: Vec<(f64, f64, f64)> = (0..self.nodes.len())
      .map(|n| {
        let h = self.nodes[n].ori_h;
        let area = self.nodes[n].attributes.area as f64;
        let ancestor = std::iter::once(n)
          .chain(self.ancestors(n))
          .take_while(|&m| self.nodes[m].father != m)
          .find(|&m| h - self.nodes[m].ori_h >= delta);
        match ancestor {
          None => (UNDEFINED, UNDEFINED, UNDEFINED),
          Some(m) => {
            let area_a = self.nodes[m].attributes.area as f64;
            let growth = area_a - area;
            (
              ratio(growth, area),
              ratio(growth, (h - self.nodes[m].ori_h) as f64),
              ratio(growth, area_a),
            )
          }
        }
      })
      .collect();

    for (node, (mser, d_delta_h, d_delta_area_f)) in self.nodes.iter_mut().zip(scores) {
      let a = &mut node.attributes;
      a.mser = mser;
      a.area_d_delta_h = d_delta_h;
      a.area_d_delta_area_f = d_delta_area_f;
    }
  }

  fn contrast(&mut self, post_order: &[NodeId]) {
    for &n in post_order {
      let h = self.nodes[n].ori_h;
      let contrast = self.nodes[n]
        .children
        .iter()
        .map(|&c| self.nodes[c].ori_h - h + self.nodes[c].attributes.contrast)
        .max()
        .unwrap_or(0)
        .max(0);
      self.nodes[n].attributes.contrast = contrast;
    }
  }

  /// `area * (h - h_father)` plus the volume of the children. The root uses
  /// its own level, which makes its volume the total grey mass of the grid.
  /// Saturates at the bounds of `i64`.
  fn volume(&mut self, post_order: &[NodeId]) {
    for &n in post_order {
      let node = &self.nodes[n];
      let local =
        if node.father == n { node.ori_h } else { node.ori_h - self.nodes[node.father].ori_h };
      let below = node
        .children
        .iter()
        .fold(0i64, |acc, &c| acc.saturating_add(self.nodes[c].attributes.volume));
      let volume = (node.attributes.area as i64).saturating_mul(local).saturating_add(below);
      self.nodes[n].attributes.volume = volume;
    }
  }

  /// Contour length. A sample is a contour sample of every node between its
  /// own node and (excluding) the node at the lowest neighbouring level. The
  /// border of the grid counts as a neighbour at `h_min`, which makes samples
  /// that touch it contour samples up to and including the root.
  fn contour(&mut self, save_pixels: bool) {
    let back = self.connectivity.negative_extent();
    let front = self.connectivity.positive_extent();
    let padded = self.grid.with_border(back, front, T::min_value());
    let status = self.node_index.with_border(back, front, BORDER);
    let padded_size = padded.size();
    let neighbours = self.connectivity.offsets(padded_size);
    let [sx, sy, _] = self.grid.size();

    for p in 0..status.len() {
      let owner = status.get(p);
      if owner == BORDER {
        continue;
      }
      let v = padded.get(p).to_level();
      let (mut contour, mut hits_border, mut min_level) = (false, false, i64::MAX);
      for &d in &neighbours {
        let q = (p as isize + d) as usize;
        if status.get(q) == BORDER {
          contour = true;
          hits_border = true;
          min_level = self.h_min;
        } else {
          let w = padded.get(q).to_level();
          if v > w {
            contour = true;
            min_level = min_level.min(w);
          }
        }
      }
      if !contour {
        continue;
      }

      let offset = {
        let [x, y, z] = padded.coord(p);
        (x - back[0]) + (y - back[1]) * sx + (z - back[2]) * sx * sy
      };
      let mut n = owner;
      loop {
        if !hits_border && self.nodes[n].ori_h <= min_level {
          break;
        }
        let attr = &mut self.nodes[n].attributes;
        attr.contour_length += 1;
        if save_pixels {
          attr.border_pixels.push(offset);
        }
        let f = self.nodes[n].father;
        if f == n {
          break;
        }
        n = f;
      }
    }
  }

  /// Mean morphological gradient over the contour samples of each node
  fn border_gradient(&mut self) {
    let gradient = self.grid.morphological_gradient(&self.connectivity);
    for node in self.nodes.iter_mut() {
      let a = &mut node.attributes;
      a.mean_gradient_border = if a.border_pixels.is_empty() {
        0.0
      } else {
        let sum: f64 = a.border_pixels.iter().map(|&p| gradient.get(p) as f64).sum();
        sum / a.border_pixels.len() as f64
      };
    }
  }

  /// `1000 * contour / area` and the isoperimetric ratio
  /// `1000 * 4π * area / contour²`, zero when a denominator is zero
  fn complexity(&mut self) {
    for node in self.nodes.iter_mut() {
      let a = &mut node.attributes;
      let (area, contour) = (a.area as f64, a.contour_length as f64);
      a.complexity = if area > 0.0 { 1000.0 * contour / area } else { 0.0 };
      a.compacity = if contour > 0.0 {
        1000.0 * 4.0 * std::f64::consts::PI * area / (contour * contour)
      } else {
        0.0
      };
    }
  }

  fn bounding_box(&mut self, post_order: &[NodeId]) {
    for &n in post_order {
      let mut bb = BoundingBox::default();
      for &p in &self.nodes[n].pixels {
        bb.include(self.grid.coord(p));
      }
      for &c in &self.nodes[n].children {
        bb.merge(&self.nodes[c].attributes.bounding_box);
      }
      self.nodes[n].attributes.bounding_box = bb;
    }
  }

  /// Number of descendants of each node
  fn sub_nodes(&mut self, post_order: &[NodeId]) {
    for &n in post_order {
      let below: u64 =
        self.nodes[n].children.iter().map(|&c| 1 + self.nodes[c].attributes.sub_nodes).sum();
      self.nodes[n].attributes.sub_nodes = below;
    }
  }
}
