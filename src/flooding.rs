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

//! Hierarchical-queue flooding (Salembier et al., 1998[^1]) that turns a grid
//! into a max-tree.
//!
//! The classic formulation recurses into `flood(level)` whenever a neighbour
//! with a higher grey level is discovered. Here the recursion is unrolled into
//! an explicit stack of `FloodFrame`s, one per level being flooded. Levels on
//! the stack are strictly increasing, so the stack never holds more frames
//! than there are grey levels, regardless of the size of the image.
//!
//! [^1]: P. Salembier, A. Oliveras and L. Garrido. **Antiextensive connected
//! operators for image and sequence processing.** *IEEE Transactions on Image
//! Processing*, 7(4):555-570, April 1998.

use std::collections::VecDeque;

use crate::attributes::AttributeSet;
use crate::connectivity::Connectivity;
use crate::error::{TreeError, TreeResult};
use crate::grid::{Grid, Sample};
use crate::tree::{MaxTree, Node, NodeId};

//Status values of the (padded) status grid. Anything else is a label.
const ACTIVE: usize = usize::MAX;
const NOT_ACTIVE: usize = usize::MAX - 1;
pub(crate) const BORDER: usize = usize::MAX - 2;

/// Largest number of distinct grey levels (`h_max - h_min + 1`) we allocate
/// level queues for
pub const MAX_LEVELS: u64 = 1 << 20;

/// One suspended `flood(level)` call. `cursor` holds the pixel whose
/// neighbours were being scanned and the index of the next neighbour to look
/// at when a higher level interrupted the scan.
#[derive(Debug, Clone, Copy)]
struct FloodFrame {
  level: usize,
  cursor: Option<(usize, usize)>,
}

impl FloodFrame {
  fn new(level: usize) -> Self {
    FloodFrame { level, cursor: None }
  }
}

/// All mutable state of a single tree construction
struct FloodContext<T> {
  padded: Grid<T>,
  status: Vec<usize>,
  neighbours: Vec<isize>,
  back: [usize; 3],
  padded_size: [usize; 3],
  size: [usize; 3],
  h_min: i64,

  //Per level: pixel queue, closed-node count, open-component flag and the
  //label -> node table
  queues: Vec<VecDeque<usize>>,
  closed: Vec<usize>,
  open: Vec<bool>,
  index: Vec<Vec<Option<NodeId>>>,

  nodes: Vec<Node>,
  node_index: Vec<NodeId>,
  assigned: usize,
}

impl<T: Sample> FloodContext<T> {
  fn new(grid: &Grid<T>, connectivity: &Connectivity, h_min: i64, h_max: i64) -> Self {
    let back = connectivity.negative_extent();
    let front = connectivity.positive_extent();
    let size = grid.size();

    //(1) pad grid and status with a border the connectivity can never cross
    let padded = grid.with_border(back, front, T::min_value());
    let padded_size = padded.size();
    let mut status = vec![BORDER; padded.len()];
    for z in 0..size[2] {
      for y in 0..size[1] {
        let start = padded.offset(back[0], y + back[1], z + back[2]);
        status[start..start + size[0]].fill(ACTIVE);
      }
    }
    let neighbours = connectivity.offsets(padded_size);

    //(2) one queue per level, label tables sized from the level histogram
    let levels = (h_max - h_min + 1) as usize;
    let mut histogram = vec![0usize; levels];
    for &v in grid.as_slice() {
      histogram[(v.to_level() - h_min) as usize] += 1;
    }

    FloodContext {
      padded,
      status,
      neighbours,
      back,
      padded_size,
      size,
      h_min,
      queues: vec![VecDeque::new(); levels],
      closed: vec![0; levels],
      open: vec![false; levels],
      index: histogram.into_iter().map(|count| vec![None; count]).collect(),
      nodes: Vec::new(),
      node_index: vec![0; grid.len()],
      assigned: 0,
    }
  }

  #[inline(always)]
  fn level_of(&self, padded_offset: usize) -> usize {
    (self.padded.get(padded_offset).to_level() - self.h_min) as usize
  }

  #[inline(always)]
  fn unpad(&self, padded_offset: usize) -> usize {
    let [px, py, _] = self.padded_size;
    let x = padded_offset % px - self.back[0];
    let y = (padded_offset / px) % py - self.back[1];
    let z = padded_offset / (px * py) - self.back[2];
    x + y * self.size[0] + z * self.size[0] * self.size[1]
  }

  fn new_node(&mut self, level: usize, label: usize) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(Node::new(id, level as i64 + self.h_min, label));
    self.index[level][label] = Some(id);
    id
  }

  fn node_at(&mut self, level: usize, label: usize) -> NodeId {
    match self.index[level][label] {
      Some(id) => id,
      None => self.new_node(level, label),
    }
  }

  /// Gives pixel `p` (popped from the queue of `level`) to the open node of
  /// that level
  fn assign(&mut self, p: usize, level: usize) {
    let label = self.closed[level];
    self.status[p] = label;
    let node = self.node_at(level, label);
    let offset = self.unpad(p);
    self.nodes[node].pixels.push(offset);
    self.node_index[offset] = node;
    self.assigned += 1;
  }

  /// Closes the open node of `level` (its queue ran dry) and hangs it below
  /// the open node of the nearest lower open level. Returns that level, or
  /// `None` when the closed node is the root.
  fn close(&mut self, level: usize) -> Option<usize> {
    self.closed[level] += 1;
    let finished = self.index[level][self.closed[level] - 1]
      .expect("a level is only closed after one of its pixels was assigned");

    let lower = (0..level).rev().find(|&m| self.open[m]);
    match lower {
      Some(m) => {
        let father = self.node_at(m, self.closed[m]);
        self.nodes[finished].father = father;
        self.nodes[father].children.push(finished);
      }
      //The father of the root is itself
      None => self.nodes[finished].father = finished,
    }
    self.open[level] = false;
    lower
  }

  /// Floods everything reachable from the seeded queue of `start`. Returns
  /// the root.
  fn flood(&mut self, start: usize) -> NodeId {
    let mut stack = vec![FloodFrame::new(start)];
    //Lower level handed back by the frame that closed last
    let mut returned: Option<Option<usize>> = None;

    while let Some(frame) = stack.last().copied() {
      //(1) a higher level just closed: keep flooding the level it handed back
      //until control returns to this frame
      if let Some(Some(m)) = returned.take() {
        if m != frame.level {
          stack.push(FloodFrame::new(m));
          continue;
        }
      }

      //(2) resume an interrupted neighbour scan, or pop the next pixel
      let (p, first) = match frame.cursor {
        Some(cursor) => cursor,
        None => match self.queues[frame.level].pop_front() {
          Some(p) => {
            self.assign(p, frame.level);
            (p, 0)
          }
          None => {
            //regional maximum of this branch reached
            returned = Some(self.close(frame.level));
            stack.pop();
            continue;
          }
        },
      };

      //(3) queue unvisited neighbours, descend into the first higher one
      let mut higher = None;
      for j in first..self.neighbours.len() {
        let q = (p as isize + self.neighbours[j]) as usize;
        if self.status[q] != ACTIVE {
          continue;
        }
        let lq = self.level_of(q);
        self.queues[lq].push_back(q);
        self.status[q] = NOT_ACTIVE;
        self.open[lq] = true;
        if lq > frame.level {
          higher = Some((j + 1, lq));
          break;
        }
      }

      let top = stack.len() - 1;
      match higher {
        Some((next, lq)) => {
          stack[top].cursor = Some((p, next));
          stack.push(FloodFrame::new(lq));
        }
        None => stack[top].cursor = None,
      }
    }

    self.index[start][0].expect("the lowest level always holds the root")
  }
}

/// Builds the (unattributed) max-tree of `grid` under `connectivity`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "maxtree::flood"))]
pub(crate) fn flood_tree<T: Sample>(
  grid: &Grid<T>,
  connectivity: &Connectivity,
) -> TreeResult<MaxTree<T>> {
  if grid.is_empty() {
    return Err(TreeError::EmptyGrid);
  }
  if connectivity.is_empty() {
    return Err(TreeError::EmptyConnectivity);
  }
  let (lo, hi) = grid.min_max().ok_or(TreeError::EmptyGrid)?;
  let (h_min, h_max) = (lo.to_level(), hi.to_level());
  //i64 samples can span more than i64::MAX levels
  let levels = (h_max as i128 - h_min as i128 + 1) as u128;
  if levels > MAX_LEVELS as u128 {
    let levels = u64::try_from(levels).unwrap_or(u64::MAX);
    return Err(TreeError::LevelRangeTooLarge { levels, max: MAX_LEVELS });
  }

  let mut ctx = FloodContext::new(grid, connectivity, h_min, h_max);

  //(3) seed with the first pixel at h_min
  let seed = (0..ctx.status.len())
    .find(|&p| ctx.status[p] == ACTIVE && ctx.level_of(p) == 0)
    .ok_or(TreeError::EmptyGrid)?;
  ctx.queues[0].push_back(seed);
  ctx.status[seed] = NOT_ACTIVE;
  ctx.open[0] = true;

  let root = ctx.flood(0);

  //Connectivities that do not link every pixel to the seed leave samples
  //unassigned, which would break the partition of the grid
  if ctx.assigned != grid.len() {
    return Err(TreeError::InvalidParameter {
      name: "connectivity",
      value: format!("{} points", connectivity.len()),
      reason: "does not connect every sample of the grid",
    });
  }

  //(5) the per-pixel node index replaces the padded status grid
  let node_index = Grid::from_vec(grid.size(), ctx.node_index)?;

  Ok(MaxTree {
    grid: grid.clone(),
    connectivity: connectivity.clone(),
    nodes: ctx.nodes,
    root: Some(root),
    node_index,
    h_min,
    h_max,
    computed: AttributeSet::empty(),
  })
}
