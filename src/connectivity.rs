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

//! Neighbourhoods (flat structuring elements) used as adjacency by the
//! flooding and as probes by the neighbourhood attributes.
//!
//! A connectivity is an ordered list of relative `(dx, dy, dz)` points. The
//! `N4`/`N8`/`N6`/`N18`/`N26` neighbourhoods do not contain the origin; the
//! odd-sized `N5`/`N9`/`N7`/`N19`/`N27` variants do.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connectivity {
  points: Vec<[isize; 3]>,
}

impl Connectivity {
  /// Connectivity from an explicit point list. Duplicate points are kept, the
  /// order of the list is the order in which neighbours are visited.
  pub fn from_points(points: Vec<[isize; 3]>) -> Self {
    Connectivity { points }
  }

  /// All points of the `3^d` cube around the origin whose squared distance
  /// lies in `1..=max_sq` (plus the origin when `centre` is set)
  fn cube(three_d: bool, max_sq: isize, centre: bool) -> Self {
    let zs: &[isize] = if three_d { &[-1, 0, 1] } else { &[0] };
    let mut points = Vec::new();
    for &dz in zs {
      for dy in -1..=1 {
        for dx in -1..=1 {
          let sq = dx * dx + dy * dy + dz * dz;
          if (sq == 0 && centre) || (sq > 0 && sq <= max_sq) {
            points.push([dx, dy, dz]);
          }
        }
      }
    }
    Connectivity { points }
  }

  pub fn n4_2d() -> Self {
    Self::cube(false, 1, false)
  }

  pub fn n5_2d() -> Self {
    Self::cube(false, 1, true)
  }

  pub fn n8_2d() -> Self {
    Self::cube(false, 2, false)
  }

  pub fn n9_2d() -> Self {
    Self::cube(false, 2, true)
  }

  pub fn n6_3d() -> Self {
    Self::cube(true, 1, false)
  }

  pub fn n7_3d() -> Self {
    Self::cube(true, 1, true)
  }

  pub fn n18_3d() -> Self {
    Self::cube(true, 2, false)
  }

  pub fn n19_3d() -> Self {
    Self::cube(true, 2, true)
  }

  pub fn n26_3d() -> Self {
    Self::cube(true, 3, false)
  }

  pub fn n27_3d() -> Self {
    Self::cube(true, 3, true)
  }

  /// Planar Euclidean ball of radius `r`, origin included
  pub fn euclidean_ball_2d(r: usize) -> Self {
    let r = r as isize;
    let mut points = Vec::new();
    for dy in -r..=r {
      for dx in -r..=r {
        if dx * dx + dy * dy <= r * r {
          points.push([dx, dy, 0]);
        }
      }
    }
    Connectivity { points }
  }

  /// Euclidean ball of radius `r` in all three axes, origin included
  pub fn euclidean_ball_3d(r: usize) -> Self {
    let r = r as isize;
    let mut points = Vec::new();
    for dz in -r..=r {
      for dy in -r..=r {
        for dx in -r..=r {
          if dx * dx + dy * dy + dz * dz <= r * r {
            points.push([dx, dy, dz]);
          }
        }
      }
    }
    Connectivity { points }
  }

  /// Segment of `2l + 1` voxels along the z-axis, centred on the origin
  pub fn axial_segment_3d(l: usize) -> Self {
    let l = l as isize;
    Connectivity { points: (-l..=l).map(|dz| [0, 0, dz]).collect() }
  }

  pub fn points(&self) -> &[[isize; 3]] {
    &self.points
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Point-reflected copy (every point negated)
  pub fn symmetric(&self) -> Self {
    Connectivity { points: self.points.iter().map(|p| [-p[0], -p[1], -p[2]]).collect() }
  }

  /// Per-axis border width needed before the samples (`|min(0, d)|`)
  pub fn negative_extent(&self) -> [usize; 3] {
    let mut back = [0usize; 3];
    for p in &self.points {
      for i in 0..3 {
        back[i] = back[i].max((-p[i]).max(0) as usize);
      }
    }
    back
  }

  /// Per-axis border width needed after the samples (`max(0, d)`)
  pub fn positive_extent(&self) -> [usize; 3] {
    let mut front = [0usize; 3];
    for p in &self.points {
      for i in 0..3 {
        front[i] = front[i].max(p[i].max(0) as usize);
      }
    }
    front
  }

  /// Linear offsets of the points inside a grid of size `[x, y, z]`
  pub fn offsets(&self, size: [usize; 3]) -> Vec<isize> {
    let (sx, sy) = (size[0] as isize, size[1] as isize);
    self.points.iter().map(|p| p[0] + p[1] * sx + p[2] * sx * sy).collect()
  }

  /// Tests whether this element, translated onto at least one pixel of
  /// `pixels`, lies completely inside the pixel set. Pixels are linear offsets
  /// in a grid of size `size`.
  pub fn fits_in(&self, pixels: &[usize], size: [usize; 3]) -> bool {
    //An element larger than the set can never fit
    if self.points.len() > pixels.len() {
      return false;
    }
    let (sx, sy) = (size[0], size[1]);
    let set: HashSet<usize> = pixels.iter().copied().collect();
    pixels.iter().any(|&p| {
      let c = [(p % sx) as isize, ((p / sx) % sy) as isize, (p / (sx * sy)) as isize];
      self.points.iter().all(|d| {
        let q = [c[0] + d[0], c[1] + d[1], c[2] + d[2]];
        let inside = (0..3).all(|i| q[i] >= 0 && (q[i] as usize) < size[i]);
        inside && set.contains(&(q[0] as usize + q[1] as usize * sx + q[2] as usize * sx * sy))
      })
    })
  }
}
