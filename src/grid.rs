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

//! Dense 3-axis sample grid.
//!
//! A `Grid` wraps an `ndarray::Array3` with axis order `[z, y, x]`. Because the
//! array is always kept in standard (row-major) layout, the linear offset of a
//! sample is `x + y * size_x + z * size_x * size_y`, which is the offset used
//! everywhere in the tree. 2D images are grids with `size_z == 1`; a 2D
//! `ndarray` is read as `[row, column] = [y, x]`.

use ndarray as nd;
use num_traits::PrimInt;

use crate::connectivity::Connectivity;
use crate::error::{TreeError, TreeResult};

/// Scalar types that can be flooded into a max-tree. Grey levels are handled
/// as `i64` internally.
pub trait Sample: PrimInt + Send + Sync + std::fmt::Debug + 'static {
  /// grey level of this sample
  fn to_level(self) -> i64;
  /// sample value for a grey level, saturating at the bounds of the type
  fn from_level(h: i64) -> Self;
}

macro_rules! impl_sample {
  ($($t:ty),*) => {
    $(impl Sample for $t {
      #[inline(always)]
      fn to_level(self) -> i64 {
        self as i64
      }
      #[inline(always)]
      fn from_level(h: i64) -> Self {
        h.clamp(<$t>::MIN as i64, <$t>::MAX as i64) as $t
      }
    })*
  };
}
impl_sample!(u8, u16, u32, i8, i16, i32, i64);

#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
  data: nd::Array3<T>,
}

impl<T: Copy> Grid<T> {
  /// Creates a grid of size `[size_x, size_y, size_z]` filled with `value`
  pub fn new(size: [usize; 3], value: T) -> Self {
    Grid { data: nd::Array3::from_elem((size[2], size[1], size[0]), value) }
  }

  /// Creates a grid from a flat buffer in offset order
  pub fn from_vec(size: [usize; 3], data: Vec<T>) -> TreeResult<Self> {
    let expected = size[0] * size[1] * size[2];
    if data.len() != expected {
      return Err(TreeError::SizeMismatch { expected, actual: data.len() });
    }
    let data = nd::Array3::from_shape_vec((size[2], size[1], size[0]), data)
      .map_err(|_| TreeError::SizeMismatch { expected, actual: expected })?;
    Ok(Grid { data })
  }

  /// 2D image, indexed `[y, x]`
  pub fn from_array2(img: nd::ArrayView2<T>) -> Self {
    Grid { data: img.insert_axis(nd::Axis(0)).as_standard_layout().into_owned() }
  }

  /// 3D volume, indexed `[z, y, x]`
  pub fn from_array3(img: nd::ArrayView3<T>) -> Self {
    Grid { data: img.as_standard_layout().into_owned() }
  }

  /// Takes ownership of a `[z, y, x]` array, copying only when it is not in
  /// standard layout
  pub(crate) fn from_owned_array(data: nd::Array3<T>) -> Self {
    if data.is_standard_layout() {
      Grid { data }
    } else {
      Grid { data: data.as_standard_layout().into_owned() }
    }
  }

  /// `[size_x, size_y, size_z]`
  pub fn size(&self) -> [usize; 3] {
    let (z, y, x) = self.data.dim();
    [x, y, z]
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  #[inline(always)]
  pub fn offset(&self, x: usize, y: usize, z: usize) -> usize {
    let [sx, sy, _] = self.size();
    x + y * sx + z * sx * sy
  }

  #[inline(always)]
  pub fn coord(&self, offset: usize) -> [usize; 3] {
    let [sx, sy, _] = self.size();
    [offset % sx, (offset / sx) % sy, offset / (sx * sy)]
  }

  /// Checks whether a (possibly negative) coordinate lies inside the grid
  #[inline(always)]
  pub fn is_valid(&self, p: [isize; 3]) -> bool {
    let size = self.size();
    (0..3).all(|i| p[i] >= 0 && (p[i] as usize) < size[i])
  }

  pub fn at(&self, x: usize, y: usize, z: usize) -> Option<T> {
    self.data.get([z, y, x]).copied()
  }

  pub fn at_mut(&mut self, x: usize, y: usize, z: usize) -> Option<&mut T> {
    self.data.get_mut([z, y, x])
  }

  /// Sample at a linear offset. Panics when the offset is out of range, like
  /// slice indexing does.
  #[inline(always)]
  pub fn get(&self, offset: usize) -> T {
    self.as_slice()[offset]
  }

  #[inline(always)]
  pub fn set(&mut self, offset: usize, value: T) {
    self.as_slice_mut()[offset] = value;
  }

  pub fn as_slice(&self) -> &[T] {
    self.data.as_slice().expect("grid is always kept in standard layout")
  }

  pub fn as_slice_mut(&mut self) -> &mut [T] {
    self.data.as_slice_mut().expect("grid is always kept in standard layout")
  }

  pub fn fill(&mut self, value: T) {
    self.data.fill(value);
  }

  /// Copy of the half-open box `[from, to)` (both `[x, y, z]`)
  pub fn crop(&self, from: [usize; 3], to: [usize; 3]) -> Grid<T> {
    let cropped =
      self.data.slice(nd::s![from[2]..to[2], from[1]..to[1], from[0]..to[0]]);
    Grid { data: cropped.as_standard_layout().into_owned() }
  }

  /// Copies `src` into this grid with its origin placed at `at` (`[x, y, z]`)
  pub fn copy_from(&mut self, src: &Grid<T>, at: [usize; 3]) {
    let [sx, sy, sz] = src.size();
    self
      .data
      .slice_mut(nd::s![at[2]..at[2] + sz, at[1]..at[1] + sy, at[0]..at[0] + sx])
      .assign(&src.data);
  }

  /// Bordered copy: `back[i]` cells of `value` before and `front[i]` after the
  /// samples along every axis
  pub fn with_border(&self, back: [usize; 3], front: [usize; 3], value: T) -> Grid<T> {
    let size = self.size();
    let padded = [0, 1, 2].map(|i| size[i] + back[i] + front[i]);
    let mut out = Grid::new(padded, value);
    out.copy_from(self, back);
    out
  }

  pub fn view(&self) -> nd::ArrayView3<T> {
    self.data.view()
  }

  pub fn into_array(self) -> nd::Array3<T> {
    self.data
  }

  /// The `z == 0` plane as a `[y, x]` image
  pub fn to_array2(&self) -> nd::Array2<T> {
    self.data.index_axis(nd::Axis(0), 0).to_owned()
  }

  /// Element-wise conversion into another grid of the same size
  pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Grid<U> {
    Grid { data: self.data.mapv(f) }
  }
}

impl<T: Copy + PartialOrd> Grid<T> {
  /// Smallest and largest sample, `None` for an empty grid
  pub fn min_max(&self) -> Option<(T, T)> {
    let mut iter = self.data.iter();
    let first = *iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), &v| {
      (if v < lo { v } else { lo }, if v > hi { v } else { hi })
    }))
  }
}

impl<T: Sample> Grid<T> {
  /// Morphological gradient (dilation minus erosion) over `connectivity`,
  /// ignoring neighbours outside of the grid. Only used to feed the
  /// border-gradient attribute.
  pub fn morphological_gradient(&self, connectivity: &Connectivity) -> Grid<i64> {
    let mut out = Grid::new(self.size(), 0i64);
    for (((z, y, x), &v), g) in self.data.indexed_iter().zip(out.data.iter_mut()) {
      let v = v.to_level();
      let p = [x as isize, y as isize, z as isize];
      let (mut dilated, mut eroded) = (None::<i64>, None::<i64>);
      for s in connectivity.points() {
        //dilation uses the reflected element
        let q = [p[0] - s[0], p[1] - s[1], p[2] - s[2]];
        if self.is_valid(q) {
          let w = self.data[[q[2] as usize, q[1] as usize, q[0] as usize]].to_level();
          dilated = Some(dilated.map_or(w, |d| d.max(w)));
        }
        let q = [p[0] + s[0], p[1] + s[1], p[2] + s[2]];
        if self.is_valid(q) {
          let w = self.data[[q[2] as usize, q[1] as usize, q[0] as usize]].to_level();
          eroded = Some(eroded.map_or(w, |e| e.min(w)));
        }
      }
      *g = dilated.unwrap_or(v) - eroded.unwrap_or(v);
    }
    out
  }
}
