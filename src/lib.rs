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

#![doc(
  html_logo_url = "https://raw.githubusercontent.com/smups/rustronomy/main/logos/Rustronomy_ferris.png?raw=true"
)]
//! Rustronomy-maxtree is a pure-rust implementation of the max-tree (also known
//! as the component tree) of greyscale images and volumes, built with the
//! hierarchical-queue flooding algorithm of Salembier et al. (1998)[^1].
//!
//! # Features
//! The max-tree stores every connected component of every upper level set of
//! an image as a node. On top of the tree this crate offers:
//! 1. an *attribute engine* that computes region descriptors (area, volume,
//! contrast, grey-level statistics, MSER stability, contour length, ...) for
//! every node, see the `attributes` module;
//! 2. *connected filters*: nodes whose attribute falls outside of a range are
//! switched off, after which an image is reconstructed from the remaining
//! nodes with one of several rules, see the `filter` module.
//!
//! In addition, `rustronomy-maxtree` provides extra functionality which can be
//! accessed via cargo feature gates. A list of all additional features [can be found
//! below](#cargo-feature-gates).
//!
//! # Quickstart
//! To use the latest release of Rustronomy-maxtree in a cargo project, add
//! the rustronomy-maxtree crate as a dependency to your `Cargo.toml` file:
//! ```toml
//! [dependencies]
//! rustronomy-maxtree = "0.1.0"
//! ```
//! If you want to use the latest (unstable) development version of
//! rustronomy-maxtree, you can do so by using the `git` field (which fetches
//! the latest version from the repo) rather than the `version` field
//! (which downloads the latest released version from crates.io).
//! ```toml
//! {git = "https://github.com/smups/rustronomy-maxtree"}
//! ```
//!
//! ## Short example: area opening of a random field
//! `rustronomy-maxtree` uses the "builder pattern" to configure the tree
//! construction before executing it. Create a `TreeBuilder`, pick the
//! connectivity and attributes, and call `build()` to get a (`Sync`&`Send`)
//! `MaxTreeTransform` that floods grids into trees.
//! ```rust
//! use rustronomy_maxtree::prelude::*;
//! use ndarray as nd;
//! use ndarray_rand::{rand_distr::Uniform, RandomExt};
//!
//! //Create a random uniform distribution
//! let rf = nd::Array2::<u8>::random((128, 128), Uniform::new(0, 254));
//! //Set-up the transform (8-connectivity, default attributes)
//! let transform = TreeBuilder::new_2d().build().unwrap();
//! //Flood the field into a max-tree
//! let mut tree = transform.compute_array2(rf.view()).unwrap();
//! //Area opening: remove all peaks smaller than 20 pixels
//! tree.area_filtering(20, u64::MAX).unwrap();
//! let opened = tree.construct_image(ConstructionRule::Min).to_array2();
//! ```
//! [^1]: P. Salembier, A. Oliveras and L. Garrido. **Antiextensive connected operators for image and sequence processing.** *IEEE Transactions on Image Processing*, 7(4):555-570, April 1998.
//!
//! # Cargo feature gates
//! *By default, all features behind cargo feature gates are **disabled***
//! - `jemalloc`: this feature enables the [jemalloc allocator](https://jemalloc.net).
//! From the jemalloc website: *"jemalloc is a general purpose `malloc`(3)
//! implementation that emphasizes fragmentation avoidance and scalable concurrency
//! support."*. Jemalloc is enabled though usage of the `jemalloc` crate, which
//! increases compile times considerably. To compile `rustronomy-maxtree` with
//! the `jemalloc` feature, jemalloc must be installed on the host system.
//! - `progress`: this feature enables a progress bar for the neighbourhood
//! attribute pass, by far the slowest part of attributing a tree. Enabling this
//! feature adds the `indicatif` crate as a dependency.
//! - `tracing`: this feature emits `tracing` spans for the flooding, for every
//! attribute pass and for the reconstructions. Enabling it adds the `tracing`
//! crate as a dependency; a subscriber has to be installed by the caller.
//! - `debug`: this feature enables debug and performance monitoring output. This
//! can negatively impact performance. Enabling this feature does not add additional
//! dependencies.

//Unconditional imports
use ndarray as nd;
use num_traits::Float;
use rayon::prelude::*;

//Set Jemalloc as the global allocator for this crate
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

//Progress bar (conditional)
#[cfg(feature = "progress")]
use indicatif;

pub mod attributes;
pub mod connectivity;
pub mod error;
pub mod filter;
mod flooding;
pub mod grid;
pub mod tree;

#[cfg(feature = "debug")]
mod perf;

pub use attributes::{Attribute, AttributeRequest, AttributeSet, UNDEFINED};
pub use connectivity::Connectivity;
pub use error::{TreeError, TreeResult};
pub use filter::ConstructionRule;
pub use flooding::MAX_LEVELS;
pub use grid::{Grid, Sample};
pub use tree::{BoundingBox, MaxTree, Node, NodeAttributes, NodeId};

//Quantisation levels for floating point input. Zero is kept for samples that
//should always end up in the background.
const BACKGROUND: u16 = u16::MIN;
const FOREGROUND: u16 = u16::MAX;
const NORMAL_MAX: u16 = u16::MAX - 1;

//Utility prelude for batch import
pub mod prelude {
  pub use crate::{
    Attribute, AttributeRequest, AttributeSet, Connectivity, ConstructionRule, Grid, MaxTree,
    MaxTreeTransform, TreeBuilder, TreeError, UNDEFINED,
  };
}

////////////////////////////////////////////////////////////////////////////////
//                              HELPER FUNCTIONS                              //
////////////////////////////////////////////////////////////////////////////////

#[cfg(feature = "progress")]
pub(crate) fn set_up_bar(len: u64, task: &str) -> indicatif::ProgressBar {
  let template = format!("{{spinner}}[{{elapsed}}/{{duration}}] {task} {{pos}}/{{len}}{{bar:60}}");
  let bar = indicatif::ProgressBar::new(len);
  if let Ok(style) = indicatif::ProgressStyle::with_template(&template) {
    bar.set_style(style);
  }
  bar
}

////////////////////////////////////////////////////////////////////////////////
//                                  BUILDER                                   //
////////////////////////////////////////////////////////////////////////////////

/// Builder for a `MaxTreeTransform`.
///
/// The connectivity decides which samples are neighbours during flooding (and
/// which neighbours make a sample a contour sample). The attribute selection
/// decides which attribute passes run after flooding; see the `attributes`
/// module for the prerequisite rules a selection has to obey.
///
/// Defaults: the attributes of `AttributeSet::default()`, a neighbourhood
/// radius of 3 samples and an MSER delta of 5 grey levels.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
  connectivity: Connectivity,
  request: AttributeRequest,
}

impl TreeBuilder {
  /// creates a new `TreeBuilder` flooding with a custom connectivity
  pub fn new(connectivity: Connectivity) -> Self {
    TreeBuilder { connectivity, request: AttributeRequest::default() }
  }

  /// creates a new `TreeBuilder` configured for 2D images (8-connectivity)
  pub fn new_2d() -> Self {
    Self::new(Connectivity::n8_2d())
  }

  /// creates a new `TreeBuilder` configured for 3D volumes (26-connectivity)
  pub fn new_3d() -> Self {
    Self::new(Connectivity::n26_3d())
  }

  pub fn set_connectivity(mut self, connectivity: Connectivity) -> Self {
    self.connectivity = connectivity;
    self
  }

  /// Select the attribute families computed for every tree
  pub fn set_attributes(mut self, attributes: AttributeSet) -> Self {
    self.request = AttributeRequest::new(attributes)
      .set_neighbourhood_radius(self.request.neighbourhood_radius())
      .set_mser_delta(self.request.mser_delta());
    self
  }

  /// Set the radius of the ball scanned by the neighbourhood attributes
  pub fn set_neighbourhood_radius(mut self, radius: usize) -> Self {
    self.request = self.request.set_neighbourhood_radius(radius);
    self
  }

  /// Set the grey-level gap of the MSER scores
  pub fn set_mser_delta(mut self, delta: u32) -> Self {
    self.request = self.request.set_mser_delta(delta);
    self
  }

  /// Build a `MaxTreeTransform` from the current builder configuration. This
  /// function returns an `Err` when the connectivity is empty or when the
  /// attribute selection misses a prerequisite.
  pub fn build(self) -> TreeResult<MaxTreeTransform> {
    if self.connectivity.is_empty() {
      return Err(TreeError::EmptyConnectivity);
    }
    self.request.validate()?;
    Ok(MaxTreeTransform { connectivity: self.connectivity, request: self.request })
  }
}

////////////////////////////////////////////////////////////////////////////////
//                                 TRANSFORM                                  //
////////////////////////////////////////////////////////////////////////////////

/// A validated tree construction: floods grids into attributed max-trees.
/// Holds no per-grid state, so one transform can be shared between threads.
#[derive(Debug, Clone)]
pub struct MaxTreeTransform {
  connectivity: Connectivity,
  request: AttributeRequest,
}

impl MaxTreeTransform {
  pub fn connectivity(&self) -> &Connectivity {
    &self.connectivity
  }

  pub fn request(&self) -> &AttributeRequest {
    &self.request
  }

  /// Floods `grid` into a max-tree and computes the configured attributes
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "maxtree::compute"))]
  pub fn compute<T: Sample>(&self, grid: &Grid<T>) -> TreeResult<MaxTree<T>> {
    #[cfg(feature = "debug")]
    let start = std::time::Instant::now();

    //(1) flood
    let mut tree = flooding::flood_tree(grid, &self.connectivity)?;

    #[cfg(feature = "debug")]
    let flood_ms = start.elapsed().as_millis() as usize;

    //(2) attribute
    let _timings = tree.attribute_passes(&self.request)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(nodes = tree.len(), pixels = grid.len(), "max-tree built");

    //(3) print performance report
    #[cfg(feature = "debug")]
    {
      let (h_min, h_max) = tree.level_range();
      let perf = perf::PerfReport {
        pixels: grid.len(),
        levels: (h_max - h_min + 1) as usize,
        nodes: tree.len(),
        flood_ms,
        attribute_mus: _timings,
        total_ms: start.elapsed().as_millis() as usize,
      };
      println!("{perf}");
    }

    Ok(tree)
  }

  /// Max-tree of a 2D image indexed `[y, x]`
  pub fn compute_array2<T: Sample>(&self, img: nd::ArrayView2<T>) -> TreeResult<MaxTree<T>> {
    self.compute(&Grid::from_array2(img))
  }

  /// Max-tree of a 3D volume indexed `[z, y, x]`
  pub fn compute_array3<T: Sample>(&self, img: nd::ArrayView3<T>) -> TreeResult<MaxTree<T>> {
    self.compute(&Grid::from_array3(img))
  }

  /// Builds the trees of many grids in parallel, one build per grid. Results
  /// are returned in the order of the input.
  pub fn compute_batch<T: Sample>(&self, grids: &[Grid<T>]) -> Vec<TreeResult<MaxTree<T>>> {
    grids.par_iter().map(|grid| self.compute(grid)).collect()
  }

  /// The `pre_processor` function converts an array of floating point samples
  /// into `u16` grey levels that can be flooded. Finite values are mapped
  /// linearly onto `1..=u16::MAX - 1`.
  ///
  /// `NaN` and negative infinity are mapped to 0, so they always end up in the
  /// background (the root), and positive infinity is mapped to `u16::MAX`.
  pub fn pre_processor<F, D>(&self, img: nd::ArrayView<F, D>) -> nd::Array<u16, D>
  where
    F: Float,
    D: nd::Dimension,
  {
    //Calculate max and min of the finite values
    let (min, max) = img
      .iter()
      .filter_map(|x| x.to_f64().filter(|f| f.is_finite()))
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), f| (lo.min(f), hi.max(f)));
    let range = max - min;

    //Map image to u16 range, taking care of NaN and infty
    img.mapv(|x| -> u16 {
      match x.to_f64() {
        Some(float) if float.is_finite() => {
          let normal = if range > 0.0 { (float - min) / range } else { 0.0 };
          1 + (normal * (NORMAL_MAX - 1) as f64).round() as u16
        }
        Some(float) if float == f64::INFINITY => FOREGROUND,
        //Nans and negative infinity
        _ => BACKGROUND,
      }
    })
  }
}
