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

//! Error type shared by the tree builder, the attribute engine and the
//! filtering/reconstruction entry points.

use thiserror::Error;

use crate::attributes::Attribute;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
  /// The grid has no samples (one of its axes is zero)
  #[error("empty grid: no samples to flood")]
  EmptyGrid,

  /// The connectivity does not contain a single neighbour offset
  #[error("empty connectivity: no neighbour offsets")]
  EmptyConnectivity,

  /// Buffer length does not match the requested grid size
  #[error("size mismatch: expected {expected} samples, got {actual}")]
  SizeMismatch { expected: usize, actual: usize },

  /// Coordinate or offset outside of the grid
  #[error("position ({x}, {y}, {z}) is outside of a grid of size {size:?}")]
  OutOfBounds { x: usize, y: usize, z: usize, size: [usize; 3] },

  /// The grey-level range needs more level queues than we are willing to allocate
  #[error("grey-level range spans {levels} levels, the maximum is {max}")]
  LevelRangeTooLarge { levels: u64, max: u64 },

  /// An attribute family was selected without one of its prerequisites
  #[error("attribute family {family} requires {requires} to be selected as well")]
  MissingPrerequisite { family: &'static str, requires: &'static str },

  /// The attribute was requested from a tree that never computed it
  #[error("attribute {0:?} was not computed for this tree")]
  AttributeNotComputed(Attribute),

  /// Invalid parameters
  #[error("invalid parameter: {name} = {value} ({reason})")]
  InvalidParameter { name: &'static str, value: String, reason: &'static str },
}

/// Result type for tree operations
pub type TreeResult<T> = Result<T, TreeError>;
