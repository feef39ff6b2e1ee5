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

use std::collections::HashSet;

use ndarray as nd;
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use rustronomy_maxtree::prelude::*;
use rustronomy_maxtree::{Sample, MAX_LEVELS};

//This constant determines the randomly generated images' sizes
const RF_SIZE: (usize, usize) = (64, 64);

fn random_field() -> nd::Array2<u8> {
  //a small value range gives plenty of plateaus
  nd::Array2::<u8>::random(RF_SIZE, Uniform::new(0, 16))
}

fn all_attributes() -> AttributeSet {
  AttributeSet::all()
}

//3x3 zeros with a single bright centre pixel
fn scenario_b() -> nd::Array2<u8> {
  nd::array![[0, 0, 0], [0, 5, 0], [0, 0, 0]]
}

//5x5 zeros, a 3x3 plateau at 2 and a peak of 4 in the middle
fn stepped_peak() -> nd::Array2<u8> {
  nd::array![
    [0, 0, 0, 0, 0],
    [0, 2, 2, 2, 0],
    [0, 2, 4, 2, 0],
    [0, 2, 2, 2, 0],
    [0, 0, 0, 0, 0]
  ]
}

//7x7 square rings around the centre: 0 at the edge, then 1, 3 and a peak of 8
fn nested_plateaus() -> nd::Array2<u8> {
  nd::Array2::from_shape_fn((7, 7), |(y, x)| {
    let ring = (y as isize - 3).abs().max((x as isize - 3).abs());
    [8, 3, 1, 0][ring as usize]
  })
}

fn close(a: f64, b: f64) -> bool {
  (a - b).abs() < 1e-9
}

//Partition of the samples, strict nesting of the levels and the area of the root
fn assert_well_formed<T: Sample>(tree: &MaxTree<T>) {
  let samples = tree.grid().len();
  let mut seen = HashSet::new();
  for (id, node) in tree.nodes().iter().enumerate() {
    for &p in node.pixels() {
      assert!(seen.insert(p), "offset {p} is owned by more than one node");
      assert_eq!(tree.node_index().get(p), id);
    }
    if !tree.is_root(id) {
      assert!(tree.node(node.father()).h() < node.h());
    }
  }
  assert_eq!(seen.len(), samples);
  assert_eq!(tree.bfs_order().len(), tree.len());
  assert_eq!(tree.node(tree.root().unwrap()).attributes().area as usize, samples);
}

////////////////////////////////////////////////////////////////////////////////
//                                 SCENARIOS                                  //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn test_constant_grid() {
  let img = nd::Array2::<u8>::from_elem((4, 4), 7);
  let tree = TreeBuilder::new_2d().build().unwrap().compute_array2(img.view()).unwrap();

  assert_eq!(tree.len(), 1);
  let root = tree.root().unwrap();
  let node = tree.node(root);
  assert!(node.is_leaf());
  assert_eq!(node.father(), root);
  assert_eq!(node.h(), 7);
  assert_eq!(node.pixels().len(), 16);

  let attr = node.attributes();
  assert_eq!(attr.area, 16);
  assert_eq!(attr.volume, 16 * 7);
  assert_eq!(attr.contrast, 0);
  assert_eq!(attr.sub_nodes, 0);
  //only the 12 samples on the edge of the grid touch its border
  assert_eq!(attr.contour_length, 12);
  assert!(close(attr.complexity, 750.0));
  assert_eq!((attr.bounding_box.xmin, attr.bounding_box.xmax), (0, 3));
  assert_eq!((attr.bounding_box.ymin, attr.bounding_box.ymax), (0, 3));
}

#[test]
fn test_single_peak() {
  let tree = TreeBuilder::new_2d().build().unwrap().compute_array2(scenario_b().view()).unwrap();

  assert_eq!(tree.len(), 2);
  let root = tree.root().unwrap();
  let leaf = tree.coord_to_node(1, 1, 0).unwrap();
  assert_ne!(leaf, root);
  assert_eq!(tree.node(leaf).father(), root);
  assert_eq!(tree.node(root).children(), &[leaf]);

  assert_eq!(tree.node(leaf).h(), 5);
  assert_eq!(tree.node(root).h(), 0);
  assert_eq!(tree.node(leaf).attributes().area, 1);
  assert_eq!(tree.node(root).attributes().area, 9);

  //volume and contrast
  assert_eq!(tree.node(leaf).attributes().volume, 5);
  assert_eq!(tree.node(root).attributes().volume, 5);
  assert_eq!(tree.node(root).attributes().contrast, 5);
  assert_eq!(tree.node(leaf).attributes().contrast, 0);

  //contours: the peak is a contour sample of itself only, the ring touches the
  //border of the grid
  assert_eq!(tree.node(leaf).attributes().contour_length, 1);
  assert_eq!(tree.node(root).attributes().contour_length, 8);
  assert!(close(tree.node(leaf).attributes().complexity, 1000.0));
  assert!(close(tree.node(leaf).attributes().compacity, 4000.0 * std::f64::consts::PI));

  //descendants
  assert_eq!(tree.node(root).attributes().sub_nodes, 1);
  assert_eq!(tree.node(leaf).attributes().sub_nodes, 0);

  //bounding boxes
  let bb = tree.node(leaf).attributes().bounding_box;
  assert_eq!((bb.xmin, bb.xmax, bb.ymin, bb.ymax, bb.zmin, bb.zmax), (1, 1, 1, 1, 0, 0));
  let bb = tree.node(root).attributes().bounding_box;
  assert_eq!((bb.xmin, bb.xmax, bb.ymin, bb.ymax, bb.zmin, bb.zmax), (0, 2, 0, 2, 0, 0));
}

#[test]
fn test_single_peak_statistics() {
  let transform = TreeBuilder::new_2d()
    .set_attributes(all_attributes())
    .set_neighbourhood_radius(1)
    .set_mser_delta(5)
    .build()
    .unwrap();
  let tree = transform.compute_array2(scenario_b().view()).unwrap();
  let root = tree.root().unwrap();
  let leaf = tree.coord_to_node(1, 1, 0).unwrap();

  //grey statistics
  assert!(close(tree.attribute(leaf, Attribute::Mean).unwrap(), 5.0));
  assert!(close(tree.attribute(leaf, Attribute::Variance).unwrap(), 0.0));
  assert!(close(tree.attribute(root, Attribute::Mean).unwrap(), 5.0 / 9.0));
  assert!(close(tree.attribute(root, Attribute::Variance).unwrap(), 200.0 / 81.0));

  //a radius-1 ball around the peak holds four background samples
  assert_eq!(tree.node(leaf).attributes().area_nghb, 4);
  assert!(close(tree.attribute(leaf, Attribute::MeanNghb).unwrap(), 0.0));
  //the root region has no surroundings
  assert_eq!(tree.node(root).attributes().area_nghb, 0);

  //zero variance on both sides of the peak
  assert_eq!(tree.attribute(leaf, Attribute::Otsu).unwrap(), UNDEFINED);
  assert!(close(tree.attribute(root, Attribute::Otsu).unwrap(), 0.125));

  //father-based derivatives
  assert!(close(tree.attribute(leaf, Attribute::AreaDH).unwrap(), 1.6));
  assert!(close(tree.attribute(leaf, Attribute::AreaDAreaN).unwrap(), 8.0));
  assert!(close(tree.attribute(leaf, Attribute::AreaDAreaNH).unwrap(), 1.6));
  assert_eq!(tree.attribute(root, Attribute::AreaDH).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(leaf, Attribute::AreaDAreaNHD).unwrap(), UNDEFINED);

  //the gap of delta is only reached at the root, which never counts
  assert_eq!(tree.attribute(leaf, Attribute::Mser).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(leaf, Attribute::AreaDDeltaH).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(leaf, Attribute::AreaDDeltaAreaF).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(root, Attribute::Mser).unwrap(), UNDEFINED);

  //the 8-neighbourhood has no origin: the gradient is 5 next to the peak and 0
  //on the peak itself
  assert!(close(tree.attribute(leaf, Attribute::MeanGradientBorder).unwrap(), 0.0));
  assert!(close(tree.attribute(root, Attribute::MeanGradientBorder).unwrap(), 5.0));
  assert_eq!(tree.node(root).attributes().border_pixels.len(), 8);
}

#[test]
fn test_mser_gap_not_reached() {
  let transform = TreeBuilder::new_2d()
    .set_attributes(AttributeSet::AREA | AttributeSet::AREA_DERIVATIVES)
    .set_mser_delta(6)
    .build()
    .unwrap();
  let tree = transform.compute_array2(scenario_b().view()).unwrap();
  let leaf = tree.coord_to_node(1, 1, 0).unwrap();
  assert_eq!(tree.attribute(leaf, Attribute::Mser).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(leaf, Attribute::AreaDDeltaH).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(leaf, Attribute::AreaDDeltaAreaF).unwrap(), UNDEFINED);
}

#[test]
fn test_neighbourhood_3d() {
  let mut img = nd::Array3::<u8>::zeros((5, 5, 5));
  img[[2, 2, 2]] = 9;
  let transform = TreeBuilder::new_3d()
    .set_attributes(AttributeSet::NEIGHBOURHOOD)
    .set_neighbourhood_radius(1)
    .build()
    .unwrap();
  let tree = transform.compute_array3(img.view()).unwrap();
  let peak = tree.coord_to_node(2, 2, 2).unwrap();

  //the radius-1 ball reaches one sample above and one below the peak as well
  assert_eq!(tree.node(peak).attributes().area_nghb, 6);
  assert!(close(tree.attribute(peak, Attribute::MeanNghb).unwrap(), 0.0));
  assert_eq!(tree.node(tree.root().unwrap()).attributes().area_nghb, 0);

  //radius 2 covers the 33-point ball minus the peak itself
  let transform = TreeBuilder::new_3d()
    .set_attributes(AttributeSet::NEIGHBOURHOOD)
    .set_neighbourhood_radius(2)
    .build()
    .unwrap();
  let tree = transform.compute_array3(img.view()).unwrap();
  let peak = tree.coord_to_node(2, 2, 2).unwrap();
  assert_eq!(tree.node(peak).attributes().area_nghb, 32);
}

#[test]
fn test_mser_window() {
  let img = nested_plateaus();
  let mser_of_peak = |delta: u32| {
    let transform = TreeBuilder::new_2d()
      .set_attributes(AttributeSet::AREA | AttributeSet::AREA_DERIVATIVES)
      .set_mser_delta(delta)
      .build()
      .unwrap();
    let tree = transform.compute_array2(img.view()).unwrap();
    let peak = tree.coord_to_node(3, 3, 0).unwrap();
    [Attribute::Mser, Attribute::AreaDDeltaH, Attribute::AreaDDeltaAreaF]
      .map(|a| tree.attribute(peak, a).unwrap())
  };

  //delta 5: the 3x3 plateau at level 3
  let [mser, d_h, d_area_f] = mser_of_peak(5);
  assert!(close(mser, 8.0));
  assert!(close(d_h, 1.6));
  assert!(close(d_area_f, 8.0 / 9.0));

  //delta 7: the 5x5 plateau at level 1
  let [mser, d_h, d_area_f] = mser_of_peak(7);
  assert!(close(mser, 24.0));
  assert!(close(d_h, 24.0 / 7.0));
  assert!(close(d_area_f, 24.0 / 25.0));

  //delta 8 would need the root
  assert_eq!(mser_of_peak(8), [UNDEFINED; 3]);
}

#[test]
fn test_mser_below_root() {
  let transform = TreeBuilder::new_2d()
    .set_attributes(AttributeSet::AREA | AttributeSet::AREA_DERIVATIVES)
    .set_mser_delta(1)
    .build()
    .unwrap();
  let tree = transform.compute_array2(nested_plateaus().view()).unwrap();
  let root = tree.root().unwrap();
  let ring = tree.coord_to_node(1, 1, 0).unwrap();
  let plateau = tree.coord_to_node(2, 2, 0).unwrap();
  assert_eq!(tree.node(ring).father(), root);

  //the child of the root only has the root above it
  assert_eq!(tree.attribute(ring, Attribute::Mser).unwrap(), UNDEFINED);
  assert_eq!(tree.attribute(root, Attribute::Mser).unwrap(), UNDEFINED);
  assert!(close(tree.attribute(plateau, Attribute::Mser).unwrap(), 16.0 / 9.0));
}

#[test]
fn test_volume_3d() {
  let mut img = nd::Array3::<u16>::zeros((3, 3, 3));
  img[[1, 1, 1]] = 3;
  let tree = TreeBuilder::new_3d().build().unwrap().compute_array3(img.view()).unwrap();

  assert_eq!(tree.len(), 2);
  let root = tree.root().unwrap();
  let peak = tree.coord_to_node(1, 1, 1).unwrap();
  assert_eq!(tree.node(root).attributes().area, 27);
  assert_eq!(tree.node(peak).attributes().area, 1);
  assert_eq!(tree.node(root).attributes().volume, 3);
  //26 samples touch the border of the volume
  assert_eq!(tree.node(root).attributes().contour_length, 26);
  assert_eq!(tree.node(root).attributes().bounding_box.zmax, 2);
}

////////////////////////////////////////////////////////////////////////////////
//                              TREE PROPERTIES                               //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn test_partition() {
  let rf = random_field();
  let tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();

  let mut seen = HashSet::new();
  for (id, node) in tree.nodes().iter().enumerate() {
    for &p in node.pixels() {
      assert!(seen.insert(p), "offset {p} is owned by more than one node");
      assert_eq!(tree.node_index().get(p), id);
    }
  }
  assert_eq!(seen.len(), rf.len());
  assert_eq!(tree.indexed_nodes(), tree.node_index().as_slice());
}

#[test]
fn test_nesting() {
  let rf = random_field();
  let tree = TreeBuilder::new_2d()
    .set_connectivity(Connectivity::n4_2d())
    .build()
    .unwrap()
    .compute_array2(rf.view())
    .unwrap();

  let root = tree.root().unwrap();
  for (id, node) in tree.nodes().iter().enumerate() {
    if id == root {
      assert_eq!(node.father(), root);
      continue;
    }
    let father = tree.node(node.father());
    assert!(father.h() < node.h());
    assert!(father.children().contains(&id));
  }
  //every node is reachable from the root
  assert_eq!(tree.bfs_order().len(), tree.len());
}

#[test]
fn test_deep_ramp() {
  //every sample is its own level: a single chain of 5000 nested nodes
  const LEN: usize = 5000;
  let img = nd::Array2::<u16>::from_shape_fn((1, LEN), |(_, x)| x as u16);
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(img.view()).unwrap();

  assert_well_formed(&tree);
  assert_eq!(tree.len(), LEN);
  let top = tree.coord_to_node(LEN - 1, 0, 0).unwrap();
  assert!(tree.node(top).is_leaf());
  assert_eq!(tree.ancestors(top).count(), LEN - 1);
  assert_eq!(tree.node(top).attributes().area, 1);
  assert_eq!(tree.construct_image(ConstructionRule::Direct).to_array2(), img);
}

#[test]
fn test_wide_range_field() {
  //thousands of distinct levels in random nesting
  let rf = nd::Array2::<u16>::random((96, 96), Uniform::new(0, 60000));
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();

  assert_well_formed(&tree);
  let (h_min, h_max) = tree.level_range();
  assert!(h_max - h_min > 1000);
  assert_eq!(tree.construct_image(ConstructionRule::Direct).to_array2(), rf);
}

#[test]
fn test_random_volume() {
  let rf = nd::Array3::<u8>::random((8, 16, 16), Uniform::new(0, 16));
  let mut tree = TreeBuilder::new(Connectivity::n6_3d())
    .build()
    .unwrap()
    .compute_array3(rf.view())
    .unwrap();

  assert_well_formed(&tree);
  for rule in [ConstructionRule::Min, ConstructionRule::Max, ConstructionRule::Direct] {
    assert_eq!(tree.construct_image(rule).into_array(), rf);
  }
}

#[test]
fn test_area_consistency() {
  let rf = random_field();
  let tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();

  let root = tree.root().unwrap();
  assert_eq!(tree.node(root).attributes().area as usize, rf.len());
  for id in 0..tree.len() {
    let node = tree.node(id);
    let below: u64 = node.children().iter().map(|&c| tree.node(c).attributes().area).sum();
    assert_eq!(node.attributes().area, node.pixels().len() as u64 + below);
    assert_eq!(node.attributes().area as usize, tree.merge_pixels(id).len());
    assert_eq!(node.attributes().sub_nodes as usize + 1, {
      let mut count = 0;
      let mut stack = vec![id];
      while let Some(n) = stack.pop() {
        count += 1;
        stack.extend_from_slice(tree.node(n).children());
      }
      count
    });
  }
}

#[test]
fn test_lookup() {
  let tree =
    TreeBuilder::new_2d().build().unwrap().compute_array2(stepped_peak().view()).unwrap();

  let mid = tree.coord_to_node(1, 1, 0).unwrap();
  let offset = tree.grid().offset(3, 2, 0);
  assert_eq!(tree.offset_to_node(offset), Some(mid));
  let index = tree.indexed_nodes();
  assert_eq!(tree.indexed_coord_to_node(3, 2, 0, &index), Some(mid));
  assert_eq!(tree.indexed_coord_to_node(5, 0, 0, &index), None);
  assert!(matches!(tree.coord_to_node(5, 0, 0), Err(TreeError::OutOfBounds { .. })));

  let leaf = tree.coord_to_node(2, 2, 0).unwrap();
  assert_eq!(tree.ancestors(leaf).collect::<Vec<_>>(), vec![mid, tree.root().unwrap()]);
}

////////////////////////////////////////////////////////////////////////////////
//                          FILTERS & RECONSTRUCTION                          //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn test_round_trip() {
  let rf = random_field();
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();

  for rule in [ConstructionRule::Min, ConstructionRule::Max, ConstructionRule::Direct] {
    assert_eq!(tree.construct_image(rule).to_array2(), rf);
  }
}

#[test]
fn test_restore() {
  let rf = random_field();
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();

  tree.area_filtering(10, u64::MAX).unwrap();
  let filtered = tree.construct_image(ConstructionRule::Direct);
  assert_ne!(filtered.to_array2(), rf);

  tree.restore();
  let once: Vec<(i64, bool)> = tree.nodes().iter().map(|n| (n.h(), n.is_active())).collect();
  tree.restore();
  let twice: Vec<(i64, bool)> = tree.nodes().iter().map(|n| (n.h(), n.is_active())).collect();
  assert_eq!(once, twice);
  assert!(tree.nodes().iter().all(|n| n.is_active() && n.h() == n.ori_h()));
  assert_eq!(tree.construct_image(ConstructionRule::Direct).to_array2(), rf);
}

#[test]
fn test_filter_monotonicity() {
  let rf = random_field();
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();

  tree.area_filtering(5, u64::MAX).unwrap();
  let wide: Vec<bool> = tree.nodes().iter().map(|n| n.is_active()).collect();

  //narrowing the range only switches more nodes off
  let more = tree.area_filtering(20, u64::MAX).unwrap();
  let narrow: Vec<bool> = tree.nodes().iter().map(|n| n.is_active()).collect();
  for (w, n) in wide.iter().zip(narrow.iter()) {
    assert!(*w || !*n);
  }
  assert_eq!(more, wide.iter().zip(narrow.iter()).filter(|(w, n)| **w && !**n).count());

  //filtering with the same range twice changes nothing
  assert_eq!(tree.area_filtering(20, u64::MAX).unwrap(), 0);
}

#[test]
fn test_area_opening_is_anti_extensive() {
  let rf = random_field();
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(rf.view()).unwrap();
  tree.area_filtering(8, u64::MAX).unwrap();
  let opened = tree.construct_image(ConstructionRule::Min).to_array2();
  nd::Zip::from(&opened).and(&rf).for_each(|&o, &r| assert!(o <= r));

  //surviving regions keep their levels
  let root = tree.root().unwrap();
  assert!(tree.node(root).is_active());
}

#[test]
fn test_reconstruction_rules() {
  let img = stepped_peak();
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(img.view()).unwrap();
  let root = tree.root().unwrap();
  let mid = tree.coord_to_node(1, 1, 0).unwrap();
  let leaf = tree.coord_to_node(2, 2, 0).unwrap();

  //remove the peak only: it is flattened onto the plateau
  assert_eq!(tree.area_filtering(2, u64::MAX).unwrap(), 1);
  let mut expected = img.clone();
  expected[[2, 2]] = 2;
  assert_eq!(tree.construct_image(ConstructionRule::Min).to_array2(), expected);
  assert_eq!(tree.construct_image(ConstructionRule::Direct).to_array2(), expected);
  assert_eq!(tree.node(leaf).h(), 2);
  tree.restore();

  //keep the peak only
  assert_eq!(tree.filter(Attribute::Area, 0.0, 1.0).unwrap(), 2);
  assert!(!tree.node(root).is_active() && !tree.node(mid).is_active());
  assert_eq!(tree.merge_inactive_pixels(root).len(), 24);
  assert!(tree.merge_inactive_pixels(leaf).is_empty());

  //pruning: the inactive root removes everything
  assert!(tree.construct_image(ConstructionRule::Min).to_array2().iter().all(|&v| v == 0));
  //max: the active peak keeps its whole branch alive
  assert_eq!(tree.construct_image(ConstructionRule::Max).to_array2(), img);
  //direct: only the active peak is painted
  let mut expected = nd::Array2::<u8>::zeros((5, 5));
  expected[[2, 2]] = 4;
  assert_eq!(tree.construct_image(ConstructionRule::Direct).to_array2(), expected);

  //everything off
  tree.restore();
  tree.set_inactive_all();
  for rule in [ConstructionRule::Min, ConstructionRule::Max, ConstructionRule::Direct] {
    assert!(tree.construct_image(rule).to_array2().iter().all(|&v| v == 0));
  }
}

#[test]
fn test_construct_into_and_nodes() {
  let img = stepped_peak();
  let mut tree = TreeBuilder::new_2d().build().unwrap().compute_array2(img.view()).unwrap();
  let mid = tree.coord_to_node(1, 1, 0).unwrap();

  let mut out = Grid::new([5, 5, 1], 9u8);
  tree.construct_image_into(&mut out, ConstructionRule::Min).unwrap();
  assert_eq!(out.to_array2(), img);

  let mut wrong = Grid::new([4, 5, 1], 0u8);
  assert!(matches!(
    tree.construct_image_into(&mut wrong, ConstructionRule::Min),
    Err(TreeError::SizeMismatch { .. })
  ));

  let mut painted = Grid::new([5, 5, 1], 0u8);
  tree.construct_node(&mut painted, mid).unwrap();
  assert_eq!(painted.to_array2(), img);

  let mut flat = Grid::new([5, 5, 1], 0u8);
  tree.construct_node_direct(&mut flat, mid).unwrap();
  assert_eq!(flat.to_array2().iter().filter(|&&v| v == 2).count(), 9);
}

#[test]
fn test_fits_in() {
  let tree =
    TreeBuilder::new_2d().build().unwrap().compute_array2(stepped_peak().view()).unwrap();
  let mid = tree.coord_to_node(1, 1, 0).unwrap();
  let leaf = tree.coord_to_node(2, 2, 0).unwrap();

  assert!(tree.fits_in(mid, &Connectivity::n9_2d()));
  assert!(!tree.fits_in(leaf, &Connectivity::n9_2d()));
  assert!(!tree.fits_in(mid, &Connectivity::euclidean_ball_2d(2)));
}

#[test]
fn test_contour_of_stepped_peak() {
  let tree =
    TreeBuilder::new_2d().build().unwrap().compute_array2(stepped_peak().view()).unwrap();
  let root = tree.root().unwrap();
  let mid = tree.coord_to_node(1, 1, 0).unwrap();
  let leaf = tree.coord_to_node(2, 2, 0).unwrap();

  assert_eq!(tree.node(leaf).attributes().contour_length, 1);
  assert_eq!(tree.node(mid).attributes().contour_length, 8);
  assert_eq!(tree.node(root).attributes().contour_length, 16);
  assert!(close(tree.attribute(mid, Attribute::Complexity).unwrap(), 8000.0 / 9.0));
  assert_eq!(tree.node(root).attributes().contrast, 4);
  assert_eq!(tree.node(mid).attributes().volume, 9 * 2 + 2);
}

#[test]
fn test_attribute_images() {
  let tree =
    TreeBuilder::new_2d().build().unwrap().compute_array2(stepped_peak().view()).unwrap();

  let direct = tree
    .construct_attribute_image(Attribute::Area, Attribute::Area, ConstructionRule::Direct)
    .unwrap()
    .to_array2();
  assert_eq!(direct[[2, 2]], 1.0);
  assert_eq!(direct[[1, 2]], 9.0);
  assert_eq!(direct[[0, 0]], 25.0);

  //the root is never picked over the node owning a sample
  let max = tree
    .construct_attribute_image(Attribute::Area, Attribute::Area, ConstructionRule::Max)
    .unwrap()
    .to_array2();
  assert_eq!(max[[2, 2]], 9.0);
  assert_eq!(max[[0, 0]], 25.0);

  let min = tree
    .construct_attribute_image(Attribute::Area, Attribute::Area, ConstructionRule::Min)
    .unwrap()
    .to_array2();
  assert_eq!(min[[2, 2]], 1.0);

  //walking to the plateau needs a limit of at least its level
  let limited = tree
    .construct_attribute_image_limited(
      Attribute::Area,
      Attribute::Area,
      ConstructionRule::Max,
      Attribute::H,
      0.0,
      1.0,
    )
    .unwrap()
    .to_array2();
  assert_eq!(limited[[2, 2]], 1.0);

  //climb straight to the plateau before selecting anything
  let climbed = tree
    .construct_attribute_image_limited(
      Attribute::Area,
      Attribute::Area,
      ConstructionRule::Direct,
      Attribute::H,
      3.0,
      f64::MAX,
    )
    .unwrap()
    .to_array2();
  assert_eq!(climbed[[2, 2]], 9.0);
}

#[test]
fn test_batch() {
  let grids: Vec<Grid<u8>> = (0..4).map(|_| Grid::from_array2(random_field().view())).collect();
  let transform = TreeBuilder::new_2d().build().unwrap();
  let trees = transform.compute_batch(&grids);
  assert_eq!(trees.len(), grids.len());
  for (tree, grid) in trees.into_iter().zip(grids.iter()) {
    let mut tree = tree.unwrap();
    assert_eq!(tree.construct_image(ConstructionRule::Min), *grid);
  }
}

#[test]
fn test_recompute_attributes() {
  let transform = TreeBuilder::new_2d().set_attributes(AttributeSet::AREA).build().unwrap();
  let mut tree = transform.compute_array2(scenario_b().view()).unwrap();
  let leaf = tree.coord_to_node(1, 1, 0).unwrap();

  assert_eq!(
    tree.attribute(leaf, Attribute::Volume),
    Err(TreeError::AttributeNotComputed(Attribute::Volume))
  );
  assert_eq!(tree.attribute(leaf, Attribute::H), Ok(5.0));

  let request = AttributeRequest::new(AttributeSet::AREA | AttributeSet::VOLUME);
  tree.compute_attributes(&request).unwrap();
  assert_eq!(tree.attribute(leaf, Attribute::Volume), Ok(5.0));
  //recomputing does not accumulate
  tree.compute_attributes(&request).unwrap();
  assert_eq!(tree.attribute(leaf, Attribute::Area), Ok(1.0));
  assert!(tree.computed().contains(AttributeSet::AREA | AttributeSet::VOLUME));
}

////////////////////////////////////////////////////////////////////////////////
//                                   ERRORS                                   //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn test_missing_prerequisite() {
  let err = TreeBuilder::new_2d().set_attributes(AttributeSet::VOLUME).build().unwrap_err();
  assert_eq!(err, TreeError::MissingPrerequisite { family: "VOLUME", requires: "AREA" });

  let otsu = AttributeSet::AREA | AttributeSet::MEAN_VARIANCE | AttributeSet::OTSU;
  let err = TreeBuilder::new_2d().set_attributes(otsu).build().unwrap_err();
  assert_eq!(err, TreeError::MissingPrerequisite { family: "OTSU", requires: "NEIGHBOURHOOD" });

  let err = TreeBuilder::new_2d()
    .set_attributes(AttributeSet::NEIGHBOURHOOD)
    .set_neighbourhood_radius(0)
    .build()
    .unwrap_err();
  assert!(matches!(err, TreeError::InvalidParameter { name: "neighbourhood_radius", .. }));
}

#[test]
fn test_invalid_input() {
  let err = TreeBuilder::new(Connectivity::from_points(vec![])).build().unwrap_err();
  assert_eq!(err, TreeError::EmptyConnectivity);

  let transform = TreeBuilder::new_2d().build().unwrap();
  assert_eq!(transform.compute(&Grid::<u8>::new([0, 3, 1], 0)).unwrap_err(), TreeError::EmptyGrid);

  assert_eq!(
    Grid::from_vec([2, 2, 1], vec![1u8; 3]).unwrap_err(),
    TreeError::SizeMismatch { expected: 4, actual: 3 }
  );

  let wide = Grid::from_vec([2, 1, 1], vec![0i32, 2_000_000]).unwrap();
  assert!(matches!(transform.compute(&wide), Err(TreeError::LevelRangeTooLarge { .. })));

  //a one-sided connectivity cannot reach the second row
  let right_only = TreeBuilder::new(Connectivity::from_points(vec![[1, 0, 0]])).build().unwrap();
  let flat = Grid::new([2, 2, 1], 3u8);
  assert!(matches!(right_only.compute(&flat), Err(TreeError::InvalidParameter { .. })));
}

#[test]
fn test_extreme_i64_levels() {
  let transform = TreeBuilder::new_2d().build().unwrap();

  //the span of the samples does not fit in an i64
  let span = Grid::from_vec([2, 1, 1], vec![i64::MIN, i64::MAX]).unwrap();
  assert_eq!(
    transform.compute(&span).unwrap_err(),
    TreeError::LevelRangeTooLarge { levels: u64::MAX, max: MAX_LEVELS }
  );
  let half = Grid::from_vec([2, 1, 1], vec![i64::MIN, 0]).unwrap();
  assert!(matches!(transform.compute(&half), Err(TreeError::LevelRangeTooLarge { .. })));

  //a narrow range of huge levels builds, the volume saturates
  let heavy = Grid::from_vec([2, 2, 1], vec![1i64 << 62; 4]).unwrap();
  let tree = transform.compute(&heavy).unwrap();
  let root = tree.node(tree.root().unwrap());
  assert_eq!(root.attributes().area, 4);
  assert_eq!(root.attributes().volume, i64::MAX);

  let mut peaked = vec![i64::MAX - 3; 9];
  peaked[4] = i64::MAX;
  let tree = transform.compute(&Grid::from_vec([3, 3, 1], peaked).unwrap()).unwrap();
  let peak = tree.coord_to_node(1, 1, 0).unwrap();
  assert_eq!(tree.node(peak).attributes().volume, 3);
  assert_eq!(tree.node(tree.root().unwrap()).attributes().volume, i64::MAX);
}

#[test]
fn test_filter_needs_attribute() {
  let mut tree =
    TreeBuilder::new_2d().build().unwrap().compute_array2(scenario_b().view()).unwrap();
  assert_eq!(tree.otsu_filtering(0.0, 1.0), Err(TreeError::AttributeNotComputed(Attribute::Otsu)));
  assert!(tree
    .construct_attribute_image(Attribute::Area, Attribute::Mser, ConstructionRule::Min)
    .is_err());
}

////////////////////////////////////////////////////////////////////////////////
//                            GRID & CONNECTIVITY                             //
////////////////////////////////////////////////////////////////////////////////

#[test]
fn test_connectivity_sizes() {
  assert_eq!(Connectivity::n4_2d().len(), 4);
  assert_eq!(Connectivity::n5_2d().len(), 5);
  assert_eq!(Connectivity::n8_2d().len(), 8);
  assert_eq!(Connectivity::n9_2d().len(), 9);
  assert_eq!(Connectivity::n6_3d().len(), 6);
  assert_eq!(Connectivity::n7_3d().len(), 7);
  assert_eq!(Connectivity::n18_3d().len(), 18);
  assert_eq!(Connectivity::n19_3d().len(), 19);
  assert_eq!(Connectivity::n26_3d().len(), 26);
  assert_eq!(Connectivity::n27_3d().len(), 27);
  assert_eq!(Connectivity::euclidean_ball_2d(2).len(), 13);
  assert_eq!(Connectivity::euclidean_ball_3d(1).len(), 7);
  assert_eq!(Connectivity::axial_segment_3d(2).len(), 5);

  let lopsided = Connectivity::from_points(vec![[-2, 0, 0], [0, 1, 0]]);
  assert_eq!(lopsided.negative_extent(), [2, 0, 0]);
  assert_eq!(lopsided.positive_extent(), [0, 1, 0]);
  assert_eq!(lopsided.symmetric().points(), &[[2, 0, 0], [0, -1, 0]]);
  assert_eq!(lopsided.offsets([10, 10, 1]), vec![-2, 10]);
}

#[test]
fn test_grid_helpers() {
  let mut grid = Grid::from_vec([3, 2, 1], vec![1u8, 2, 3, 4, 5, 6]).unwrap();
  assert_eq!(grid.size(), [3, 2, 1]);
  assert_eq!(grid.offset(2, 1, 0), 5);
  assert_eq!(grid.coord(4), [1, 1, 0]);
  assert_eq!(grid.at(0, 1, 0), Some(4));
  assert_eq!(grid.min_max(), Some((1, 6)));

  let cropped = grid.crop([1, 0, 0], [3, 2, 1]);
  assert_eq!(cropped.as_slice(), &[2, 3, 5, 6]);

  let padded = grid.with_border([1, 1, 0], [1, 0, 0], 0);
  assert_eq!(padded.size(), [5, 3, 1]);
  assert_eq!(padded.at(1, 1, 0), Some(1));
  assert_eq!(padded.crop([1, 1, 0], [4, 3, 1]), grid);

  *grid.at_mut(0, 0, 0).unwrap() = 9;
  grid.set(1, 8);
  assert_eq!(&grid.as_slice()[..2], &[9, 8]);
}

#[test]
fn test_pre_processor() {
  let transform = TreeBuilder::new_2d().build().unwrap();
  let img = nd::array![[f64::NAN, f64::NEG_INFINITY, 0.0], [0.5, 1.0, f64::INFINITY]];
  let levels = transform.pre_processor(img.view());
  assert_eq!(levels, nd::array![[0u16, 0, 1], [32768, u16::MAX - 1, u16::MAX]]);

  //infinities and NaNs do not stop a tree from being built
  let tree = transform.compute_array2(levels.view()).unwrap();
  assert_eq!(tree.node(tree.root().unwrap()).attributes().area, 6);
}
