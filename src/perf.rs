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

#[derive(Clone, Debug, Default)]
pub struct PerfReport {
  pub pixels: usize,
  pub levels: usize,
  pub nodes: usize,
  pub flood_ms: usize,
  pub attribute_mus: Vec<(&'static str, usize)>,
  pub total_ms: usize,
}

impl PerfReport {
  pub fn attribute_total(&self) -> f64 {
    self.attribute_mus.iter().map(|&(_, t)| t as f64).sum()
  }
}

impl std::fmt::Display for PerfReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, ">---------[Performance Summary]---------")?;
    writeln!(f, ">  {} px, {} levels -> {} nodes", self.pixels, self.levels, self.nodes)?;
    writeln!(f, ">  Flooding: {}ms", self.flood_ms)?;
    for (name, mus) in &self.attribute_mus {
      writeln!(f, ">  Attributes[{name}]: {mus}µs")?;
    }
    writeln!(f, ">--------------------------------+ total")?;
    writeln!(
      f,
      ">  {}ms with {:.1}ms overhead (Δt)",
      self.total_ms,
      self.total_ms as f64 - self.flood_ms as f64 - self.attribute_total() / 1000.0
    )
  }
}
