#![allow(dead_code)]

use stochmap::constants::{Years, YEARS_PER_MY};
use stochmap::geometry::pixelation::IsoPixelation;
use stochmap::topology::TreeSet;

pub const MY: Years = YEARS_PER_MY as Years;

/// Coarse pixelation (184 pixels), enough for table-level tests.
pub fn coarse_pixelation() -> IsoPixelation {
    IsoPixelation::new(24).expect("valid equator")
}

/// `Two Taxa`: root 0 at 10 My with tips 1 and 2 at the present.
pub fn two_taxa_trees() -> TreeSet {
    let data = format!(
        "# tree\tnode\tparent\tage\r\n\
         tree\tnode\tparent\tage\r\n\
         Two Taxa\t0\t-1\t{}\r\n\
         Two Taxa\t1\t0\t0\r\n\
         Two Taxa\t2\t0\t0\r\n",
        10 * MY
    );
    TreeSet::from_reader(data.as_bytes(), "trees.tab").expect("valid topology")
}

/// Stochastic-mapping table: on the branch to node 1 every particle moves `from → to` once, at
/// the root age; on the branch to node 2 every particle stays on `from`.
pub fn mapping_table(particles: u32, from: u32, to: u32) -> String {
    let mut s = String::from("# stochastic mapping\r\n");
    s.push_str("tree\tnode\tparticle\tage\tequator\tfrom\tto\tcat\tlambda\r\n");
    for p in 0..particles {
        s.push_str(&format!(
            "Two Taxa\t1\t{p}\t{}\t24\t{from}\t{to}\t0\t50\r\n",
            10 * MY
        ));
        s.push_str(&format!(
            "Two Taxa\t2\t{p}\t{}\t24\t{from}\t{from}\t0\t50\r\n",
            10 * MY
        ));
    }
    s
}
