mod common;

use approx::assert_relative_eq;
use common::{coarse_pixelation, mapping_table, two_taxa_trees, MY};
use stochmap::emit::write_branch_speed;
use stochmap::geometry::Pixelation;
use stochmap::params::ReconParams;
use stochmap::sample::reader::read_mapping;
use stochmap::speed::branch_stats;
use stochmap::topology::TreeLookup;

#[test]
fn test_constant_move_over_ten_million_years() {
    let pix = coarse_pixelation();
    let trees = two_taxa_trees();
    let table = mapping_table(10, 100, 105);
    let index = read_mapping(table.as_bytes(), "map.tab", &pix, Some(&trees)).unwrap();

    let params = ReconParams::builder()
        .null_particles(200)
        .seed(42)
        .build()
        .unwrap();
    let stats = branch_stats(&index, &trees, &pix, &params).unwrap();
    assert_eq!(stats.len(), 2);

    let d = pix.distance(100, 105);
    assert!(d > 0.0);

    let b1 = &stats[0];
    assert_eq!(b1.node, 1);
    assert_eq!(b1.particles, 10);
    assert_eq!(b1.distance.median, d);
    assert_eq!(b1.distance.q025, d);
    assert_eq!(b1.distance.q975, d);
    assert_eq!(b1.geographic.median, d);
    assert_relative_eq!(b1.branch_length, 10.0);
    assert_relative_eq!(b1.speed, d / 10.0);

    // category weights drive the null model
    let null = b1.null.unwrap();
    assert!(null.x005 <= null.x095);
    assert!((0.0..=1.0).contains(&b1.slower));
    assert!((0.0..=1.0).contains(&b1.faster));

    let b2 = &stats[1];
    assert_eq!(b2.node, 2);
    assert_eq!(b2.distance.median, 0.0);
    assert_eq!(b2.speed, 0.0);
    assert_eq!(b2.faster, 0.0);
}

#[test]
fn test_branch_analysis_is_deterministic() {
    let pix = coarse_pixelation();
    let trees = two_taxa_trees();
    let table = mapping_table(25, 12, 140);
    let index = read_mapping(table.as_bytes(), "map.tab", &pix, Some(&trees)).unwrap();
    let params = ReconParams::builder()
        .null_lambda(20.0)
        .null_particles(100)
        .build()
        .unwrap();

    let a = branch_stats(&index, &trees, &pix, &params).unwrap();
    let b = branch_stats(&index, &trees, &pix, &params).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_branch_report() {
    let pix = coarse_pixelation();
    let trees = two_taxa_trees();
    assert_eq!(trees.branch_length("two taxa", 1), Some(10 * MY));

    let table = mapping_table(10, 100, 105);
    let index = read_mapping(table.as_bytes(), "map.tab", &pix, Some(&trees)).unwrap();
    let params = ReconParams::builder()
        .null_particles(0)
        .earth_radius_km(6371.0)
        .build()
        .unwrap();
    let stats = branch_stats(&index, &trees, &pix, &params).unwrap();

    let mut buf = Vec::new();
    let rows = write_branch_speed(&mut buf, &stats, &params, &["branch speed"]).unwrap();
    assert_eq!(rows, 2);

    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines[0], "# branch speed");
    assert!(lines[1].starts_with("tree\tnode\tdistance\td-025\td-975\tbrLen\tx-005\tx-095"));

    let fields: Vec<&str> = lines[2].split('\t').collect();
    assert_eq!(fields[0], "two taxa");
    assert_eq!(fields[1], "1");
    let km: f64 = fields[2].parse().unwrap();
    assert_relative_eq!(km, pix.distance(100, 105) * 6371.0, epsilon = 1e-6);
    let speed: f64 = fields[10].parse().unwrap();
    assert_relative_eq!(speed, km / 10.0, epsilon = 1e-6);
    assert_eq!(fields[6], "NaN");
}
