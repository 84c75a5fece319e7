mod common;

use approx::assert_relative_eq;
use common::{coarse_pixelation, mapping_table, two_taxa_trees, MY};
use stochmap::emit::write_time_slice_speed;
use stochmap::geometry::Pixelation;
use stochmap::params::ReconParams;
use stochmap::sample::reader::read_mapping;
use stochmap::sample::{DistKind, SampleIndex};
use stochmap::speed::time_slice_stats;
use stochmap::stages::StageTable;
use stochmap::topology::{TimeTree, TreeSet};

#[test]
fn test_slice_speed_uses_summed_branch_length() {
    // root 0 at 5 My; node 1 lives 5 My, node 2 (a fossil tip at 2 My) lives 3 My
    let mut t = TimeTree::new("fossils", 0, 5 * MY);
    t.add_node(1, 0, 0).unwrap();
    t.add_node(2, 0, 2 * MY).unwrap();
    let mut trees = TreeSet::new();
    trees.insert(t);

    let mut index = SampleIndex::new();
    {
        let tree = index.tree_or_insert("fossils");
        for p in 0..10 {
            tree.particles.insert(p);
            tree.node_or_insert(1)
                .stage_or_insert(5 * MY, DistKind::Freq)
                .moves
                .insert(p, 2.0);
            tree.node_or_insert(2)
                .stage_or_insert(5 * MY, DistKind::Freq)
                .moves
                .insert(p, 1.0);
        }
    }
    index.finish();

    let stages = StageTable::new([0, 10 * MY]);
    let slices = time_slice_stats(&index, &trees, &stages);
    assert_eq!(slices.len(), 1);

    let s = &slices[0];
    assert_eq!(s.stage, 10 * MY);
    assert_relative_eq!(s.branch_length, 8.0);
    assert_eq!(s.distance.median, 3.0);
    assert_relative_eq!(s.speed, 3.0 / 8.0);
}

#[test]
fn test_slices_without_moves_are_reported() {
    let pix = coarse_pixelation();
    let trees = two_taxa_trees();
    let table = mapping_table(4, 100, 105);
    let index = read_mapping(table.as_bytes(), "map.tab", &pix, Some(&trees)).unwrap();

    // every move starts at 10 My; the 5 My slice is only crossed
    let stages = StageTable::new([0, 5 * MY, 10 * MY]);
    let slices = time_slice_stats(&index, &trees, &stages);
    let ages: Vec<_> = slices.iter().map(|s| s.stage).collect();
    assert_eq!(ages, vec![10 * MY, 5 * MY]);

    let old = &slices[0];
    assert_relative_eq!(old.branch_length, 10.0);
    assert_eq!(old.particles, 4);
    assert_eq!(old.distance.median, pix.distance(100, 105));

    let young = &slices[1];
    assert_relative_eq!(young.branch_length, 10.0);
    assert_eq!(young.distance.median, 0.0);
    assert_eq!(young.speed, 0.0);

    let params = ReconParams::builder().earth_radius_km(1.0).build().unwrap();
    let mut buf = Vec::new();
    assert_eq!(
        write_time_slice_speed(&mut buf, &slices, &params, &[]).unwrap(),
        2
    );
    let text = String::from_utf8(buf).unwrap();
    let rows: Vec<&str> = text.lines().skip(1).collect();
    assert!(rows[0].starts_with("two taxa\t10.000\t"));
    assert!(rows[1].starts_with("two taxa\t5.000\t0.000000\t"));
}
