use ranging_mds::graph_drawer::MAX_LINK_SEARCH_NEIGHBORS;
use ranging_mds::{
    resolve_distances_drop_worst_link, resolve_distances_drop_worst_neighbor, Config, EntryTable,
    NodeId, Pipeline,
};

fn euclid(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Caller 0 at the origin surrounded by honest neighbors; node 5 claims to be
/// 1.0 away from everyone.
fn table_with_liar() -> EntryTable {
    let points = [(0.0, 0.0), (6.0, 0.0), (5.0, 5.0), (-1.0, 7.0), (-6.0, 2.0), (2.0, -7.0)];
    let mut t = EntryTable::new();
    for (i, &p) in points.iter().enumerate() {
        for (j, &q) in points.iter().enumerate() {
            if i == j {
                continue;
            }
            let d = if i == 5 { 1.0 } else { euclid(p, q) };
            t.insert(i as NodeId, j as NodeId, d);
        }
    }
    t
}

#[test]
fn drop_neighbor_scores_every_neighbor_and_restores_raw_distance() {
    let table = table_with_liar();
    let before = table.clone();
    let out = resolve_distances_drop_worst_neighbor(0, &table, &Config::default()).unwrap();

    assert_eq!(out.scores.len(), 5);
    let ids: Vec<NodeId> = out.scores.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert!(out.scores.iter().all(|(_, s)| s.is_finite() && *s >= 0.0));

    let worst = out.worst_neighbor.unwrap();
    let max_score = out.scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    let worst_score = out.scores.iter().find(|(id, _)| *id == worst).unwrap().1;
    assert_eq!(worst_score, max_score);

    assert_eq!(out.distances.len(), 5);
    assert_eq!(out.distances[&worst], table.get(0, worst).unwrap());
    assert_eq!(table, before);
}

#[test]
fn drop_link_considers_each_reported_neighbor_pair_once() {
    let table = table_with_liar();
    let out = resolve_distances_drop_worst_link(0, &table, &Config::default()).unwrap();

    // 5 neighbors -> 10 unordered pairs, all reported.
    assert_eq!(out.scores.len(), 10);
    for ((a, b), score) in &out.scores {
        assert!(a < b);
        assert!(score.is_finite());
    }
    let (a, b) = out.worst_link.unwrap();
    assert!(a != 0 && b != 0);
    assert_eq!(out.distances.len(), 5);
}

#[test]
fn drop_link_without_links_between_neighbors_keeps_baseline() {
    // Star: neighbors only report the caller.
    let mut t = EntryTable::new();
    for (id, d) in [(1, 3.0), (2, 4.0), (3, 5.0)] {
        t.insert(0, id, d);
        t.insert(id, 0, d);
    }
    let out = resolve_distances_drop_worst_link(0, &t, &Config::default()).unwrap();
    assert!(out.worst_link.is_none());
    assert!(out.scores.is_empty());
}

#[test]
fn link_search_rejects_oversized_neighborhoods() {
    let mut t = EntryTable::new();
    let n = MAX_LINK_SEARCH_NEIGHBORS as NodeId + 2;
    for id in 1..n {
        let d = 1.0 + id as f64;
        t.insert(0, id, d);
        t.insert(id, 0, d);
    }
    let err = resolve_distances_drop_worst_link(0, &t, &Config::default()).unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[test]
fn pipeline_dispatch_reports_what_was_dropped() {
    let table = table_with_liar();
    let cfg = Config::default();
    let r = Pipeline::DropWorstNeighbor.run(0, &table, &cfg).unwrap();
    assert_eq!(r.dropped.as_ref().map(Vec::len), Some(1));
    let r = Pipeline::DropWorstLink.run(0, &table, &cfg).unwrap();
    assert_eq!(r.dropped.as_ref().map(Vec::len), Some(2));
}
