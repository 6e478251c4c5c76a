//! Benchmarks for grid queries on a 64x64 battle map.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use vtt_combat::battle::{
    find_path, has_line_of_sight, reachable_cells, BattleGrid, FogStore, MovementRules, Terrain,
    VisionSource,
};
use vtt_combat::core::{GridCoord, MapId};

/// Walls every eighth column with a gap that alternates top and bottom
fn maze_grid() -> BattleGrid {
    let mut grid = BattleGrid::new(64, 64, 5.0);
    for x in (8..64).step_by(8) {
        let gap = if (x / 8) % 2 == 0 { 1 } else { 62 };
        for z in 0..64 {
            if z != gap {
                grid.set_terrain(GridCoord::new(x, z), Terrain::Wall);
            }
        }
    }
    for z in (4..64).step_by(16) {
        for x in 0..64 {
            if grid.is_passable(GridCoord::new(x, z)) {
                grid.set_terrain(GridCoord::new(x, z), Terrain::Difficult);
            }
        }
    }
    grid
}

fn bench_find_path(c: &mut Criterion) {
    let open = BattleGrid::new(64, 64, 5.0);
    let maze = maze_grid();

    c.bench_function("find_path_open_64", |b| {
        b.iter(|| {
            let path = find_path(black_box(&open), GridCoord::new(0, 0), GridCoord::new(63, 63));
            black_box(path)
        });
    });

    c.bench_function("find_path_maze_64", |b| {
        b.iter(|| {
            let path = find_path(black_box(&maze), GridCoord::new(0, 32), GridCoord::new(63, 32));
            black_box(path)
        });
    });
}

fn bench_reachable(c: &mut Criterion) {
    let maze = maze_grid();
    let rules = MovementRules::default();

    c.bench_function("reachable_cells_budget_12", |b| {
        b.iter(|| {
            let cells = reachable_cells(black_box(&maze), GridCoord::new(30, 30), 12.0, &rules);
            black_box(cells)
        });
    });
}

fn bench_line_of_sight(c: &mut Criterion) {
    let maze = maze_grid();

    c.bench_function("line_of_sight_row_scan", |b| {
        b.iter(|| {
            let visible = (0..64)
                .filter(|&x| {
                    has_line_of_sight(&maze, GridCoord::new(20, 20), GridCoord::new(x, 63), 400.0)
                })
                .count();
            black_box(visible)
        });
    });
}

fn bench_fog_update(c: &mut Criterion) {
    let maze = maze_grid();
    let id = MapId::new("bench");
    let sources: Vec<_> = (0..6)
        .map(|i| VisionSource::new(format!("s{}", i), GridCoord::new(4 + i * 10, 30), 12.0))
        .collect();

    c.bench_function("fog_update_6_sources", |b| {
        b.iter(|| {
            let mut fog = FogStore::new();
            let _ = fog.set_map(id.clone(), None, 64, 64);
            black_box(fog.update_vision(&id, &sources, Some(&maze)))
        });
    });
}

criterion_group!(
    benches,
    bench_find_path,
    bench_reachable,
    bench_line_of_sight,
    bench_fog_update
);
criterion_main!(benches);
