//! A* pathfinding for battle grids
//!
//! 8-connected, cost-aware. Step cost is the base step (orthogonal 1,
//! diagonal per `DiagonalRule`) times the target cell's cost times the
//! elevation multiplier. Ties between equal `f` scores go to the node queued
//! first, and neighbors are always queued in `NEIGHBOR_OFFSETS` order, so the
//! result is deterministic.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use ahash::{AHashMap, AHashSet};
use ordered_float::OrderedFloat;

use crate::battle::battle_map::BattleGrid;
use crate::battle::grid::{neighbors, DiagonalRule};
use crate::core::config::CombatConfig;
use crate::core::types::GridCoord;

/// Movement pricing used by the pathfinder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementRules {
    pub diagonal_rule: DiagonalRule,
    pub elevation_cost_factor: f32,
}

impl Default for MovementRules {
    fn default() -> Self {
        Self {
            diagonal_rule: DiagonalRule::Octile,
            elevation_cost_factor: 1.0,
        }
    }
}

impl MovementRules {
    pub fn from_config(config: &CombatConfig) -> Self {
        Self {
            diagonal_rule: config.diagonal_rule,
            elevation_cost_factor: config.elevation_cost_factor,
        }
    }
}

/// Node in the A* open set
#[derive(Debug, Clone, Copy)]
struct PathNode {
    coord: GridCoord,
    f_cost: OrderedFloat<f32>,
    seq: u64,
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; earlier insertion wins ties
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cost of stepping from `from` onto the adjacent cell `to`
///
/// `None` when the step is illegal: out of bounds, impassable target, not
/// adjacent, or a diagonal squeezing between two blocked cells.
pub fn step_cost(
    grid: &BattleGrid,
    from: GridCoord,
    to: GridCoord,
    rules: &MovementRules,
) -> Option<f32> {
    if !from.is_adjacent(&to) {
        return None;
    }
    let target = grid.cell(to)?;
    if !target.is_passable() {
        return None;
    }

    let diagonal = from.x != to.x && from.z != to.z;
    if diagonal {
        let side_a = GridCoord::new(to.x, from.z);
        let side_b = GridCoord::new(from.x, to.z);
        if !grid.is_passable(side_a) && !grid.is_passable(side_b) {
            return None;
        }
    }

    let climb = grid.elevation_difference(from, to).abs();
    let elevation_multiplier = 1.0 + rules.elevation_cost_factor * climb;

    Some(rules.diagonal_rule.step_cost(from, to) * target.cost * elevation_multiplier)
}

/// Find path with default movement rules
pub fn find_path(grid: &BattleGrid, start: GridCoord, goal: GridCoord) -> Option<Vec<GridCoord>> {
    find_path_with(grid, start, goal, &MovementRules::default())
}

/// Find the cheapest path from `start` to `goal`, both inclusive
///
/// Returns None when either end is off the grid or the goal is unreachable.
pub fn find_path_with(
    grid: &BattleGrid,
    start: GridCoord,
    goal: GridCoord,
    rules: &MovementRules,
) -> Option<Vec<GridCoord>> {
    if !grid.in_bounds(start) || !grid.in_bounds(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }
    if !grid.is_passable(goal) {
        return None;
    }

    let heuristic_scale = grid.min_passable_cost();
    let heuristic =
        |coord: GridCoord| rules.diagonal_rule.distance(coord, goal) * heuristic_scale;

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<GridCoord, GridCoord> = AHashMap::new();
    let mut g_scores: AHashMap<GridCoord, f32> = AHashMap::new();
    let mut closed: AHashSet<GridCoord> = AHashSet::new();
    let mut seq = 0u64;

    g_scores.insert(start, 0.0);
    open_set.push(PathNode {
        coord: start,
        f_cost: OrderedFloat(heuristic(start)),
        seq,
    });

    while let Some(current) = open_set.pop() {
        if current.coord == goal {
            return Some(reconstruct_path(&came_from, current.coord));
        }
        if !closed.insert(current.coord) {
            continue;
        }

        let current_g = *g_scores.get(&current.coord).unwrap_or(&f32::INFINITY);

        for neighbor in neighbors(current.coord) {
            if closed.contains(&neighbor) {
                continue;
            }
            let Some(move_cost) = step_cost(grid, current.coord, neighbor, rules) else {
                continue;
            };

            let tentative_g = current_g + move_cost;
            let neighbor_g = *g_scores.get(&neighbor).unwrap_or(&f32::INFINITY);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.coord);
                g_scores.insert(neighbor, tentative_g);

                seq += 1;
                open_set.push(PathNode {
                    coord: neighbor,
                    f_cost: OrderedFloat(tentative_g + heuristic(neighbor)),
                    seq,
                });
            }
        }
    }

    None // No path found
}

/// Reconstruct path from came_from map
fn reconstruct_path(
    came_from: &AHashMap<GridCoord, GridCoord>,
    mut current: GridCoord,
) -> Vec<GridCoord> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Total cost of walking a path (the starting cell is free)
///
/// Infinite if any step is illegal.
pub fn path_cost(grid: &BattleGrid, path: &[GridCoord], rules: &MovementRules) -> f32 {
    path.windows(2)
        .map(|step| step_cost(grid, step[0], step[1], rules).unwrap_or(f32::INFINITY))
        .sum()
}

/// Every cell reachable from `start` within a cost budget, with its cost
///
/// Sorted by cost, then coordinate. The start cell is not included.
pub fn reachable_cells(
    grid: &BattleGrid,
    start: GridCoord,
    budget: f32,
    rules: &MovementRules,
) -> Vec<(GridCoord, f32)> {
    if !grid.in_bounds(start) {
        return Vec::new();
    }

    let mut costs: AHashMap<GridCoord, f32> = AHashMap::new();
    let mut open_set = BinaryHeap::new();
    let mut seq = 0u64;

    costs.insert(start, 0.0);
    open_set.push(PathNode {
        coord: start,
        f_cost: OrderedFloat(0.0),
        seq,
    });

    while let Some(current) = open_set.pop() {
        let current_cost = current.f_cost.into_inner();
        if current_cost > *costs.get(&current.coord).unwrap_or(&f32::INFINITY) {
            continue;
        }

        for neighbor in neighbors(current.coord) {
            let Some(move_cost) = step_cost(grid, current.coord, neighbor, rules) else {
                continue;
            };
            let new_cost = current_cost + move_cost;
            if new_cost > budget {
                continue;
            }
            if new_cost < *costs.get(&neighbor).unwrap_or(&f32::INFINITY) {
                costs.insert(neighbor, new_cost);
                seq += 1;
                open_set.push(PathNode {
                    coord: neighbor,
                    f_cost: OrderedFloat(new_cost),
                    seq,
                });
            }
        }
    }

    let mut reachable: Vec<(GridCoord, f32)> = costs
        .into_iter()
        .filter(|(coord, _)| *coord != start)
        .collect();
    reachable.sort_by(|a, b| {
        OrderedFloat(a.1)
            .cmp(&OrderedFloat(b.1))
            .then_with(|| a.0.cmp(&b.0))
    });
    reachable
}

/// Cells reachable from `start` in at most `steps` legal steps
///
/// Terrain cost is ignored; this mirrors how the movement budget is counted.
/// Sorted by coordinate, start excluded.
pub fn cells_within_steps(
    grid: &BattleGrid,
    start: GridCoord,
    steps: u32,
    rules: &MovementRules,
) -> Vec<GridCoord> {
    if !grid.in_bounds(start) {
        return Vec::new();
    }

    let mut seen: AHashSet<GridCoord> = AHashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start);
    queue.push_back((start, 0u32));

    while let Some((current, depth)) = queue.pop_front() {
        if depth == steps {
            continue;
        }
        for neighbor in neighbors(current) {
            if seen.contains(&neighbor) || step_cost(grid, current, neighbor, rules).is_none() {
                continue;
            }
            seen.insert(neighbor);
            queue.push_back((neighbor, depth + 1));
        }
    }

    let mut cells: Vec<GridCoord> = seen.into_iter().filter(|c| *c != start).collect();
    cells.sort();
    cells
}
