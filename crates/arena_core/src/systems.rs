//! Movement and targeting systems.
//!
//! Pure functions over unit and tower data. The unit state machine in
//! [`crate::units`] calls into these; the engine exposes
//! [`find_closest_enemy`] directly.
//!
//! All math is fixed-point and iteration order follows entity ids, so the
//! same inputs always pick the same target and the same path.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::components::{EntityId, TargetRef};
use crate::grid::{FlaggedCells, Footprint, GridConfig};
use crate::math::{Fixed, GridPos};
use crate::towers::Tower;
use crate::units::Unit;

/// A potential target and how far away it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// What to attack.
    pub target: TargetRef,
    /// Where it is.
    pub position: GridPos,
    /// Centre-to-centre distance from the attacker.
    pub distance: Fixed,
}

/// Whether `attacker` may pick `enemy` as a unit target.
///
/// Ground attackers cannot hit flying units and only engage units on
/// their own side of the frontier.
#[must_use]
pub fn can_target_unit(attacker: &Unit, enemy: &Unit, grid: &GridConfig) -> bool {
    if enemy.team == attacker.team || !enemy.is_alive() {
        return false;
    }
    if attacker.stats.flying {
        return true;
    }
    !enemy.stats.flying && grid.side_of(attacker.position) == grid.side_of(enemy.position)
}

fn closer(best: Option<Candidate>, candidate: Candidate) -> Option<Candidate> {
    match best {
        Some(current) if current.distance <= candidate.distance => Some(current),
        _ => Some(candidate),
    }
}

/// Nearest enemy for a unit that is allowed to attack anything.
///
/// Every living enemy tower is a candidate regardless of activation;
/// enemy units are filtered by [`can_target_unit`]. Towers are scanned
/// first, so an exact tie goes to the tower.
#[must_use]
pub fn find_closest_enemy(
    attacker: &Unit,
    units: &BTreeMap<EntityId, Unit>,
    towers: &BTreeMap<EntityId, Tower>,
    grid: &GridConfig,
) -> Option<Candidate> {
    let mut best = None;

    for tower in towers.values() {
        if tower.team == attacker.team || !tower.is_alive {
            continue;
        }
        best = closer(
            best,
            Candidate {
                target: TargetRef::Structure(tower.id),
                position: tower.position,
                distance: attacker.position.distance(tower.position),
            },
        );
    }

    for enemy in units.values() {
        if enemy.id == attacker.id || !can_target_unit(attacker, enemy, grid) {
            continue;
        }
        best = closer(
            best,
            Candidate {
                target: TargetRef::Unit(enemy.id),
                position: enemy.position,
                distance: attacker.position.distance(enemy.position),
            },
        );
    }

    best
}

/// Nearest living, active enemy tower. Used by buildings-only units.
#[must_use]
pub fn nearest_active_structure(
    attacker: &Unit,
    towers: &BTreeMap<EntityId, Tower>,
) -> Option<Candidate> {
    towers
        .values()
        .filter(|tower| tower.team != attacker.team && tower.is_alive && tower.active)
        .fold(None, |best, tower| {
            closer(
                best,
                Candidate {
                    target: TargetRef::Structure(tower.id),
                    position: tower.position,
                    distance: attacker.position.distance(tower.position),
                },
            )
        })
}

/// Where a mover is heading and when it counts as arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    /// Point being approached.
    pub point: GridPos,
    /// Stop once within this distance of `point`.
    pub stop_range: Option<Fixed>,
    /// Ground movers also arrive when touching this footprint.
    pub footprint: Option<Footprint>,
}

impl Destination {
    /// Walk onto `point` itself.
    #[must_use]
    pub const fn point(point: GridPos) -> Self {
        Self {
            point,
            stop_range: None,
            footprint: None,
        }
    }

    /// Stop within `range` of `point`, or next to `footprint`.
    #[must_use]
    pub const fn within(point: GridPos, range: Fixed, footprint: Option<Footprint>) -> Self {
        Self {
            point,
            stop_range: Some(range),
            footprint,
        }
    }

    /// Whether a mover at `pos` is close enough to stop.
    #[must_use]
    pub fn reached(&self, pos: GridPos) -> bool {
        self.stop_range
            .is_some_and(|range| pos.distance(self.point) <= range)
            || self.footprint.is_some_and(|footprint| footprint.touches(pos))
    }

    /// Whether standing somewhere in `cell` is good enough to finish the
    /// approach without leaving it.
    fn accepts(&self, cell: (i32, i32)) -> bool {
        cell == self.point.floor_cell()
            || self
                .footprint
                .is_some_and(|footprint| footprint.touches_cell(cell.0, cell.1))
            || self
                .stop_range
                .is_some_and(|range| cell_centre(cell).distance(self.point) <= range)
    }

    /// Where a mover already inside an accepting cell should go.
    fn anchor(&self, cell: (i32, i32)) -> GridPos {
        if cell == self.point.floor_cell() {
            self.point
        } else {
            cell_centre(cell)
        }
    }

    /// Point on the way in where the mover should stop.
    fn stop_point(&self, from: GridPos) -> GridPos {
        let Some(range) = self.stop_range else {
            return self.point;
        };
        let rest = (range - arrival_epsilon()).max(arrival_epsilon());
        let distance = from.distance(self.point);
        if distance <= rest {
            return from;
        }
        from.step_toward(self.point, distance - rest)
    }
}

/// Result of one movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Position after the step.
    pub position: GridPos,
    /// The step ended where the destination counts as reached.
    pub in_reach: bool,
}

/// How far inside the stop range a mover halts.
fn arrival_epsilon() -> Fixed {
    Fixed::from_num(1) / Fixed::from_num(10)
}

fn cell_centre((row, col): (i32, i32)) -> GridPos {
    let half = Fixed::from_num(0.5);
    GridPos::new(Fixed::from_num(row) + half, Fixed::from_num(col) + half)
}

/// Move `from` toward `destination` by at most `step` cells.
///
/// Flying movers and ground movers with a clear line go straight for the
/// stop point. Otherwise ground movers follow [`detour`] one cell at a
/// time and hold position when no route exists.
#[must_use]
pub fn advance(
    from: GridPos,
    destination: &Destination,
    step: Fixed,
    ground: bool,
    flagged: &FlaggedCells,
    grid: &GridConfig,
) -> Advance {
    if destination.reached(from) {
        return Advance {
            position: from,
            in_reach: true,
        };
    }

    let stop = destination.stop_point(from);
    let waypoint = if !ground || segment_clear(from, stop, flagged) {
        stop
    } else {
        match detour(from, destination, flagged, grid) {
            Some(waypoint) => waypoint,
            None => {
                return Advance {
                    position: from,
                    in_reach: false,
                }
            }
        }
    };

    let position = grid.clamp(from.step_toward(waypoint, step));
    Advance {
        position,
        in_reach: destination.reached(position),
    }
}

/// Whether the straight segment from `from` to `to` stays out of flagged
/// cells.
///
/// Walks every cell the segment passes through. A segment running exactly
/// through a cell corner also checks both cells beside the corner.
#[must_use]
pub fn segment_clear(from: GridPos, to: GridPos, flagged: &FlaggedCells) -> bool {
    let (mut row, mut col) = from.floor_cell();
    let (end_row, end_col) = to.floor_cell();
    if flagged.is_flagged(row, col) {
        return false;
    }

    let d_row = to.row - from.row;
    let d_col = to.col - from.col;
    let step_row = axis_sign(d_row);
    let step_col = axis_sign(d_col);
    let mut t_row = first_crossing(from.row, row, d_row);
    let mut t_col = first_crossing(from.col, col, d_col);
    let delta_row = per_cell(d_row);
    let delta_col = per_cell(d_col);

    let limit = (end_row - row).abs() + (end_col - col).abs();
    for _ in 0..limit {
        if (row, col) == (end_row, end_col) || t_row.min(t_col) > Fixed::ONE {
            break;
        }
        if t_row < t_col {
            row += step_row;
            t_row = t_row.saturating_add(delta_row);
        } else if t_col < t_row {
            col += step_col;
            t_col = t_col.saturating_add(delta_col);
        } else {
            if flagged.is_flagged(row + step_row, col) || flagged.is_flagged(row, col + step_col) {
                return false;
            }
            row += step_row;
            col += step_col;
            t_row = t_row.saturating_add(delta_row);
            t_col = t_col.saturating_add(delta_col);
        }
        if flagged.is_flagged(row, col) {
            return false;
        }
    }
    !flagged.is_flagged(end_row, end_col)
}

fn axis_sign(delta: Fixed) -> i32 {
    if delta > Fixed::ZERO {
        1
    } else if delta < Fixed::ZERO {
        -1
    } else {
        0
    }
}

/// Segment parameter at which the first cell boundary on this axis is hit.
fn first_crossing(start: Fixed, cell: i32, delta: Fixed) -> Fixed {
    if delta == Fixed::ZERO {
        return Fixed::MAX;
    }
    let boundary = if delta > Fixed::ZERO {
        Fixed::from_num(cell + 1) - start
    } else {
        start - Fixed::from_num(cell)
    };
    boundary.saturating_div(delta.abs())
}

/// Segment parameter covered by one whole cell on this axis.
fn per_cell(delta: Fixed) -> Fixed {
    if delta == Fixed::ZERO {
        Fixed::MAX
    } else {
        Fixed::ONE.saturating_div(delta.abs())
    }
}

/// Next waypoint on the shortest cell route around flagged cells.
///
/// Breadth-first search over 4-connected cells from the one containing
/// `from` to the nearest cell that [`Destination`] accepts. Movers may
/// leave a flagged cell but never enter one. Neighbours are tried along
/// the dominant travel axis first, then sideways away from the local
/// obstacle centre (see [`FlaggedCells::centroid_near`]), so equally short
/// routes go round the far side of whatever is in the way.
///
/// Returns the centre of the first cell on the route, or `None` when
/// every accepting cell is walled off.
#[must_use]
pub fn detour(
    from: GridPos,
    destination: &Destination,
    flagged: &FlaggedCells,
    grid: &GridConfig,
) -> Option<GridPos> {
    let start = from.floor_cell();
    if destination.accepts(start) && !flagged.is_flagged(start.0, start.1) {
        return Some(destination.anchor(start));
    }

    let order = neighbour_order(from, destination.point, flagged);
    let mut parents: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    parents.insert(start, start);
    let mut queue = VecDeque::from([start]);

    while let Some(cell) = queue.pop_front() {
        let inside = flagged.is_flagged(cell.0, cell.1);
        for (d_row, d_col) in order {
            let next = (cell.0 + d_row, cell.1 + d_col);
            if parents.contains_key(&next) || !grid.contains_cell(next.0, next.1) {
                continue;
            }
            let blocked = flagged.is_flagged(next.0, next.1);
            if blocked && !inside {
                continue;
            }
            parents.insert(next, cell);
            if !blocked && destination.accepts(next) {
                return Some(cell_centre(first_hop(&parents, start, next)));
            }
            queue.push_back(next);
        }
    }
    None
}

fn first_hop(
    parents: &HashMap<(i32, i32), (i32, i32)>,
    start: (i32, i32),
    goal: (i32, i32),
) -> (i32, i32) {
    let mut current = goal;
    while let Some(&parent) = parents.get(&current) {
        if parent == start {
            break;
        }
        current = parent;
    }
    current
}

fn neighbour_order(from: GridPos, to: GridPos, flagged: &FlaggedCells) -> [(i32, i32); 4] {
    let d_row = to.row - from.row;
    let d_col = to.col - from.col;
    let centre = flagged.centroid_near(from);

    if d_row.abs() > d_col.abs() {
        let ahead = if d_row >= Fixed::ZERO { 1 } else { -1 };
        let side = match centre {
            Some(centre) if from.col < centre.col => -1,
            _ => 1,
        };
        [(ahead, 0), (0, side), (0, -side), (-ahead, 0)]
    } else {
        let ahead = if d_col >= Fixed::ZERO { 1 } else { -1 };
        let side = match centre {
            Some(centre) if from.row < centre.row => -1,
            _ => 1,
        };
        [(0, ahead), (side, 0), (-side, 0), (0, -ahead)]
    }
}
