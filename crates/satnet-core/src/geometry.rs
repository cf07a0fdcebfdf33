//! Torus cell geometry
//!
//! Satellites are placed on a routing torus by two phase angles: `alpha`
//! (right ascension of the orbital plane, across orbits) and `gamma`
//! (argument of latitude, along the orbit). Each axis is cut into
//! `count * scale` cells, so one satellite spacing spans `scale` cells.
//!
//! Everything here is a pure function of its inputs.

use serde::{Deserialize, Serialize};

/// Cells per satellite spacing used unless configured otherwise
pub const DEFAULT_CELL_SCALE: u32 = 5;

/// Wrap an angle into `[0, 360)`, treating values within float noise of a
/// full turn as zero
pub fn wrap_degrees(angle_deg: f64) -> f64 {
    let wrapped = angle_deg.rem_euclid(360.0);
    if 360.0 - wrapped < 1e-9 { 0.0 } else { wrapped }
}

/// Map an angle in degrees to a cell on an axis of `base` cells.
///
/// The angle is normalised into `[0, 360)` first; a rounded result equal to
/// `base` is clamped to `base - 1`.
pub fn quantize(angle_deg: f64, base: u32) -> u32 {
    if base == 0 {
        return 0;
    }
    let angle = wrap_degrees(angle_deg);
    let cell = (angle * base as f64 / 360.0).round() as u32;
    cell.min(base - 1)
}

/// Shortest distance between two cells on a ring of `base` cells
pub fn modular_distance(a: u32, b: u32, base: u32) -> u32 {
    let d = a.abs_diff(b);
    d.min(base.saturating_sub(d))
}

/// Which way round the ring is shorter from `a` to `b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Decrease,
    Hold,
    Increase,
}

impl Step {
    pub fn sign(self) -> i8 {
        match self {
            Step::Decrease => -1,
            Step::Hold => 0,
            Step::Increase => 1,
        }
    }
}

/// Direction of the shorter arc from `a` to `b`.
///
/// When both arcs are equally long the step goes against the numeric
/// difference: decreasing when `a < b`, increasing when `a > b`.
pub fn step_sign(a: u32, b: u32, base: u32) -> Step {
    if a == b {
        return Step::Hold;
    }
    let d = a.abs_diff(b);
    let shorter_direct = d < base.saturating_sub(d);
    match (a < b, shorter_direct) {
        (true, true) | (false, false) => Step::Increase,
        (true, false) | (false, true) => Step::Decrease,
    }
}

/// Continuous phase of a node, both angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasePair {
    pub alpha_deg: f64,
    pub gamma_deg: f64,
}

impl PhasePair {
    pub fn new(alpha_deg: f64, gamma_deg: f64) -> Self {
        Self {
            alpha_deg,
            gamma_deg,
        }
    }

    /// Both angles wrapped into `[0, 360)`
    pub fn normalized(self) -> Self {
        Self {
            alpha_deg: wrap_degrees(self.alpha_deg),
            gamma_deg: wrap_degrees(self.gamma_deg),
        }
    }

    pub fn offset(self, d_alpha: f64, d_gamma: f64) -> Self {
        Self::new(self.alpha_deg + d_alpha, self.gamma_deg + d_gamma).normalized()
    }
}

/// Discretised torus coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub alpha: u32,
    pub gamma: u32,
}

impl Cell {
    pub fn new(alpha: u32, gamma: u32) -> Self {
        Self { alpha, gamma }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.alpha, self.gamma)
    }
}

/// Per-axis modular distance between two cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellDistance {
    pub alpha: u32,
    pub gamma: u32,
}

/// Shape of the routing torus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorusDims {
    pub orbits: u32,
    pub sats_per_orbit: u32,
    pub scale: u32,
}

impl TorusDims {
    pub fn new(orbits: u32, sats_per_orbit: u32, scale: u32) -> Self {
        Self {
            orbits,
            sats_per_orbit,
            scale,
        }
    }

    pub fn alpha_base(&self) -> u32 {
        self.orbits * self.scale
    }

    pub fn gamma_base(&self) -> u32 {
        self.sats_per_orbit * self.scale
    }

    /// Angular spacing between adjacent orbital planes
    pub fn plane_spacing_deg(&self) -> f64 {
        360.0 / self.orbits.max(1) as f64
    }

    /// Angular spacing between adjacent satellites in a plane
    pub fn slot_spacing_deg(&self) -> f64 {
        360.0 / self.sats_per_orbit.max(1) as f64
    }

    pub fn cell_of(&self, phase: PhasePair) -> Cell {
        Cell {
            alpha: quantize(phase.alpha_deg, self.alpha_base()),
            gamma: quantize(phase.gamma_deg, self.gamma_base()),
        }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.alpha < self.alpha_base() && cell.gamma < self.gamma_base()
    }

    pub fn distance(&self, from: Cell, to: Cell) -> CellDistance {
        CellDistance {
            alpha: modular_distance(from.alpha, to.alpha, self.alpha_base()),
            gamma: modular_distance(from.gamma, to.gamma, self.gamma_base()),
        }
    }

    /// Whether `to` lies within one satellite spacing of `from` on both axes
    pub fn in_window(&self, from: Cell, to: Cell) -> bool {
        let d = self.distance(from, to);
        d.alpha <= self.scale && d.gamma <= self.scale
    }

    pub fn alpha_step(&self, from: Cell, to: Cell) -> Step {
        step_sign(from.alpha, to.alpha, self.alpha_base())
    }

    pub fn gamma_step(&self, from: Cell, to: Cell) -> Step {
        step_sign(from.gamma, to.gamma, self.gamma_base())
    }
}

/// A ground station expressed in both torus representations.
///
/// Any point below the shell inclination is crossed once by an ascending
/// and once by a descending pass; the two passes put it at different cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPhases {
    pub ascending: PhasePair,
    pub descending: PhasePair,
}

/// Phase angles of a ground station at `lat_deg`/`lon_deg` under a shell of
/// the given inclination. `skew_deg` is the longitude of the ascending node
/// of plane zero at the reference epoch.
pub fn ground_station_phases(
    lat_deg: f64,
    lon_deg: f64,
    inclination_deg: f64,
    skew_deg: f64,
) -> GroundPhases {
    let lat = lat_deg.to_radians();
    let inc = inclination_deg.to_radians();

    if lat.sin().abs() > inc.sin().abs() {
        // Poleward of the shell: snap to the apex of the nearest pass.
        let gamma = if lat_deg > 0.0 { 270.0 } else { 90.0 };
        let alpha = (360.0 + lon_deg - skew_deg + gamma).rem_euclid(360.0);
        let pair = PhasePair::new(alpha, (360.0 - gamma).rem_euclid(360.0));
        return GroundPhases {
            ascending: pair,
            descending: pair,
        };
    }

    let gamma = -(lat.sin() / inc.sin()).asin();
    let shift = (inc.cos() * (-gamma).tan()).atan().to_degrees();
    let gamma = gamma.to_degrees();

    GroundPhases {
        ascending: PhasePair::new(
            (360.0 + (lon_deg - skew_deg - shift)).rem_euclid(360.0),
            (360.0 - gamma).rem_euclid(360.0),
        ),
        descending: PhasePair::new(
            (180.0 + (lon_deg - skew_deg + shift)).rem_euclid(360.0),
            (180.0 + gamma).rem_euclid(360.0),
        ),
    }
}
