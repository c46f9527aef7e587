//! Task and task-point model.
//!
//! A task is an ordered sequence of points, each with a geometric
//! activation scheme. Classification (out-and-return, FAI triangle and
//! so on) and the FAI leg-proportion check happen once, when the task is
//! built; the per-fix evaluation lives in the task engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::geodesy;

/// Geometric activation scheme of a task point. Dispatched by pattern
/// matching; adding a variant without handling it everywhere is a
/// compile error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TaskScheme {
    Cylinder {
        radius_m: f64,
    },
    Sector {
        inner_radius_m: f64,
        outer_radius_m: f64,
        angle_deg: f64,
        /// Direction of the sector center line, degrees from the point
        bisector_deg: f64,
    },
    /// DAeC keyhole: 500 m cylinder plus a 10 km / 90 degree sector
    /// oriented away from the inbound leg
    Keyhole,
    Line {
        length_m: f64,
    },
}

impl TaskScheme {
    /// Outer detection radius used for arming the point
    pub fn detection_radius_m(&self) -> f64 {
        match *self {
            TaskScheme::Cylinder { radius_m } => radius_m,
            TaskScheme::Sector { outer_radius_m, .. } => outer_radius_m,
            TaskScheme::Keyhole => KEYHOLE_SECTOR_RADIUS_M,
            TaskScheme::Line { length_m } => length_m,
        }
    }
}

pub const KEYHOLE_CYLINDER_RADIUS_M: f64 = 500.0;
pub const KEYHOLE_SECTOR_RADIUS_M: f64 = 10_000.0;
pub const KEYHOLE_SECTOR_ANGLE_DEG: f64 = 90.0;

/// Role of a point within its task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskRole {
    Start,
    Turn,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPoint {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub scheme: TaskScheme,
    pub role: TaskRole,
}

impl TaskPoint {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation_m: f64,
        scheme: TaskScheme,
        role: TaskRole,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            latitude,
            longitude,
            elevation_m,
            scheme,
            role,
        }
    }
}

/// Task classification derived from the point geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskClass {
    FreeDistance,
    OutAndReturn,
    FaiTriangle,
    Triangle,
    Polygon,
    Unknown,
}

/// Why a task is rejected at build/activation time
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("a task needs at least 2 points, got {found}")]
    TooFewPoints { found: usize },

    #[error("coincident task points at leg {index}")]
    CoincidentPoints { index: usize },

    #[error("point {index} has role {role:?}, expected {expected:?}")]
    MisplacedRole {
        index: usize,
        role: TaskRole,
        expected: TaskRole,
    },
}

/// An ordered, validated sequence of task points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    points: Vec<TaskPoint>,
    class: TaskClass,
    leg_distances_m: Vec<f64>,
    total_distance_m: f64,
}

/// Two task points closer than this count as coincident
const COINCIDENT_THRESHOLD_M: f64 = 10.0;

/// A task whose first and last points are closer than this is closed
/// (out-and-return or triangle shaped)
const CLOSED_TASK_THRESHOLD_M: f64 = 1_000.0;

impl Task {
    /// Build and validate a task. Distances and the classification are
    /// computed once here.
    pub fn new(name: impl Into<String>, points: Vec<TaskPoint>) -> Result<Self, TaskError> {
        if points.len() < 2 {
            return Err(TaskError::TooFewPoints {
                found: points.len(),
            });
        }

        for (index, point) in points.iter().enumerate() {
            let expected = if index == 0 {
                TaskRole::Start
            } else if index == points.len() - 1 {
                TaskRole::Finish
            } else {
                TaskRole::Turn
            };
            if point.role != expected {
                return Err(TaskError::MisplacedRole {
                    index,
                    role: point.role,
                    expected,
                });
            }
        }

        let leg_distances_m: Vec<f64> = points
            .windows(2)
            .map(|pair| {
                geodesy::distance_m(
                    pair[0].latitude,
                    pair[0].longitude,
                    pair[1].latitude,
                    pair[1].longitude,
                )
            })
            .collect();

        if let Some(index) = leg_distances_m.iter().position(|d| *d < COINCIDENT_THRESHOLD_M) {
            return Err(TaskError::CoincidentPoints { index });
        }

        let total_distance_m = leg_distances_m.iter().sum();
        let class = classify(&points, &leg_distances_m, total_distance_m);

        Ok(Self {
            name: name.into(),
            points,
            class,
            leg_distances_m,
            total_distance_m,
        })
    }

    pub fn points(&self) -> &[TaskPoint] {
        &self.points
    }

    pub fn class(&self) -> TaskClass {
        self.class
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn leg_distances_m(&self) -> &[f64] {
        &self.leg_distances_m
    }

    /// Course of the leg a point's line scheme terminates: the inbound
    /// leg for every point but the start, whose line is crossed outbound.
    pub fn leg_bearing_deg(&self, index: usize) -> f64 {
        let points = &self.points;
        if index == 0 {
            let (a, b) = (&points[0], &points[1]);
            geodesy::initial_bearing_deg(a.latitude, a.longitude, b.latitude, b.longitude)
        } else {
            let (a, b) = (&points[index - 1], &points[index]);
            geodesy::initial_bearing_deg(a.latitude, a.longitude, b.latitude, b.longitude)
        }
    }

    /// Default sector/keyhole bisector for a point: remote from the legs,
    /// per the FAI observation-zone convention. For the start the zone
    /// faces away from the first leg, for the finish away from the last,
    /// and for a turn point away from the angle bisector of both legs.
    pub fn default_bisector_deg(&self, index: usize) -> f64 {
        let points = &self.points;
        let point = &points[index];

        if index == 0 {
            let next = &points[index + 1];
            let to_next = geodesy::initial_bearing_deg(
                point.latitude,
                point.longitude,
                next.latitude,
                next.longitude,
            );
            geodesy::normalize_deg(to_next + 180.0)
        } else if index == points.len() - 1 {
            let prev = &points[index - 1];
            let to_prev = geodesy::initial_bearing_deg(
                point.latitude,
                point.longitude,
                prev.latitude,
                prev.longitude,
            );
            geodesy::normalize_deg(to_prev + 180.0)
        } else {
            let prev = &points[index - 1];
            let next = &points[index + 1];
            let to_prev = geodesy::initial_bearing_deg(
                point.latitude,
                point.longitude,
                prev.latitude,
                prev.longitude,
            );
            let to_next = geodesy::initial_bearing_deg(
                point.latitude,
                point.longitude,
                next.latitude,
                next.longitude,
            );
            geodesy::normalize_deg(geodesy::mean_bearing_deg(to_prev, to_next) + 180.0)
        }
    }
}

fn classify(points: &[TaskPoint], legs: &[f64], total_m: f64) -> TaskClass {
    if points.len() == 2 {
        return TaskClass::FreeDistance;
    }

    let first = &points[0];
    let last = &points[points.len() - 1];
    let closure = geodesy::distance_m(
        first.latitude,
        first.longitude,
        last.latitude,
        last.longitude,
    );

    if closure >= CLOSED_TASK_THRESHOLD_M {
        return TaskClass::FreeDistance;
    }

    match points.len() {
        3 => TaskClass::OutAndReturn,
        4 => {
            if is_fai_triangle(total_m, legs) {
                TaskClass::FaiTriangle
            } else {
                TaskClass::Triangle
            }
        }
        n if n > 4 => TaskClass::Polygon,
        _ => TaskClass::Unknown,
    }
}

/// FAI triangle leg-proportion rule: below 500 km every leg must be at
/// least 28% of the total; from 500 km the legs must fall between 25%
/// and 45%.
pub fn is_fai_triangle(total_m: f64, legs: &[f64]) -> bool {
    if legs.len() != 3 || total_m <= 0.0 {
        return false;
    }

    if total_m < 500_000.0 {
        legs.iter().all(|leg| *leg >= 0.28 * total_m)
    } else {
        legs.iter()
            .all(|leg| *leg > 0.25 * total_m && *leg <= 0.45 * total_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, lat: f64, lon: f64, role: TaskRole) -> TaskPoint {
        TaskPoint::new(
            name,
            lat,
            lon,
            400.0,
            TaskScheme::Cylinder { radius_m: 500.0 },
            role,
        )
    }

    #[test]
    fn test_two_point_task_is_free_distance() {
        let task = Task::new(
            "straight out",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.5, 11.0, TaskRole::Finish),
            ],
        )
        .unwrap();

        assert_eq!(task.class(), TaskClass::FreeDistance);
        assert!((task.total_distance_m() - 55_600.0).abs() < 200.0);
    }

    #[test]
    fn test_out_and_return_classification() {
        let task = Task::new(
            "o&r",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.5, 11.0, TaskRole::Turn),
                point("A2", 47.001, 11.0, TaskRole::Finish),
            ],
        )
        .unwrap();

        assert_eq!(task.class(), TaskClass::OutAndReturn);
    }

    #[test]
    fn test_fai_triangle_classification() {
        // Near-equilateral triangle, each leg well above 28%
        let task = Task::new(
            "fai",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.45, 11.0, TaskRole::Turn),
                point("C", 47.225, 11.55, TaskRole::Turn),
                point("A2", 47.001, 11.0, TaskRole::Finish),
            ],
        )
        .unwrap();

        assert_eq!(task.class(), TaskClass::FaiTriangle);
    }

    #[test]
    fn test_flat_triangle_is_not_fai() {
        // Degenerate, one very short leg
        let task = Task::new(
            "flat",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.5, 11.0, TaskRole::Turn),
                point("C", 47.52, 11.05, TaskRole::Turn),
                point("A2", 47.001, 11.0, TaskRole::Finish),
            ],
        )
        .unwrap();

        assert_eq!(task.class(), TaskClass::Triangle);
    }

    #[test]
    fn test_open_three_pointer_is_free_distance() {
        let task = Task::new(
            "dogleg",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.5, 11.0, TaskRole::Turn),
                point("C", 48.0, 11.5, TaskRole::Finish),
            ],
        )
        .unwrap();

        assert_eq!(task.class(), TaskClass::FreeDistance);
    }

    #[test]
    fn test_polygon_classification() {
        let task = Task::new(
            "quad",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.4, 11.0, TaskRole::Turn),
                point("C", 47.4, 11.5, TaskRole::Turn),
                point("D", 47.0, 11.5, TaskRole::Turn),
                point("A2", 47.001, 11.0, TaskRole::Finish),
            ],
        )
        .unwrap();

        assert_eq!(task.class(), TaskClass::Polygon);
    }

    #[test]
    fn test_large_fai_rule() {
        // 600 km total with a 40/35/25-ish split fails the large rule's
        // lower bound only when a leg drops to 25% or below
        let legs = [240_000.0, 210_000.0, 150_000.1];
        assert!(is_fai_triangle(600_000.0, &legs));

        let legs = [270_000.0, 180_000.0, 150_000.0];
        assert!(!is_fai_triangle(600_000.0, &legs), "25% leg must fail");
    }

    #[test]
    fn test_too_few_points_rejected() {
        let result = Task::new("solo", vec![point("A", 47.0, 11.0, TaskRole::Start)]);
        assert_eq!(result.unwrap_err(), TaskError::TooFewPoints { found: 1 });
    }

    #[test]
    fn test_coincident_points_rejected() {
        let result = Task::new(
            "dup",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.0, 11.0, TaskRole::Finish),
            ],
        );
        assert_eq!(result.unwrap_err(), TaskError::CoincidentPoints { index: 0 });
    }

    #[test]
    fn test_misplaced_role_rejected() {
        let result = Task::new(
            "backwards",
            vec![
                point("A", 47.0, 11.0, TaskRole::Finish),
                point("B", 47.5, 11.0, TaskRole::Start),
            ],
        );
        assert!(matches!(result, Err(TaskError::MisplacedRole { index: 0, .. })));
    }

    #[test]
    fn test_default_bisector_faces_away_from_legs() {
        let task = Task::new(
            "o&r",
            vec![
                point("A", 47.0, 11.0, TaskRole::Start),
                point("B", 47.5, 11.0, TaskRole::Turn),
                point("A2", 47.001, 11.0, TaskRole::Finish),
            ],
        )
        .unwrap();

        // Start zone opens south, away from the northbound first leg
        assert!((task.default_bisector_deg(0) - 180.0).abs() < 1.0);
        // Turn point zone opens north, beyond the turn
        assert!(task.default_bisector_deg(1) < 1.0 || task.default_bisector_deg(1) > 359.0);
        // Finish zone opens south, beyond the finish
        assert!((task.default_bisector_deg(2) - 180.0).abs() < 1.0);
    }
}
