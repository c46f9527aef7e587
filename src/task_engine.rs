//! Task progress state machine.
//!
//! One engine instance owns at most one active task. Every new fix
//! evaluates exactly one point, the current target; geometry overlap
//! with later points can therefore never skip a point. Start points
//! follow the departure convention: entering the start geometry arms
//! the point, leaving it again reaches it and starts the run.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::geodesy;
use crate::position::PositionFix;
use crate::task::{
    KEYHOLE_CYLINDER_RADIUS_M, KEYHOLE_SECTOR_ANGLE_DEG, KEYHOLE_SECTOR_RADIUS_M, Task, TaskError,
    TaskPoint, TaskRole, TaskScheme,
};

/// Progress of a single task point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointProgress {
    Pending,
    /// Within the outer detection geometry of the current target
    Armed,
    Reached,
}

/// Lifecycle of the task as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Inactive,
    Active,
    Completed,
}

/// State changes surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskEvent {
    Activated { task: String },
    /// A new activation displaced a running task
    Replaced { previous: String },
    Deactivated,
    Restarted,
    TargetArmed { point: Uuid },
    PointReached { point: Uuid },
    Completed,
}

/// State machine over the active task's ordered points
#[derive(Debug, Default)]
pub struct TaskEngine {
    task: Option<Task>,
    state: TaskState,
    progress: Vec<PointProgress>,
    target: usize,
    /// Whether the current fix lies inside the target geometry; drives
    /// arming and the start-exit rule
    inside_target: bool,
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Inactive
    }
}

impl TaskEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Id of the point the engine is currently steering for
    pub fn current_target(&self) -> Option<Uuid> {
        if self.state != TaskState::Active {
            return None;
        }
        self.task
            .as_ref()
            .and_then(|task| task.points().get(self.target))
            .map(|point| point.id)
    }

    /// Ids of all reached points, in task order. While the task is
    /// active this is always a prefix of the point sequence.
    pub fn reached_prefix(&self) -> Vec<Uuid> {
        let Some(task) = self.task.as_ref() else {
            return Vec::new();
        };
        task.points()
            .iter()
            .zip(self.progress.iter())
            .take_while(|(_, progress)| **progress == PointProgress::Reached)
            .map(|(point, _)| point.id)
            .collect()
    }

    pub fn point_progress(&self) -> &[PointProgress] {
        &self.progress
    }

    /// Activate a task. Replacing a running task is an atomic swap; the
    /// "replace the current task?" confirmation is the caller's business.
    /// The task was validated when it was built, so the only way this
    /// fails is a task handed over with a mutated point list.
    pub fn activate(&mut self, task: Task) -> Result<Vec<TaskEvent>, TaskError> {
        if task.points().len() < 2 {
            return Err(TaskError::TooFewPoints {
                found: task.points().len(),
            });
        }

        let mut events = Vec::new();
        if self.state == TaskState::Active
            && let Some(previous) = self.task.as_ref()
        {
            events.push(TaskEvent::Replaced {
                previous: previous.name.clone(),
            });
        }

        info!("Activating task '{}' with {} points", task.name, task.points().len());

        self.progress = vec![PointProgress::Pending; task.points().len()];
        self.target = 0;
        self.inside_target = false;
        self.state = TaskState::Active;
        events.push(TaskEvent::Activated {
            task: task.name.clone(),
        });
        self.task = Some(task);

        Ok(events)
    }

    pub fn deactivate(&mut self) -> Option<TaskEvent> {
        if self.state == TaskState::Inactive {
            return None;
        }
        info!("Deactivating task");
        self.state = TaskState::Inactive;
        Some(TaskEvent::Deactivated)
    }

    /// Reset all progress and return to the first point, keeping the
    /// task loaded. Used on logging restart or explicit pilot request.
    pub fn restart(&mut self) -> Option<TaskEvent> {
        let task = self.task.as_ref()?;
        info!("Restarting task '{}'", task.name);
        self.progress = vec![PointProgress::Pending; task.points().len()];
        self.target = 0;
        self.inside_target = false;
        self.state = TaskState::Active;
        Some(TaskEvent::Restarted)
    }

    /// Evaluate the current target against a new fix. The previous fix
    /// is needed for line-crossing detection; on the very first fix no
    /// line can be crossed.
    pub fn update(&mut self, previous: Option<&PositionFix>, fix: &PositionFix) -> Vec<TaskEvent> {
        if self.state != TaskState::Active {
            return Vec::new();
        }

        let Some(task) = self.task.as_ref() else {
            return Vec::new();
        };
        let Some(point) = task.points().get(self.target) else {
            return Vec::new();
        };

        let mut events = Vec::new();

        let reached = match point.scheme {
            TaskScheme::Line { length_m } => {
                // A line is crossed, not entered; crossing it is already
                // the departure, for start and finish alike
                previous.is_some_and(|prev| {
                    geodesy::crossed_line(
                        prev.latitude,
                        prev.longitude,
                        fix.latitude,
                        fix.longitude,
                        point.latitude,
                        point.longitude,
                        task.leg_bearing_deg(self.target),
                        length_m,
                    )
                })
            }
            _ => {
                let inside = self.area_contains(task, point, fix);
                let was_inside = self.inside_target;
                self.inside_target = inside;

                if point.role == TaskRole::Start {
                    // Departure rule: entry arms, exit reaches
                    was_inside && !inside
                } else {
                    inside
                }
            }
        };

        if reached {
            events.extend(self.mark_reached());
            return events;
        }

        // Arming is display state: the glider is inside the detection
        // radius but the point does not count as reached yet
        if self.progress[self.target] == PointProgress::Pending {
            let within_detection = geodesy::distance_m(
                fix.latitude,
                fix.longitude,
                point.latitude,
                point.longitude,
            ) <= point.scheme.detection_radius_m();

            if within_detection {
                self.progress[self.target] = PointProgress::Armed;
                debug!("Task point '{}' armed", point.name);
                events.push(TaskEvent::TargetArmed { point: point.id });
            }
        }

        events
    }

    fn area_contains(&self, task: &Task, point: &TaskPoint, fix: &PositionFix) -> bool {
        match point.scheme {
            TaskScheme::Cylinder { radius_m } => geodesy::point_in_cylinder(
                fix.latitude,
                fix.longitude,
                point.latitude,
                point.longitude,
                radius_m,
            ),
            TaskScheme::Sector {
                inner_radius_m,
                outer_radius_m,
                angle_deg,
                bisector_deg,
            } => geodesy::point_in_sector(
                fix.latitude,
                fix.longitude,
                point.latitude,
                point.longitude,
                inner_radius_m,
                outer_radius_m,
                bisector_deg,
                angle_deg,
            ),
            TaskScheme::Keyhole => {
                let bisector = task.default_bisector_deg(self.target);
                geodesy::point_in_cylinder(
                    fix.latitude,
                    fix.longitude,
                    point.latitude,
                    point.longitude,
                    KEYHOLE_CYLINDER_RADIUS_M,
                ) || geodesy::point_in_sector(
                    fix.latitude,
                    fix.longitude,
                    point.latitude,
                    point.longitude,
                    0.0,
                    KEYHOLE_SECTOR_RADIUS_M,
                    bisector,
                    KEYHOLE_SECTOR_ANGLE_DEG,
                )
            }
            TaskScheme::Line { .. } => false,
        }
    }

    fn mark_reached(&mut self) -> Vec<TaskEvent> {
        let Some(task) = self.task.as_ref() else {
            return Vec::new();
        };
        let point = &task.points()[self.target];

        info!("Task point '{}' reached", point.name);
        self.progress[self.target] = PointProgress::Reached;
        let mut events = vec![TaskEvent::PointReached { point: point.id }];

        if self.target == task.points().len() - 1 {
            info!("Task '{}' completed", task.name);
            self.state = TaskState::Completed;
            events.push(TaskEvent::Completed);
        } else {
            // The next point is deliberately not evaluated against this
            // fix; one advance per tick, points are never skipped
            self.target += 1;
            self.inside_target = false;
        }

        events
    }
}
