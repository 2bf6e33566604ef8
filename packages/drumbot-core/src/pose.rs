//! Cartesian actuator poses and the safety bounding box.

use serde::{Deserialize, Serialize};

/// End-effector pose in millimetres (`x`, `y`, `z`) plus wrist rotation `r` in degrees.
///
/// Serialized as a 4-element array `[x, y, z, r]`, matching how rig files list poses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, r: f64) -> Self {
        Self { x, y, z, r }
    }

    /// Straight-line travel distance between two poses. Rotation is ignored.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }
}

impl From<[f64; 4]> for Pose {
    fn from(v: [f64; 4]) -> Self {
        Pose::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Pose> for [f64; 4] {
    fn from(p: Pose) -> Self {
        [p.x, p.y, p.z, p.r]
    }
}

/// Axis-aligned box every commanded pose is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyBox {
    #[serde(default = "SafetyBox::default_x_min")]
    pub x_min: f64,
    #[serde(default = "SafetyBox::default_x_max")]
    pub x_max: f64,
    #[serde(default = "SafetyBox::default_y_min")]
    pub y_min: f64,
    #[serde(default = "SafetyBox::default_y_max")]
    pub y_max: f64,
    #[serde(default = "SafetyBox::default_z_min")]
    pub z_min: f64,
    #[serde(default = "SafetyBox::default_z_max")]
    pub z_max: f64,
}

impl SafetyBox {
    fn default_x_min() -> f64 {
        160.0
    }
    fn default_x_max() -> f64 {
        250.0
    }
    fn default_y_min() -> f64 {
        -180.0
    }
    fn default_y_max() -> f64 {
        180.0
    }
    fn default_z_min() -> f64 {
        0.0
    }
    fn default_z_max() -> f64 {
        130.0
    }

    /// Clamp `x`, `y`, `z` into the box. Rotation passes through untouched.
    pub fn clamp(&self, pose: Pose) -> Pose {
        Pose {
            x: pose.x.clamp(self.x_min, self.x_max),
            y: pose.y.clamp(self.y_min, self.y_max),
            z: pose.z.clamp(self.z_min, self.z_max),
            r: pose.r,
        }
    }

    pub fn contains(&self, pose: &Pose) -> bool {
        (self.x_min..=self.x_max).contains(&pose.x)
            && (self.y_min..=self.y_max).contains(&pose.y)
            && (self.z_min..=self.z_max).contains(&pose.z)
    }

    pub fn is_well_formed(&self) -> bool {
        self.x_min <= self.x_max && self.y_min <= self.y_max && self.z_min <= self.z_max
    }
}

impl Default for SafetyBox {
    fn default() -> Self {
        Self {
            x_min: Self::default_x_min(),
            x_max: Self::default_x_max(),
            y_min: Self::default_y_min(),
            y_max: Self::default_y_max(),
            z_min: Self::default_z_min(),
            z_max: Self::default_z_max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_ignores_rotation() {
        let a = Pose::new(0.0, 0.0, 0.0, 0.0);
        let b = Pose::new(3.0, 4.0, 0.0, 90.0);
        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn test_clamp_into_box() {
        let safety = SafetyBox::default();
        let clamped = safety.clamp(Pose::new(300.0, -500.0, 200.0, 15.0));
        assert_eq!(clamped, Pose::new(250.0, -180.0, 130.0, 15.0));
        assert!(safety.contains(&clamped));
    }

    #[test]
    fn test_clamp_leaves_inside_pose() {
        let safety = SafetyBox::default();
        let pose = Pose::new(226.0, 0.3, 41.0, 0.0);
        assert_eq!(safety.clamp(pose), pose);
    }

    #[test]
    fn test_pose_serializes_as_array() {
        let pose = Pose::new(230.0, 0.0, 60.0, 0.0);
        assert_eq!(serde_json::to_string(&pose).unwrap(), "[230.0,0.0,60.0,0.0]");
        let back: Pose = serde_yaml::from_str("[230, 0, 60, 0]").unwrap();
        assert_eq!(back, pose);
    }
}
