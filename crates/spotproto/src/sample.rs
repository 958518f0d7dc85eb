use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One multi-axis motion reading.
///
/// Acceleration is user acceleration in g with gravity removed, so a still
/// wrist reads close to zero. Rotation rate is rad/s; orientation is radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSample {
    pub timestamp: DateTime<Utc>,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    pub grav_x: f64,
    pub grav_y: f64,
    pub grav_z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mag_z: Option<f64>,
}

impl MotionSample {
    /// A motionless reading with gravity pointing down the z axis.
    pub fn at_rest(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            accel_x: 0.0,
            accel_y: 0.0,
            accel_z: 0.0,
            rot_x: 0.0,
            rot_y: 0.0,
            rot_z: 0.0,
            grav_x: 0.0,
            grav_y: 0.0,
            grav_z: -1.0,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            mag_x: None,
            mag_y: None,
            mag_z: None,
        }
    }

    pub fn with_acceleration(mut self, x: f64, y: f64, z: f64) -> Self {
        self.accel_x = x;
        self.accel_y = y;
        self.accel_z = z;
        self
    }

    pub fn with_rotation(mut self, x: f64, y: f64, z: f64) -> Self {
        self.rot_x = x;
        self.rot_y = y;
        self.rot_z = z;
        self
    }

    pub fn with_magnetic_field(mut self, x: f64, y: f64, z: f64) -> Self {
        self.mag_x = Some(x);
        self.mag_y = Some(y);
        self.mag_z = Some(z);
        self
    }

    pub fn acceleration_magnitude(&self) -> f64 {
        (self.accel_x * self.accel_x + self.accel_y * self.accel_y + self.accel_z * self.accel_z)
            .sqrt()
    }

    pub fn has_magnetic_field(&self) -> bool {
        self.mag_x.is_some() && self.mag_y.is_some() && self.mag_z.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let sample = MotionSample::at_rest(Utc::now()).with_acceleration(0.3, 0.4, 0.0);
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["accelX"], 0.3);
        assert_eq!(json["gravZ"], -1.0);
        assert!(json.get("magX").is_none());
    }

    #[test]
    fn test_magnitude() {
        let sample = MotionSample::at_rest(Utc::now()).with_acceleration(0.3, 0.4, 0.0);
        assert!((sample.acceleration_magnitude() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_magnetic_field_optional() {
        let sample = MotionSample::at_rest(Utc::now()).with_magnetic_field(1.0, 2.0, 3.0);
        assert!(sample.has_magnetic_field());
        let json = serde_json::to_string(&sample).unwrap();
        let back: MotionSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mag_z, Some(3.0));
    }
}
