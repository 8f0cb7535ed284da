//! Obstacle pressure and wheel mixing for AutonomousPid mode.
//!
//! Each forward-facing sensor turns its reading into a proximity in `[0, 1]`
//! (0 = at or beyond `safe_mm`, 1 = touching). Sensors within
//! `front_cone_deg` of straight ahead contribute *front* pressure; the rest
//! contribute left or right pressure weighted by `|sin(bearing)|`. Front
//! pressure is added to whichever side is already more obstructed, left on
//! a tie, so a lone obstacle dead ahead makes the robot turn right.
//!
//! The PID regulates `imbalance = right − left` toward zero. A positive
//! output steers right.

use rover_types::{RANGE_SENTINEL_MM, RangingVector, SensorLayout};

use crate::motor::WheelSpeeds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvoidanceConfig {
    /// At or below this distance ahead the robot pivots in place.
    pub critical_mm: u16,
    /// Beyond this distance an obstacle exerts no pressure.
    pub safe_mm: u16,
    /// Half-angle of the cone treated as straight ahead.
    pub front_cone_deg: f32,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            critical_mm: 150,
            safe_mm: 400,
            front_cone_deg: 10.0,
        }
    }
}

/// Pressure summary of one ranging vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub left: f32,
    pub right: f32,
    pub front: f32,
    /// Closest reading inside the front cone, sentinel if none.
    pub front_min_mm: u16,
}

impl Assessment {
    pub fn imbalance(&self) -> f32 {
        self.right - self.left
    }
}

fn proximity(mm: u16, safe_mm: u16) -> f32 {
    if mm >= RANGE_SENTINEL_MM || safe_mm == 0 {
        return 0.0;
    }
    let safe = f32::from(safe_mm);
    ((safe - f32::from(mm)) / safe).clamp(0.0, 1.0)
}

/// Compute obstacle pressure from the latest readings.
pub fn assess(layout: &SensorLayout, ranging: &RangingVector, cfg: &AvoidanceConfig) -> Assessment {
    let mut left = 0.0f32;
    let mut right = 0.0f32;
    let mut front = 0.0f32;
    let mut front_min_mm = RANGE_SENTINEL_MM;

    for (channel, mm) in ranging.iter().enumerate() {
        let Some(bearing) = layout.bearing(channel) else {
            continue;
        };
        if bearing.abs() > 90.0 {
            continue;
        }
        let prox = proximity(mm, cfg.safe_mm);
        if bearing.abs() <= cfg.front_cone_deg {
            front = front.max(prox);
            front_min_mm = front_min_mm.min(mm);
        } else {
            let weighted = prox * bearing.to_radians().sin().abs();
            if bearing < 0.0 {
                left = left.max(weighted);
            } else {
                right = right.max(weighted);
            }
        }
    }

    if left >= right {
        left += front;
    } else {
        right += front;
    }

    Assessment {
        left,
        right,
        front,
        front_min_mm,
    }
}

/// Fraction of base speed allowed forward given the closest obstacle ahead.
pub fn forward_scale(front_min_mm: u16, cfg: &AvoidanceConfig) -> f32 {
    if cfg.safe_mm <= cfg.critical_mm {
        return if front_min_mm > cfg.critical_mm { 1.0 } else { 0.0 };
    }
    let span = f32::from(cfg.safe_mm - cfg.critical_mm);
    ((f32::from(front_min_mm) - f32::from(cfg.critical_mm)) / span).clamp(0.0, 1.0)
}

/// Differential mix: `forward ± output · base`, saturated to `±base`.
pub fn mix(forward: f32, output: f32, base: i16) -> WheelSpeeds {
    let base_f = f32::from(base);
    let turn = output * base_f;
    WheelSpeeds::new((forward + turn).round() as i16, (forward - turn).round() as i16)
        .saturate(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AvoidanceConfig {
        AvoidanceConfig::default()
    }

    #[test]
    fn clear_room_has_no_pressure() {
        let r = RangingVector::from_readings(vec![RANGE_SENTINEL_MM; 5]);
        let a = assess(&SensorLayout::default(), &r, &cfg());
        assert_eq!(a.imbalance(), 0.0);
        assert_eq!(forward_scale(a.front_min_mm, &cfg()), 1.0);
    }

    #[test]
    fn lone_front_obstacle_turns_right() {
        let layout = SensorLayout::new(vec![0.0, -45.0, 45.0, 90.0]);
        let r = RangingVector::from_readings(vec![50, 800, 800, 800]);
        let a = assess(&layout, &r, &cfg());
        assert!(a.imbalance() < 0.0);
        assert_eq!(a.front_min_mm, 50);
        assert_eq!(forward_scale(a.front_min_mm, &cfg()), 0.0);
    }

    #[test]
    fn front_pressure_joins_the_more_obstructed_side() {
        // Wall on the right and ahead: turn left.
        let r = RangingVector::from_readings(vec![800, 800, 100, 200, 800]);
        let a = assess(&SensorLayout::default(), &r, &cfg());
        assert!(a.imbalance() > 0.0);
        assert!(a.right > a.front);
    }

    #[test]
    fn rear_facing_sensors_are_ignored() {
        let layout = SensorLayout::new(vec![180.0, 0.0]);
        let r = RangingVector::from_readings(vec![10, 800]);
        let a = assess(&layout, &r, &cfg());
        assert_eq!(a.front + a.left + a.right, 0.0);
    }

    #[test]
    fn forward_scale_ramps_between_critical_and_safe() {
        assert_eq!(forward_scale(150, &cfg()), 0.0);
        assert!((forward_scale(275, &cfg()) - 0.5).abs() < 1e-6);
        assert_eq!(forward_scale(400, &cfg()), 1.0);
    }

    #[test]
    fn mix_saturates_to_base() {
        assert_eq!(mix(127.0, 1.0, 127), WheelSpeeds::new(127, 0));
        assert_eq!(mix(0.0, 0.5, 100), WheelSpeeds::new(50, -50));
    }
}
