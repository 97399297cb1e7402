//! Easing and the animated pan used by `Map::pan_to`
//!
//! The curve is injectable: either one of the built-in [`EasingType`]s or any
//! `Fn(f64) -> f64` wrapped in [`Easing::Custom`].

use crate::core::geo::{PixelPoint, Point};
use crate::prelude::{Arc, Duration, Instant};
use crate::traits::Lerp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in easing curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EasingType {
    Linear,
    EaseIn,
    #[default]
    EaseOut,
    EaseInOut,
    Smooth,
    UltraSmooth,
}

impl EasingType {
    /// Apply easing function to a normalized time value (0.0 to 1.0)
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            EasingType::Linear => t,
            EasingType::EaseIn => t * t * t,
            EasingType::EaseOut => {
                let t = t - 1.0;
                t * t * t + 1.0
            }
            EasingType::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let t = 2.0 * t - 2.0;
                    1.0 + t * t * t / 2.0
                }
            }
            // 3t^2 - 2t^3
            EasingType::Smooth => t * t * (3.0 - 2.0 * t),
            // 6t^5 - 15t^4 + 10t^3
            EasingType::UltraSmooth => t * t * t * (t * (t * 6.0 - 15.0) + 10.0),
        }
    }
}

pub type EasingFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Easing curve handed to tweens
#[derive(Clone)]
pub enum Easing {
    Preset(EasingType),
    Custom(EasingFn),
}

impl Easing {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Easing::Custom(Arc::new(f))
    }

    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Preset(kind) => kind.apply(t),
            Easing::Custom(f) => f(t),
        }
    }
}

impl From<EasingType> for Easing {
    fn from(kind: EasingType) -> Self {
        Easing::Preset(kind)
    }
}

impl Default for Easing {
    fn default() -> Self {
        Easing::Preset(EasingType::default())
    }
}

impl fmt::Debug for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Easing::Preset(kind) => write!(f, "Easing::Preset({:?})", kind),
            Easing::Custom(_) => write!(f, "Easing::Custom(..)"),
        }
    }
}

/// What the map should do for one animation frame
#[derive(Debug, Clone, PartialEq)]
pub enum PanStep {
    /// Move by this many whole pixels
    Move { dx: f64, dy: f64 },
    /// Animation finished; settle on the target center
    Done { target: Point },
}

/// Pixel-space tween from the current center to a target center
///
/// Each frame yields the pixel delta since the previous frame. The last
/// frame position is rounded so the accumulated moves stay on whole pixels.
#[derive(Debug, Clone)]
pub struct PanTween {
    target: Point,
    vector: PixelPoint,
    last: PixelPoint,
    start: Instant,
    duration: Duration,
    easing: Easing,
}

impl PanTween {
    pub fn new(target: Point, vector: PixelPoint, start: Instant, duration: Duration, easing: Easing) -> Self {
        Self {
            target,
            vector,
            last: PixelPoint::default(),
            start,
            duration,
            easing,
        }
    }

    pub fn target(&self) -> Point {
        self.target
    }

    /// Advances to `now`
    pub fn step(&mut self, now: Instant) -> PanStep {
        let elapsed = now.saturating_duration_since(self.start);
        if self.duration.is_zero() || elapsed >= self.duration {
            return PanStep::Done {
                target: self.target,
            };
        }
        let t = self
            .easing
            .apply(elapsed.as_secs_f64() / self.duration.as_secs_f64());
        let px = PixelPoint::default().lerp(&self.vector, t);
        let dx = px.x - self.last.x;
        let dy = px.y - self.last.y;
        self.last = px.round();
        PanStep::Move { dx, dy }
    }
}
