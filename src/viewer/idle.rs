#[derive(Debug, Clone)]
pub struct IdleSpin {
    angle: f32,
    step: f32,
    grace: f64,
    dragging: bool,
    resume_at: Option<f64>,
}

impl IdleSpin {
    /// `step` radians per frame, resuming `grace` seconds after a drag ends.
    pub fn new(step: f32, grace: f64) -> Self {
        Self {
            angle: 0.0,
            step,
            grace,
            dragging: false,
            resume_at: None,
        }
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
        self.resume_at = None;
    }

    pub fn end_drag(&mut self, now: f64) {
        if self.dragging {
            self.dragging = false;
            self.resume_at = Some(now + self.grace);
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_idle(&self, now: f64) -> bool {
        !self.dragging && self.resume_at.is_none_or(|at| now >= at)
    }

    /// One frame: spins by `step` if idle. Returns whether the angle moved.
    pub fn advance(&mut self, now: f64) -> bool {
        if !self.is_idle(now) {
            return false;
        }
        self.resume_at = None;
        self.angle = (self.angle + self.step) % std::f32::consts::TAU;
        true
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Back to the initial pose, keeping the drag state.
    pub fn reset(&mut self) {
        self.angle = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const STEP: f32 = 0.005;
    const GRACE: f64 = 0.150;

    #[test]
    fn spins_by_fixed_step_when_idle() {
        let mut spin = IdleSpin::new(STEP, GRACE);
        assert!(spin.advance(0.0));
        assert!(spin.advance(0.016));
        assert_relative_eq!(spin.angle(), 2.0 * STEP);
    }

    #[test]
    fn drag_suspends_immediately() {
        let mut spin = IdleSpin::new(STEP, GRACE);
        spin.begin_drag();
        assert!(!spin.advance(1.0));
        assert!(!spin.advance(5.0));
        assert_relative_eq!(spin.angle(), 0.0);
    }

    #[test]
    fn resumes_only_after_grace_period() {
        let mut spin = IdleSpin::new(STEP, GRACE);
        spin.begin_drag();
        spin.end_drag(10.0);
        assert!(!spin.advance(10.0));
        assert!(!spin.advance(10.149));
        assert!(spin.advance(10.151));
        assert!(spin.advance(10.2));
        assert_relative_eq!(spin.angle(), 2.0 * STEP);
    }

    #[test]
    fn regrab_during_grace_cancels_resume() {
        let mut spin = IdleSpin::new(STEP, GRACE);
        spin.begin_drag();
        spin.end_drag(1.0);
        spin.begin_drag();
        assert!(!spin.advance(2.0));
        spin.end_drag(2.0);
        assert!(!spin.advance(2.1));
        assert!(spin.advance(2.2));
    }

    #[test]
    fn end_without_begin_is_ignored() {
        let mut spin = IdleSpin::new(STEP, GRACE);
        spin.end_drag(0.0);
        assert!(spin.advance(0.0));
    }
}
