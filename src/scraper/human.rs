//! Human-behaviour simulation: Gaussian waits, quiver scrolling, pointer
//! jitter and a composite "reading" routine.
//!
//! Every delay goes through [`Pacing`], which multiplies it by a scale factor
//! (1.0 in production). Random draws happen before any `.await` so the
//! futures stay `Send`.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::driver::BrowserDriver;

/// Shortest wait ever produced by [`Pacing::gaussian`], in seconds.
pub const MIN_WAIT_SECS: f64 = 0.5;

/// Receives a human-readable label before each labelled wait. Purely
/// informational; it does not influence timing.
pub type WaitObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub scale: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing { scale: 1.0 }
    }
}

impl Pacing {
    /// No delays at all.
    pub fn instant() -> Self {
        Pacing { scale: 0.0 }
    }

    /// `max(MIN_WAIT_SECS, N(mean, sigma))` seconds, before scaling.
    pub fn gaussian(&self, mean: f64, sigma: f64) -> Duration {
        let secs = gaussian_sample(mean, sigma).max(MIN_WAIT_SECS);
        self.scaled(secs)
    }

    /// Uniform in `[lo, hi]` seconds, before scaling.
    pub fn uniform(&self, lo: f64, hi: f64) -> Duration {
        let secs = rand::rng().random_range(lo..=hi);
        self.scaled(secs)
    }

    pub fn scaled(&self, secs: f64) -> Duration {
        Duration::from_secs_f64((secs * self.scale).max(0.0))
    }

    pub async fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

/// One draw from N(mean, sigma) via Box-Muller.
pub fn gaussian_sample(mean: f64, sigma: f64) -> f64 {
    let mut rng = rand::rng();
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + sigma * z
}

/// Pacing plus the optional wait observer.
#[derive(Clone, Default)]
pub struct Human {
    pub pacing: Pacing,
    observer: Option<WaitObserver>,
}

impl Human {
    pub fn new(pacing: Pacing) -> Self {
        Human {
            pacing,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Option<WaitObserver>) {
        self.observer = observer;
    }

    /// Gaussian wait, announced to the observer when labelled.
    pub async fn wait(&self, mean: f64, sigma: f64, label: Option<&str>) {
        if let (Some(observer), Some(label)) = (&self.observer, label) {
            observer(label);
        }
        let d = self.pacing.gaussian(mean, sigma);
        debug!(secs = d.as_secs_f64(), "human wait");
        self.pacing.sleep(d).await;
    }

    /// Scroll by `target_y` (negative scrolls up) in ~100px steps of ±15px,
    /// with a 10% chance of a 20–50px step back after each one.
    pub async fn quiver_scroll(
        &self,
        driver: &mut dyn BrowserDriver,
        target_y: i64,
    ) -> super::driver::Result<()> {
        for (delta, pause) in quiver_steps(target_y) {
            driver.scroll_by(delta).await?;
            self.pacing.sleep(self.pacing.scaled(pause)).await;
        }
        Ok(())
    }

    /// 1–4 small pointer moves inside the top-left corner of the viewport.
    pub async fn jitter(&self, driver: &mut dyn BrowserDriver) {
        let moves: Vec<(i64, i64)> = {
            let mut rng = rand::rng();
            let n = rng.random_range(1..=4);
            (0..n)
                .map(|_| (rng.random_range(0..=100), rng.random_range(0..=100)))
                .collect()
        };
        for (x, y) in moves {
            if let Err(e) = driver.move_pointer(x, y).await {
                debug!(error = %e, "pointer jitter failed");
                return;
            }
        }
    }

    /// Scroll down 300–800px, pause as if reading, jitter the pointer, and
    /// sometimes scroll back up a little. Failures are logged and ignored.
    pub async fn read_page(&self, driver: &mut dyn BrowserDriver) {
        let (depth, back) = {
            let mut rng = rand::rng();
            let depth = rng.random_range(300..=800);
            let back = rng.random_bool(0.4).then(|| rng.random_range(50..=150));
            (depth, back)
        };
        if let Err(e) = self.quiver_scroll(driver, depth).await {
            debug!(error = %e, "reading scroll failed");
            return;
        }
        self.wait(3.0, 1.0, None).await;
        self.jitter(driver).await;
        if let Some(back) = back {
            if let Err(e) = self.quiver_scroll(driver, -back).await {
                debug!(error = %e, "scroll back failed");
            }
        }
    }

    /// Delay between two keystrokes when typing.
    pub fn keystroke_delay(&self) -> Duration {
        self.pacing.uniform(0.060, 0.150)
    }
}

/// Planned wheel deltas and the pause (seconds, unscaled) after each.
pub fn quiver_steps(target_y: i64) -> Vec<(i64, f64)> {
    let direction = target_y.signum();
    let target = target_y.abs();
    let mut rng = rand::rng();
    let mut steps = Vec::new();
    let mut travelled = 0i64;
    while travelled < target {
        let step = (target - travelled).min(100) + rng.random_range(-15..=15);
        let step = step.max(1);
        steps.push((direction * step, rng.random_range(0.05..=0.2)));
        travelled += step;
        if rng.random_bool(0.1) {
            let back = rng.random_range(20..=50);
            steps.push((-direction * back, 0.1));
            travelled -= back;
        }
    }
    steps
}
