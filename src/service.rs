use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::schedule::Timer;

/// Progress a service reports back to the loop, e.g. an update transfer.
#[derive(Debug)]
pub enum ServiceStatus {
    Started,
    Progress { done: u64, total: u64 },
    Finished,
    Failed(anyhow::Error),
}

/// A collaborator that is started once and then serviced on every loop
/// iteration. Servicing must not block.
pub trait Service {
    fn name(&self) -> &str;

    fn begin(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn service_once(&mut self, now: Instant);

    /// Next pending status report, if any. Polled after every
    /// `service_once` until it returns `None`.
    fn status(&mut self) -> Option<ServiceStatus> {
        None
    }
}

fn report(name: &str, status: &ServiceStatus) {
    match status {
        ServiceStatus::Started => info!("{name}: started"),
        ServiceStatus::Progress { done, total } => debug!("{name}: {done}/{total}"),
        ServiceStatus::Finished => info!("{name}: finished"),
        ServiceStatus::Failed(err) => warn!("{name}: failed: {err:?}"),
    }
}

#[derive(Default)]
pub struct Services {
    services: Vec<Box<dyn Service>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, service: impl Service + 'static) {
        self.services.push(Box::new(service));
    }

    /// Starts every service. A service that fails to start is still
    /// serviced; the failure is only logged.
    pub fn begin_all(&mut self) {
        for service in &mut self.services {
            match service.begin() {
                Ok(()) => info!("started {}", service.name()),
                Err(err) => warn!("failed to start {}: {err:?}", service.name()),
            }
        }
    }

    /// Services everything once and logs any status reports. Returns how
    /// many reports were logged.
    pub fn service_all(&mut self, now: Instant) -> usize {
        let mut reported = 0;
        for service in &mut self.services {
            service.service_once(now);
            while let Some(status) = service.status() {
                report(service.name(), &status);
                reported += 1;
            }
        }
        reported
    }
}

/// Logs how fast the control loop is spinning.
pub struct FrameStats {
    timer: Timer,
    window_start: Instant,
    frames: u64,
    #[cfg_attr(not(test), allow(dead_code))]
    last_rate: Option<f64>,
}

impl FrameStats {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            timer: Timer::new(period, start),
            window_start: start,
            frames: 0,
            last_rate: None,
        }
    }

    /// Loop iterations per second over the last completed window.
    #[cfg(test)]
    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }
}

impl Service for FrameStats {
    fn name(&self) -> &str {
        "frame stats"
    }

    fn service_once(&mut self, now: Instant) {
        self.frames += 1;

        if self.timer.ready(now) {
            let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
            if elapsed > 0.0 {
                let rate = self.frames as f64 / elapsed;
                debug!("control loop running at {rate:.0} Hz");
                self.last_rate = Some(rate);
            }

            self.window_start = now;
            self.frames = 0;
        }
    }
}
