//! Autopilot: walks the wizard sequence, generating whatever is missing.
//!
//! The state machine is split in two. [`decide`] is a pure function of the
//! current step and project; [`Autopilot`] applies decisions against a
//! [`Forge`] and owns the timing. The outline step is a checkpoint: once an
//! outline exists the autopilot hands control back instead of writing
//! chapters on its own.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::ForgeError;
use crate::forge::Forge;
use crate::project::Project;
use crate::steps::Step;
use crate::wire::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A generation is in flight; look again next tick.
    Wait,
    Generate(Step),
    Advance(Step),
    /// Disarm and move to the given step.
    Checkpoint(Step),
    /// Disarm where we are.
    Stop,
}

pub fn decide(step: Step, project: &Project, busy: bool) -> Decision {
    if busy {
        return Decision::Wait;
    }
    match step {
        Step::Outline if Step::Outline.is_populated(project) => Decision::Checkpoint(Step::ChapterGen),
        Step::ChapterGen => Decision::Stop,
        s if !s.is_sequenced() => Decision::Stop,
        s if !s.is_populated(project) => Decision::Generate(s),
        s => match s.next() {
            Some(n) => Decision::Advance(n),
            None => Decision::Stop,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not armed; nothing happened.
    Idle,
    Waiting,
    Generated(Step, Generation),
    Advanced(Step),
    /// Reached the outline checkpoint; disarmed on the given step.
    Paused(Step),
    /// Disarmed on a step it will not drive.
    Stopped(Step),
}

#[derive(Debug)]
pub struct Autopilot {
    armed: bool,
    step: Step,
    tick: Duration,
}

impl Autopilot {
    pub fn new(step: Step, tick: Duration) -> Self {
        Self { armed: false, step, tick }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// One step of the state machine.
    ///
    /// A failed generation leaves its failure text in the field and disarms,
    /// so the sequence never builds on an error message.
    pub async fn tick(&mut self, forge: &mut Forge) -> Result<TickOutcome, ForgeError> {
        if !self.armed {
            return Ok(TickOutcome::Idle);
        }
        let decision = decide(self.step, &forge.project, forge.is_busy());
        debug!(step = ?self.step, ?decision, "autopilot tick");
        Ok(match decision {
            Decision::Wait => TickOutcome::Waiting,
            Decision::Generate(step) => match forge.generate_step(step).await {
                Ok(outcome) => {
                    if !outcome.is_ok() {
                        warn!(?step, "generation failed; autopilot disarmed");
                        self.armed = false;
                    }
                    TickOutcome::Generated(step, outcome)
                }
                Err(ForgeError::Busy) => TickOutcome::Waiting,
                Err(e) => {
                    self.armed = false;
                    return Err(e);
                }
            },
            Decision::Advance(next) => {
                self.step = next;
                TickOutcome::Advanced(next)
            }
            Decision::Checkpoint(next) => {
                info!("outline ready; autopilot paused for review");
                self.armed = false;
                self.step = next;
                TickOutcome::Paused(next)
            }
            Decision::Stop => {
                self.armed = false;
                TickOutcome::Stopped(self.step)
            }
        })
    }

    /// Tick until disarmed. Every tick is preceded by the tick delay; a
    /// disarm request through `stop` cancels the pending delay and ends the
    /// run without another tick.
    pub async fn run(
        &mut self,
        forge: &mut Forge,
        mut stop: watch::Receiver<bool>,
        on_event: &mut dyn FnMut(&TickOutcome, &Project),
    ) -> Result<(), ForgeError> {
        while self.armed {
            tokio::select! {
                biased;
                _ = disarm_requested(&mut stop) => {
                    info!("autopilot disarmed");
                    self.disarm();
                    break;
                }
                _ = tokio::time::sleep(self.tick) => {}
            }
            let outcome = self.tick(forge).await?;
            on_event(&outcome, &forge.project);
        }
        Ok(())
    }
}

/// Relay interrupts from `next_interrupt` (Ctrl-C in the CLI). The first one
/// disarms through `stop`; the call then keeps listening and returns `true`
/// on a second interrupt so the caller can abort an in-flight generation.
/// Returns `false` if the interrupt source fails.
pub async fn relay_interrupts<S, F>(mut next_interrupt: S, stop: watch::Sender<bool>) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("interrupt: disarming after the current step; interrupt again to abort");
    let _ = stop.send(true);
    next_interrupt().await.is_ok()
}

/// Resolves once `stop` holds `true`. Never resolves if the sender is gone.
async fn disarm_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
