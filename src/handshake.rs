use std::fmt;
use tracing::{debug, info};

use crate::{
    driver::{DeviceDriver, ScaleTransport},
    error::Result,
    types::UserProfile,
};

/// Result of driving one handshake step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step issued its transport operation; call again once it is confirmed
    MoreStepsRemain,
    /// Nothing left to do in this phase
    Done,
}

/// Initialization steps of the Exingtech Y1 handshake, in issue order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    /// Subscribe to the measurement characteristic
    EnableMeasurementNotifications,
    /// Subscribe to the auxiliary characteristic
    EnableAuxiliaryNotifications,
    /// Write the user profile command
    SendUserProfile,
}

impl InitStep {
    /// Number of initialization steps
    pub const COUNT: usize = 3;

    /// Map a step index onto its step, `None` once the handshake is complete
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::EnableMeasurementNotifications),
            1 => Some(Self::EnableAuxiliaryNotifications),
            2 => Some(Self::SendUserProfile),
            _ => None,
        }
    }

    /// Position of this step in the handshake
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::EnableMeasurementNotifications => 0,
            Self::EnableAuxiliaryNotifications => 1,
            Self::SendUserProfile => 2,
        }
    }
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableMeasurementNotifications => write!(f, "0 (enable measurement notifications)"),
            Self::EnableAuxiliaryNotifications => write!(f, "1 (enable auxiliary notifications)"),
            Self::SendUserProfile => write!(f, "2 (send user profile)"),
        }
    }
}

/// Per-connection handshake state
///
/// Holds the step counter for one connection lifecycle. Create a fresh
/// sequencer (or [`reset`](Self::reset) it) on every connect, reconnects
/// included. The counter only moves forward after the transport accepted the
/// current step, so a rejected step can simply be advanced again.
///
/// # Examples
///
/// ```no_run
/// use vscale::{ExingtechY1, Gender, HandshakeSequencer, UserProfile};
/// # async fn demo(transport: &dyn vscale::ScaleTransport) -> vscale::Result<()> {
/// let profile = UserProfile::new(Gender::Female, 170, 34, 5);
/// let mut handshake = HandshakeSequencer::new();
/// handshake.run(&ExingtechY1, transport, &profile).await?;
/// assert!(handshake.is_done());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandshakeSequencer {
    step: usize,
    done: bool,
}

impl HandshakeSequencer {
    /// Create a sequencer positioned at step 0
    #[must_use]
    pub const fn new() -> Self {
        Self {
            step: 0,
            done: false,
        }
    }

    /// Index of the next step to issue
    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    /// Whether the driver reported the handshake complete
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Return to step 0 for a new connection
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Issue the current step
    ///
    /// Call once on connect and again after each step's transport operation
    /// has been confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`ScaleError::TransportRejected`](crate::ScaleError::TransportRejected)
    /// if the transport refused the step. The counter is left unchanged.
    pub async fn advance(
        &mut self,
        driver: &dyn DeviceDriver,
        transport: &dyn ScaleTransport,
        profile: &UserProfile,
    ) -> Result<StepOutcome> {
        let outcome = driver.init_step(self.step, transport, profile).await?;

        match outcome {
            StepOutcome::MoreStepsRemain => self.step += 1,
            StepOutcome::Done => self.done = true,
        }

        Ok(outcome)
    }

    /// Drive the handshake until the driver reports it complete
    ///
    /// Each step is awaited before the next one is issued.
    ///
    /// # Errors
    ///
    /// Stops at the first rejected step and returns its error.
    pub async fn run(
        &mut self,
        driver: &dyn DeviceDriver,
        transport: &dyn ScaleTransport,
        profile: &UserProfile,
    ) -> Result<()> {
        info!("Starting {} handshake", driver.device_name());

        while self.advance(driver, transport, profile).await? == StepOutcome::MoreStepsRemain {
            debug!("Handshake step {} confirmed", self.step - 1);
        }

        info!("{} handshake complete", driver.device_name());
        Ok(())
    }
}
