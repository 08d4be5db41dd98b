//! Ambient load mover on a DAQ digital line.
//!
//! The mover is a pneumatic or solenoid actuator switched by one digital output bit.
//! Which level means "load in" depends on the wiring, so it is configurable.

use crate::hardware::capabilities::{DigitalOutput, HardwareResult, LoadActuator, LoadState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::debug;

/// Load actuator driven by a digital output line.
pub struct DigitalLoadMover<B> {
    board: Arc<B>,
    control_bit: u8,
    load_in_state: bool,
    switch_time: Duration,
    state: RwLock<Option<LoadState>>,
}

impl<B> DigitalLoadMover<B>
where
    B: DigitalOutput,
{
    /// Create a mover on `control_bit`. Writing `load_in_state` puts the load in.
    pub fn new(board: Arc<B>, control_bit: u8, load_in_state: bool) -> Self {
        Self {
            board,
            control_bit,
            load_in_state,
            switch_time: Duration::ZERO,
            state: RwLock::new(None),
        }
    }

    /// Time the mechanism needs to complete a move.
    pub fn with_switch_time(mut self, switch_time: Duration) -> Self {
        self.switch_time = switch_time;
        self
    }

    /// Last commanded position, `None` before the first move.
    pub async fn current_state(&self) -> Option<LoadState> {
        *self.state.read().await
    }

    fn level_for(&self, state: LoadState) -> bool {
        match state {
            LoadState::In => self.load_in_state,
            LoadState::Out => !self.load_in_state,
        }
    }
}

#[async_trait]
impl<B> LoadActuator for DigitalLoadMover<B>
where
    B: DigitalOutput,
{
    async fn set_state(&self, state: LoadState) -> HardwareResult<()> {
        let level = self.level_for(state);
        debug!(load = %state, bit = self.control_bit, level, "Moving load");
        self.board.write_bit(self.control_bit, level).await?;
        sleep(self.switch_time).await;
        *self.state.write().await = Some(state);
        Ok(())
    }
}
