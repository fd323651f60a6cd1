//! Collaborator interfaces and the operator interlock
//!
//! The engine never talks to relays, badge readers or files directly. Those
//! backends implement the traits below; the [`Interlock`] only energizes the
//! machine's relay outputs once the authorizer has approved the operator.

use crate::error::{ControllerError, Result};

/// Relay or GPIO actuator driving the machine's power outputs
pub trait RelayActuator: Send {
    /// Drive an output to the given electrical level
    fn set_output(&mut self, id: u8, level: bool) -> Result<()>;

    /// Read back the electrical level of an output
    fn read_output(&mut self, id: u8) -> Result<bool>;
}

/// Operator authorization check (badge reader, PAM, ...)
pub trait OperatorAuthorizer: Send {
    /// True when an operator is present and permitted to run the machine
    fn is_authorized(&mut self) -> bool;
}

/// Source of raw command lines for one job
pub trait JobSource {
    /// Human readable origin, used in logs
    fn name(&self) -> String;

    /// Read every raw command line in order
    fn lines(&mut self) -> Result<Vec<String>>;
}

/// One relay output switched by the interlock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutput {
    /// Output identifier understood by the actuator
    pub id: u8,
    /// Relay boards that energize on a low level
    pub active_low: bool,
}

impl RelayOutput {
    /// Output energized by a high level
    pub fn active_high(id: u8) -> Self {
        Self {
            id,
            active_low: false,
        }
    }

    /// Output energized by a low level
    pub fn active_low(id: u8) -> Self {
        Self {
            id,
            active_low: true,
        }
    }

    fn level(&self, energized: bool) -> bool {
        energized != self.active_low
    }
}

/// Gate between operator authorization and machine power
pub struct Interlock {
    relay: Box<dyn RelayActuator>,
    authorizer: Box<dyn OperatorAuthorizer>,
    /// Energized in order on power up, de-energized in reverse
    outputs: Vec<RelayOutput>,
}

impl Interlock {
    /// Create an interlock over the given outputs
    pub fn new(
        relay: Box<dyn RelayActuator>,
        authorizer: Box<dyn OperatorAuthorizer>,
        outputs: Vec<RelayOutput>,
    ) -> Self {
        Self {
            relay,
            authorizer,
            outputs,
        }
    }

    /// Energize every output if the operator is authorized
    pub fn power_up(&mut self) -> Result<()> {
        if !self.authorizer.is_authorized() {
            tracing::warn!("Interlock refused power up: operator not authorized");
            return Err(ControllerError::NotAuthorized.into());
        }

        for output in &self.outputs {
            self.relay.set_output(output.id, output.level(true))?;
        }
        tracing::info!("Interlock energized {} outputs", self.outputs.len());
        Ok(())
    }

    /// De-energize every output, last energized first
    pub fn power_down(&mut self) -> Result<()> {
        for output in self.outputs.iter().rev() {
            self.relay.set_output(output.id, output.level(false))?;
        }
        tracing::info!("Interlock de-energized {} outputs", self.outputs.len());
        Ok(())
    }

    /// True when every output reads back as energized
    pub fn is_powered(&mut self) -> Result<bool> {
        for output in &self.outputs {
            if self.relay.read_output(output.id)? != output.level(true) {
                return Ok(false);
            }
        }
        Ok(!self.outputs.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeRelay {
        levels: Arc<Mutex<HashMap<u8, bool>>>,
        writes: Arc<Mutex<Vec<(u8, bool)>>>,
    }

    impl RelayActuator for FakeRelay {
        fn set_output(&mut self, id: u8, level: bool) -> Result<()> {
            self.levels.lock().unwrap().insert(id, level);
            self.writes.lock().unwrap().push((id, level));
            Ok(())
        }

        fn read_output(&mut self, id: u8) -> Result<bool> {
            Ok(*self.levels.lock().unwrap().get(&id).unwrap_or(&false))
        }
    }

    struct FixedAuthorizer(bool);

    impl OperatorAuthorizer for FixedAuthorizer {
        fn is_authorized(&mut self) -> bool {
            self.0
        }
    }

    fn outputs() -> Vec<RelayOutput> {
        vec![
            RelayOutput::active_low(21),
            RelayOutput::active_low(27),
            RelayOutput::active_high(20),
        ]
    }

    #[test]
    fn test_power_up_requires_authorization() {
        let relay = FakeRelay::default();
        let mut interlock = Interlock::new(
            Box::new(relay.clone()),
            Box::new(FixedAuthorizer(false)),
            outputs(),
        );

        let err = interlock.power_up().unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Controller(ControllerError::NotAuthorized)
        ));
        assert!(relay.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_power_cycle_respects_polarity_and_order() {
        let relay = FakeRelay::default();
        let mut interlock = Interlock::new(
            Box::new(relay.clone()),
            Box::new(FixedAuthorizer(true)),
            outputs(),
        );

        interlock.power_up().unwrap();
        assert!(interlock.is_powered().unwrap());
        interlock.power_down().unwrap();
        assert!(!interlock.is_powered().unwrap());

        let writes = relay.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            vec![
                (21, false),
                (27, false),
                (20, true),
                (20, false),
                (27, true),
                (21, true),
            ]
        );
    }
}
