//! Ordering discipline for commands that touch both engines.
//!
//! Forward transitions run media first so the haptic engine never starts or
//! seeks ahead of a reference that is not yet valid. Stop runs the other way
//! round so the haptic engine never pulls from a reference that is already
//! gone.

use std::fmt;

use crate::{
    EngineFault, EngineResult, EngineRole, HapticEngine, MediaEngine, Result, SharedMedia,
    SyncError,
};

/// Single transport operation as issued to one engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportOp {
    Start,
    Pause,
    Stop,
    SeekTo(u64),
    SetSpeed(f32),
}

impl TransportOp {
    /// Stop is the only backward transition.
    pub fn is_backward(&self) -> bool {
        matches!(self, TransportOp::Stop)
    }

    fn apply_media(&self, media: &mut dyn MediaEngine) -> EngineResult<()> {
        match *self {
            TransportOp::Start => media.start(),
            TransportOp::Pause => media.pause(),
            TransportOp::Stop => media.stop(),
            TransportOp::SeekTo(position_ms) => media.seek_to(position_ms),
            TransportOp::SetSpeed(multiplier) => media.set_speed(multiplier),
        }
    }

    fn apply_haptic(&self, haptic: &mut dyn HapticEngine) -> EngineResult<()> {
        match *self {
            TransportOp::Start => haptic.start(),
            TransportOp::Pause => haptic.pause(),
            TransportOp::Stop => haptic.stop(),
            TransportOp::SeekTo(position_ms) => haptic.seek_to(position_ms),
            TransportOp::SetSpeed(multiplier) => haptic.set_speed(multiplier),
        }
    }
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportOp::Start => write!(f, "start"),
            TransportOp::Pause => write!(f, "pause"),
            TransportOp::Stop => write!(f, "stop"),
            TransportOp::SeekTo(position_ms) => write!(f, "seek_to({position_ms})"),
            TransportOp::SetSpeed(multiplier) => write!(f, "set_speed({multiplier})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandStep {
    pub engine: EngineRole,
    pub op: TransportOp,
}

/// Ordered list of engine calls making up one transport command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    steps: Vec<CommandStep>,
}

impl CommandPlan {
    /// Builds the plan for `op`, ordered by its direction.
    pub fn for_op(op: TransportOp) -> Self {
        let order = if op.is_backward() {
            [EngineRole::Secondary, EngineRole::Primary]
        } else {
            [EngineRole::Primary, EngineRole::Secondary]
        };
        Self {
            steps: order
                .into_iter()
                .map(|engine| CommandStep { engine, op })
                .collect(),
        }
    }

    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    /// Runs every step in order and stops at the first failure. Steps that
    /// already ran are not rolled back.
    pub fn execute(&self, media: &SharedMedia, haptic: &mut dyn HapticEngine) -> Result<()> {
        for step in &self.steps {
            tracing::debug!(engine = %step.engine, op = %step.op, "router step");
            let outcome = match step.engine {
                EngineRole::Primary => {
                    let mut media = media
                        .lock()
                        .map_err(|_| SyncError::msg("media engine has been poisoned"))?;
                    step.op.apply_media(&mut **media)
                }
                EngineRole::Secondary => step.op.apply_haptic(haptic),
            };

            outcome.map_err(|EngineFault(reason)| {
                tracing::warn!(
                    engine = %step.engine,
                    op = %step.op,
                    %reason,
                    "engine command failed"
                );
                SyncError::EngineCommand {
                    engine: step.engine,
                    command: step.op.to_string(),
                    reason,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(plan: &CommandPlan) -> Vec<EngineRole> {
        plan.steps().iter().map(|step| step.engine).collect()
    }

    #[test]
    fn forward_ops_lead_with_the_reference() {
        for op in [
            TransportOp::Start,
            TransportOp::Pause,
            TransportOp::SeekTo(5000),
            TransportOp::SetSpeed(1.5),
        ] {
            assert_eq!(
                roles(&CommandPlan::for_op(op)),
                vec![EngineRole::Primary, EngineRole::Secondary],
                "{op}"
            );
        }
    }

    #[test]
    fn stop_leads_with_the_haptic_engine() {
        assert_eq!(
            roles(&CommandPlan::for_op(TransportOp::Stop)),
            vec![EngineRole::Secondary, EngineRole::Primary]
        );
    }

    #[test]
    fn ops_render_with_arguments() {
        assert_eq!(TransportOp::SeekTo(5000).to_string(), "seek_to(5000)");
        assert_eq!(TransportOp::SetSpeed(1.5).to_string(), "set_speed(1.5)");
    }
}
