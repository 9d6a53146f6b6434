use flowde_core::config::LayoutConfig;
use flowde_core::error::{FlowError, Result};
use flowde_core::types::{InsertionMode, Position, Step};

/// Deterministic coordinates for newly created steps.
#[derive(Debug, Clone)]
pub struct PositionAllocator {
    main_step_dx: f64,
    after_dy: f64,
    child_dx: f64,
    default_position: Position,
}

impl PositionAllocator {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            main_step_dx: config.main_step_dx,
            after_dy: config.after_dy,
            child_dx: config.child_dx,
            default_position: config.default_position,
        }
    }

    /// Position of a step inserted relative to `reference` with `mode`.
    ///
    /// `Unanchored` ignores the reference and yields the default position.
    pub fn allocate(&self, reference: Option<&Step>, mode: InsertionMode) -> Result<Position> {
        if mode == InsertionMode::Unanchored {
            return Ok(self.default_position);
        }
        let reference = reference.ok_or_else(|| {
            FlowError::InvalidInput(format!("reference step required for '{}' insertion", mode))
        })?;
        let origin = reference.position();
        match mode {
            InsertionMode::NewMainStep => {
                if !reference.is_main() {
                    return Err(FlowError::invalid_reference(
                        reference.id,
                        "reference must be a main step for 'new_main_step' insertion",
                    ));
                }
                Ok(origin.offset(self.main_step_dx, 0.0))
            }
            InsertionMode::InsertAfter => Ok(origin.offset(0.0, self.after_dy)),
            InsertionMode::InsertAsChild => Ok(origin.offset(self.child_dx, 0.0)),
            InsertionMode::Unanchored => Ok(self.default_position),
        }
    }

    /// Position of the `index`-th main step of a seeded outline.
    pub fn seeded_main(&self, origin: Position, index: usize) -> Position {
        origin.offset(self.main_step_dx * index as f64, 0.0)
    }

    /// Position of the `index`-th sub-step below a seeded main step.
    pub fn seeded_sub(&self, parent: Position, index: usize) -> Position {
        parent.offset(0.0, self.after_dy * (index + 1) as f64)
    }
}

impl Default for PositionAllocator {
    fn default() -> Self {
        Self::new(&LayoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowde_core::types::{AssignmentId, StepId, StepRole};

    fn step_at(parent: Option<i64>, x: f64, y: f64) -> Step {
        Step {
            id: StepId(10),
            assignment_id: AssignmentId(1),
            role: StepRole::from_parent(parent.map(StepId)),
            content: "ref".into(),
            position_x: x,
            position_y: y,
            completed: false,
        }
    }

    #[test]
    fn test_new_main_step_moves_right() {
        let alloc = PositionAllocator::default();
        let pos = alloc
            .allocate(Some(&step_at(None, 100.0, 40.0)), InsertionMode::NewMainStep)
            .unwrap();
        assert_eq!(pos, Position::new(350.0, 40.0));
    }

    #[test]
    fn test_new_main_step_rejects_sub_step_reference() {
        let alloc = PositionAllocator::default();
        let err = alloc
            .allocate(Some(&step_at(Some(1), 0.0, 0.0)), InsertionMode::NewMainStep)
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidReference { .. }));
    }

    #[test]
    fn test_after_moves_down_for_either_role() {
        let alloc = PositionAllocator::default();
        for parent in [None, Some(3)] {
            let pos = alloc
                .allocate(Some(&step_at(parent, 20.0, 30.0)), InsertionMode::InsertAfter)
                .unwrap();
            assert_eq!(pos, Position::new(20.0, 110.0));
        }
    }

    #[test]
    fn test_child_moves_right_by_child_offset() {
        let alloc = PositionAllocator::default();
        let pos = alloc
            .allocate(Some(&step_at(None, 0.0, 0.0)), InsertionMode::InsertAsChild)
            .unwrap();
        assert_eq!(pos, Position::new(150.0, 0.0));
    }

    #[test]
    fn test_unanchored_uses_default() {
        let config = LayoutConfig {
            default_position: Position::new(7.0, 8.0),
            ..LayoutConfig::default()
        };
        let alloc = PositionAllocator::new(&config);
        assert_eq!(
            alloc.allocate(None, InsertionMode::Unanchored).unwrap(),
            Position::new(7.0, 8.0)
        );
        assert!(alloc.allocate(None, InsertionMode::InsertAfter).is_err());
    }

    #[test]
    fn test_seeded_grid() {
        let alloc = PositionAllocator::default();
        let origin = Position::new(100.0, 100.0);
        assert_eq!(alloc.seeded_main(origin, 2), Position::new(600.0, 100.0));
        assert_eq!(
            alloc.seeded_sub(Position::new(600.0, 100.0), 0),
            Position::new(600.0, 180.0)
        );
    }
}
