//! Pipeline session
//!
//! Pure state for the eight-stage wizard. All mutation goes through
//! [`PipelineSession::complete_stage`] and [`PipelineSession::navigate_to`];
//! readers get copies.

use ferry_core::domain::pipeline::{SessionSnapshot, Stage, StageData};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{FerryError, Result};

/// Converts an externally supplied stage number
pub fn stage_from_number(number: u8) -> Result<Stage> {
    Stage::try_from(number).map_err(|reason| FerryError::InvalidStage {
        stage: number,
        reason,
    })
}

#[derive(Debug, Clone)]
pub struct PipelineSession {
    current_stage: Stage,
    active_stage: Stage,
    completed_stages: BTreeSet<Stage>,
    stale_stages: BTreeSet<Stage>,
    data: StageData,
}

impl Default for PipelineSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineSession {
    pub fn new() -> Self {
        Self {
            current_stage: Stage::PackageSelection,
            active_stage: Stage::PackageSelection,
            completed_stages: BTreeSet::new(),
            stale_stages: BTreeSet::new(),
            data: StageData::default(),
        }
    }

    /// Furthest stage reached
    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    /// Stage last navigated to or advanced into
    pub fn active_stage(&self) -> Stage {
        self.active_stage
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Completed, but an upstream stage was completed again afterwards
    pub fn is_stale(&self, stage: Stage) -> bool {
        self.stale_stages.contains(&stage)
    }

    /// Fails unless every upstream stage's output is present
    pub fn check_prerequisites(&self, stage: Stage) -> Result<()> {
        for upstream in stage.upstream() {
            let field = upstream.output_field();
            if !self.data.has(field) {
                return Err(FerryError::invalid_stage(
                    stage,
                    format!("requires {} from stage {}", field, upstream),
                ));
            }
        }
        Ok(())
    }

    /// Records a stage's output and advances the frontier
    ///
    /// `partial` may only carry the field the stage owns. Completing a stage
    /// that was already completed marks every completed downstream stage
    /// stale; their data is kept.
    pub fn complete_stage(&mut self, stage: Stage, partial: StageData) -> Result<()> {
        let owned = stage.output_field();
        if let Some(foreign) = partial.fields().into_iter().find(|field| *field != owned) {
            return Err(FerryError::invalid_stage(
                stage,
                format!("cannot write {}, which another stage owns", foreign),
            ));
        }
        if !partial.has(owned) && !self.data.has(owned) {
            return Err(FerryError::invalid_stage(
                stage,
                format!("completing it requires {}", owned),
            ));
        }
        self.check_prerequisites(stage)?;

        let recompleted = self.completed_stages.contains(&stage);
        self.data.merge(partial);
        self.completed_stages.insert(stage);
        self.stale_stages.remove(&stage);

        if recompleted {
            let downstream: Vec<Stage> = self
                .completed_stages
                .iter()
                .copied()
                .filter(|completed| *completed > stage)
                .collect();
            if !downstream.is_empty() {
                debug!("{} completed again; {} downstream stage(s) stale", stage, downstream.len());
            }
            self.stale_stages.extend(downstream);
        }

        if stage == self.current_stage {
            self.current_stage = stage.next().unwrap_or(stage);
        }
        self.active_stage = stage.next().unwrap_or(stage);

        debug!("Completed {}; frontier at {}", stage, self.current_stage);
        Ok(())
    }

    /// Moves the view to a reached or completed stage; never clears data
    pub fn navigate_to(&mut self, stage: Stage) -> Result<()> {
        if stage > self.current_stage && !self.completed_stages.contains(&stage) {
            return Err(FerryError::NavigationBlocked {
                target: stage,
                current: self.current_stage,
            });
        }
        self.active_stage = stage;
        Ok(())
    }

    /// Copy of the accumulated data
    pub fn current_stage_data(&self) -> StageData {
        self.data.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_stage: self.current_stage,
            active_stage: self.active_stage,
            completed_stages: self.completed_stages.clone(),
            stale_stages: self.stale_stages.clone(),
            data: self.data.clone(),
        }
    }

    /// Borrowed view for code in this crate that only reads
    pub(crate) fn data(&self) -> &StageData {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::environment::{Environment, EnvironmentConfig, ValidationReport};
    use ferry_core::domain::pipeline::StageField;
    use std::collections::BTreeMap;

    fn configured() -> StageData {
        StageData {
            configurations: Some(BTreeMap::from([(
                Environment::Development,
                EnvironmentConfig::new(Environment::Development),
            )])),
            ..Default::default()
        }
    }

    fn validated() -> StageData {
        StageData {
            validation_results: Some(ValidationReport::default()),
            ..Default::default()
        }
    }

    fn session_at_validation() -> PipelineSession {
        let mut session = PipelineSession::new();
        session
            .complete_stage(Stage::PackageSelection, StageData::with_selected_packages(["A"]))
            .unwrap();
        session
            .complete_stage(Stage::FlowSelection, StageData::with_selected_flows(["X"]))
            .unwrap();
        session.complete_stage(Stage::Configuration, configured()).unwrap();
        session
    }

    #[test]
    fn test_first_two_stages_accumulate() {
        let mut session = PipelineSession::new();
        session
            .complete_stage(
                Stage::PackageSelection,
                StageData::with_selected_packages(["A", "B"]),
            )
            .unwrap();
        session
            .complete_stage(Stage::FlowSelection, StageData::with_selected_flows(["X"]))
            .unwrap();

        let data = session.current_stage_data();
        assert_eq!(
            data.selected_packages,
            Some(BTreeSet::from(["A".to_string(), "B".to_string()]))
        );
        assert_eq!(data.selected_flows, Some(BTreeSet::from(["X".to_string()])));
        assert_eq!(session.current_stage(), Stage::Configuration);
    }

    #[test]
    fn test_missing_upstream_is_invalid_stage() {
        let mut session = PipelineSession::new();
        let err = session
            .complete_stage(Stage::Configuration, configured())
            .unwrap_err();

        assert!(matches!(err, FerryError::InvalidStage { stage: 3, .. }));
        assert_eq!(session.current_stage(), Stage::PackageSelection);
        assert!(session.current_stage_data().fields().is_empty());
    }

    #[test]
    fn test_foreign_field_is_rejected() {
        let mut session = PipelineSession::new();
        let mut partial = StageData::with_selected_packages(["A"]);
        partial.selected_flows = Some(BTreeSet::from(["X".to_string()]));

        let err = session
            .complete_stage(Stage::PackageSelection, partial)
            .unwrap_err();
        assert!(matches!(err, FerryError::InvalidStage { stage: 1, .. }));
        assert!(!session.is_completed(Stage::PackageSelection));
    }

    #[test]
    fn test_stage_without_output_is_rejected() {
        let mut session = PipelineSession::new();
        let err = session
            .complete_stage(Stage::PackageSelection, StageData::default())
            .unwrap_err();
        assert!(matches!(err, FerryError::InvalidStage { .. }));
    }

    #[test]
    fn test_navigation_gating_over_all_stages() {
        let session = session_at_validation();
        assert_eq!(session.current_stage(), Stage::Validation);

        for stage in Stage::ALL {
            let mut probe = session.clone();
            let allowed = stage <= session.current_stage() || session.is_completed(stage);
            assert_eq!(probe.navigate_to(stage).is_ok(), allowed, "{}", stage);
        }
    }

    #[test]
    fn test_navigation_blocked_names_both_stages() {
        let mut session = PipelineSession::new();
        let err = session.navigate_to(Stage::Upload).unwrap_err();
        assert!(matches!(
            err,
            FerryError::NavigationBlocked {
                target: Stage::Upload,
                current: Stage::PackageSelection
            }
        ));
    }

    #[test]
    fn test_navigating_back_keeps_data_and_frontier() {
        let mut session = session_at_validation();
        let before = session.current_stage_data();

        session.navigate_to(Stage::PackageSelection).unwrap();

        assert_eq!(session.active_stage(), Stage::PackageSelection);
        assert_eq!(session.current_stage(), Stage::Validation);
        assert_eq!(session.current_stage_data(), before);
        session.navigate_to(Stage::Validation).unwrap();
    }

    #[test]
    fn test_merge_never_removes_keys() {
        let mut session = PipelineSession::new();
        let steps = [
            (Stage::PackageSelection, StageData::with_selected_packages(["A"])),
            (Stage::FlowSelection, StageData::with_selected_flows(["X"])),
            (Stage::Configuration, configured()),
            (Stage::Validation, validated()),
            (Stage::FlowSelection, StageData::with_selected_flows(["Y"])),
            (Stage::PackageSelection, StageData::with_selected_packages(["B"])),
        ];

        let mut seen: BTreeSet<StageField> = BTreeSet::new();
        for (stage, partial) in steps {
            session.complete_stage(stage, partial).unwrap();
            let fields = session.current_stage_data().fields();
            assert!(fields.is_superset(&seen));
            seen = fields;
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_recompleting_marks_downstream_stale() {
        let mut session = session_at_validation();
        session.complete_stage(Stage::Validation, validated()).unwrap();

        session.navigate_to(Stage::FlowSelection).unwrap();
        session
            .complete_stage(Stage::FlowSelection, StageData::with_selected_flows(["Y"]))
            .unwrap();

        assert!(!session.is_stale(Stage::FlowSelection));
        assert!(session.is_stale(Stage::Configuration));
        assert!(session.is_stale(Stage::Validation));
        assert!(!session.is_stale(Stage::PackageSelection));
        assert_eq!(session.current_stage(), Stage::DependencyAnalysis);
        assert_eq!(session.active_stage(), Stage::Configuration);

        session.complete_stage(Stage::Configuration, configured()).unwrap();
        assert!(!session.is_stale(Stage::Configuration));
        assert!(session.is_stale(Stage::Validation));
    }

    #[test]
    fn test_frontier_stays_at_last_stage() {
        let mut session = session_at_validation();
        session.complete_stage(Stage::Validation, validated()).unwrap();
        let rest = [
            (
                Stage::DependencyAnalysis,
                StageData {
                    dependency_results: Some(BTreeMap::new()),
                    ..Default::default()
                },
            ),
            (
                Stage::Upload,
                StageData {
                    upload_results: Some(Vec::new()),
                    ..Default::default()
                },
            ),
            (
                Stage::Deploy,
                StageData {
                    deployment_results: Some(Vec::new()),
                    ..Default::default()
                },
            ),
            (
                Stage::Test,
                StageData {
                    test_results: Some(Vec::new()),
                    ..Default::default()
                },
            ),
        ];
        for (stage, partial) in rest {
            session.complete_stage(stage, partial).unwrap();
        }

        assert_eq!(session.current_stage(), Stage::Test);
        assert_eq!(session.snapshot().completed_stages.len(), 8);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut session = session_at_validation();
        let snapshot = session.snapshot();

        session.complete_stage(Stage::Validation, validated()).unwrap();

        assert_eq!(snapshot.current_stage, Stage::Validation);
        assert!(snapshot.data.validation_results.is_none());
    }

    #[test]
    fn test_stage_numbers_out_of_range() {
        assert_eq!(stage_from_number(5).unwrap(), Stage::DependencyAnalysis);
        assert!(matches!(
            stage_from_number(9),
            Err(FerryError::InvalidStage { stage: 9, .. })
        ));
        assert!(stage_from_number(0).is_err());
    }
}
