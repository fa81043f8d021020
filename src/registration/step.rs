//! Registration steps and the step table.

use serde::{Deserialize, Serialize};

/// The steps of an insurance registration.
///
/// Progresses linearly: Start → IdCardUpload → VehicleFrontUpload →
/// VehicleBackUpload → ConfirmData → CostCalculation → IssuancePending →
/// Finished. The only backward edge is ConfirmData → IdCardUpload, taken when
/// the user rejects the extracted data. "No registration" is `Option::None`
/// at the store level, not a variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Start,
    IdCardUpload,
    VehicleFrontUpload,
    VehicleBackUpload,
    ConfirmData,
    CostCalculation,
    IssuancePending,
    Finished,
}

impl Step {
    /// Every step in table order.
    pub const ALL: [Step; 8] = [
        Step::Start,
        Step::IdCardUpload,
        Step::VehicleFrontUpload,
        Step::VehicleBackUpload,
        Step::ConfirmData,
        Step::CostCalculation,
        Step::IssuancePending,
        Step::Finished,
    ];

    /// Successor in the step table. `Finished` has none; leaving it means
    /// removing the progress.
    pub fn next(&self) -> Option<Step> {
        use Step::*;
        match self {
            Start => Some(IdCardUpload),
            IdCardUpload => Some(VehicleFrontUpload),
            VehicleFrontUpload => Some(VehicleBackUpload),
            VehicleBackUpload => Some(ConfirmData),
            ConfirmData => Some(CostCalculation),
            CostCalculation => Some(IssuancePending),
            IssuancePending => Some(Finished),
            Finished => None,
        }
    }

    /// Check if a transition from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: Step) -> bool {
        self.next() == Some(target)
            || matches!((self, target), (Step::ConfirmData, Step::IdCardUpload))
    }

    /// Whether this step waits for a document photo.
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            Self::IdCardUpload | Self::VehicleFrontUpload | Self::VehicleBackUpload
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::IdCardUpload => "id_card_upload",
            Self::VehicleFrontUpload => "vehicle_front_upload",
            Self::VehicleBackUpload => "vehicle_back_upload",
            Self::ConfirmData => "confirm_data",
            Self::CostCalculation => "cost_calculation",
            Self::IssuancePending => "issuance_pending",
            Self::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_walks_all_steps_in_six_advances() {
        let mut current = Step::Start;
        let mut advances = 0;
        while let Some(next) = current.next() {
            assert!(current.can_transition_to(next));
            current = next;
            advances += 1;
        }
        assert_eq!(current, Step::Finished);
        assert_eq!(advances, Step::ALL.len() - 1);
    }

    #[test]
    fn table_order_matches_all() {
        for pair in Step::ALL.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
    }

    #[test]
    fn backward_edge_only_from_confirmation() {
        use Step::*;
        assert!(ConfirmData.can_transition_to(IdCardUpload));
        assert!(!CostCalculation.can_transition_to(IdCardUpload));
        assert!(!VehicleBackUpload.can_transition_to(IdCardUpload));
        // Skip
        assert!(!Start.can_transition_to(VehicleFrontUpload));
        // Self-transition
        assert!(!IdCardUpload.can_transition_to(IdCardUpload));
        // Terminal
        assert!(!Finished.can_transition_to(Start));
    }

    #[test]
    fn upload_steps() {
        let uploads: Vec<Step> = Step::ALL.into_iter().filter(Step::is_upload).collect();
        assert_eq!(
            uploads,
            vec![
                Step::IdCardUpload,
                Step::VehicleFrontUpload,
                Step::VehicleBackUpload
            ]
        );
    }

    #[test]
    fn default_is_start() {
        assert_eq!(Step::default(), Step::Start);
        assert_eq!(Step::Finished.next(), None);
    }

    #[test]
    fn display_matches_serde() {
        for step in Step::ALL {
            let display = format!("{step}");
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
    }
}
