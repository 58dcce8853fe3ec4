use crate::events::Condition;
use crate::hrf::{compute_regressor_with_config, BasisModel, RegressorConfig, RegressorError};
use serde::{Deserialize, Serialize};

/// Named regressor columns ready to hand to an external model fitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignMatrix {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl DesignMatrix {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }
}

/// Group-level one-sample design: a single column of ones, one row per
/// subject.
pub fn one_sample_design(n_subjects: usize, name: &str) -> DesignMatrix {
    DesignMatrix {
        names: vec![name.to_string()],
        columns: vec![vec![1.0; n_subjects]],
    }
}

/// First-level design: one block of basis regressors per condition, plus an
/// optional constant column.
pub fn event_design(
    conditions: &[Condition],
    model: BasisModel,
    frame_times: &[f64],
    cfg: &RegressorConfig,
    add_constant: bool,
) -> Result<DesignMatrix, RegressorError> {
    let mut names = Vec::new();
    let mut columns = Vec::new();
    for condition in conditions {
        let set = compute_regressor_with_config(condition, model, frame_times, cfg)?;
        names.extend(set.names);
        columns.extend(set.signals);
    }
    if add_constant {
        names.push("constant".into());
        columns.push(vec![1.0; frame_times.len()]);
    }
    Ok(DesignMatrix { names, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Condition, Event};

    #[test]
    fn one_sample_design_is_a_column_of_ones() {
        let design = one_sample_design(16, "left-right");
        assert_eq!(design.names, vec!["left-right"]);
        assert_eq!(design.n_rows(), 16);
        assert!(design.columns[0].iter().all(|&v| v == 1.0));
    }

    #[test]
    fn event_design_stacks_condition_blocks() {
        let frames: Vec<f64> = (0..41).map(|i| i as f64 * 0.5).collect();
        let conditions = vec![
            Condition::new("faces", vec![Event::new(0.0, 1.0, 1.0)]),
            Condition::new("houses", vec![Event::new(6.0, 1.0, 1.0)]),
        ];
        let cfg = RegressorConfig {
            oversampling: 16,
            ..Default::default()
        };
        let design =
            event_design(&conditions, BasisModel::GloverDerivative, &frames, &cfg, true).unwrap();
        assert_eq!(
            design.names,
            vec![
                "faces",
                "faces_derivative",
                "houses",
                "houses_derivative",
                "constant"
            ]
        );
        assert_eq!(design.n_columns(), 5);
        for column in &design.columns {
            assert_eq!(column.len(), frames.len());
        }
    }

    #[test]
    fn event_design_propagates_synthesis_errors() {
        let conditions = vec![Condition::new("bad", vec![Event::new(-1.0, 0.0, 1.0)])];
        let cfg = RegressorConfig::default();
        let err = event_design(&conditions, BasisModel::Glover, &[0.0, 1.0], &cfg, false)
            .unwrap_err();
        assert!(matches!(err, RegressorError::InvalidEvents(_)));
    }
}
