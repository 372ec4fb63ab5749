// Copyright (C) 2025 The Bookkeeping Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run definition classification.
//!
//! The definition of a run is derived from its detector, trigger and
//! workflow attributes plus the stable-beam window of its LHC fill. It is
//! never stored: every read recomputes it through [`classify`].
//!
//! Decision order (first match wins):
//!
//! 1. Full data-taking chain (`dcs && dd_flp && epn`, trigger `CTP`, a
//!    processing time-frame-builder mode, `CTF` in the workflow parameters):
//!    `PHYSICS` when ITS or FT0 took part and the fill reached stable
//!    beams, `COSMICS` otherwise.
//! 2. `TECHNICAL` when both the run type and the PDP beam type are
//!    technical.
//! 3. `SYNTHETIC` for replayed data: no DCS, trigger `OFF`, no `CTF`, and a
//!    readout configuration URI matching both replay patterns.
//! 4. No definition.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{LhcFill, Run, RunDefinition, split_detectors};

/// Time-frame-builder modes of a full data-taking chain.
pub const PROCESSING_TF_BUILDER_MODES: &[&str] = &["processing", "processing-disk"];

/// Detectors whose presence makes a stable-beam run a physics run.
pub const PHYSICS_DETECTORS: &[&str] = &["ITS", "FT0"];

const CTF_TOKEN: &str = "CTF";
const TECHNICAL: &str = "technical";

static REPLAY_CFG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"replay[^/]*/(?:.*/)?chf").expect("replay readout pattern is valid")
});

// Both patterns must match the same URI for a run to be synthetic. Realistic
// replay URIs rarely satisfy both; kept as is until checked against
// production configuration strings.
static BEAM_CFG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:pp|pbpb)[^/]*/(?:.*/)?chf").expect("beam readout pattern is valid")
});

/// Everything the classifier looks at.
///
/// Absent values never fail classification, they only make the condition
/// that needs them false.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationInput<'a> {
    pub detectors: Option<&'a str>,
    pub lhc_fill: Option<&'a LhcFill>,
    pub trigger_value: Option<&'a str>,
    pub dcs: Option<bool>,
    pub dd_flp: Option<bool>,
    pub epn: Option<bool>,
    pub tfb_dd_mode: Option<&'a str>,
    pub pdp_workflow_parameters: Option<&'a str>,
    pub run_type: Option<&'a str>,
    pub pdp_beam_type: Option<&'a str>,
    pub readout_cfg_uri: Option<&'a str>,
}

impl<'a> From<&'a Run> for ClassificationInput<'a> {
    fn from(run: &'a Run) -> Self {
        Self {
            detectors: run.detectors.as_deref(),
            lhc_fill: run.lhc_fill.as_ref(),
            trigger_value: run.trigger_value.as_deref(),
            dcs: run.dcs,
            dd_flp: run.dd_flp,
            epn: run.epn,
            tfb_dd_mode: run.tfb_dd_mode.as_deref(),
            pdp_workflow_parameters: run.pdp_workflow_parameters.as_deref(),
            run_type: run.run_type.as_deref(),
            pdp_beam_type: run.pdp_beam_type.as_deref(),
            readout_cfg_uri: run.readout_cfg_uri.as_deref(),
        }
    }
}

/// Classify a run.
pub fn classify(input: &ClassificationInput<'_>) -> Option<RunDefinition> {
    if is_full_data_taking(input) {
        return Some(if has_physics_detector(input) && has_stable_beams(input) {
            RunDefinition::Physics
        } else {
            RunDefinition::Cosmics
        });
    }

    if is_technical(input) {
        Some(RunDefinition::Technical)
    } else if is_synthetic(input) {
        Some(RunDefinition::Synthetic)
    } else {
        None
    }
}

/// Classify a loaded run.
pub fn classify_run(run: &Run) -> Option<RunDefinition> {
    classify(&ClassificationInput::from(run))
}

fn is_full_data_taking(input: &ClassificationInput<'_>) -> bool {
    let chain_enabled = input.dcs == Some(true) && input.dd_flp == Some(true) && input.epn == Some(true);
    chain_enabled
        && input.trigger_value == Some("CTP")
        && input
            .tfb_dd_mode
            .is_some_and(|mode| PROCESSING_TF_BUILDER_MODES.contains(&mode))
        && has_ctf(input)
}

fn has_ctf(input: &ClassificationInput<'_>) -> bool {
    input
        .pdp_workflow_parameters
        .is_some_and(|parameters| parameters.contains(CTF_TOKEN))
}

fn has_physics_detector(input: &ClassificationInput<'_>) -> bool {
    let Some(detectors) = input.detectors else {
        return false;
    };
    split_detectors(detectors).any(|name| PHYSICS_DETECTORS.contains(&name))
}

fn has_stable_beams(input: &ClassificationInput<'_>) -> bool {
    match input.lhc_fill {
        Some(fill) => fill.has_stable_beams(),
        None => false,
    }
}

fn is_technical(input: &ClassificationInput<'_>) -> bool {
    input
        .run_type
        .is_some_and(|run_type| run_type.eq_ignore_ascii_case(TECHNICAL))
        && input.pdp_beam_type == Some(TECHNICAL)
}

fn is_synthetic(input: &ClassificationInput<'_>) -> bool {
    let Some(uri) = input.readout_cfg_uri else {
        return false;
    };
    input.dcs != Some(true)
        && input.trigger_value == Some("OFF")
        && REPLAY_CFG_PATTERN.is_match(uri)
        && BEAM_CFG_PATTERN.is_match(uri)
        && !has_ctf(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fill(stable_beams: bool) -> LhcFill {
        LhcFill {
            fill_number: 1,
            stable_beams_start: stable_beams.then(|| Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            stable_beams_end: None,
            stable_beams_duration: None,
            beam_type: Some("p-p".to_string()),
            filling_scheme_name: None,
        }
    }

    fn data_taking<'a>(detectors: &'a str, lhc_fill: Option<&'a LhcFill>) -> ClassificationInput<'a> {
        ClassificationInput {
            detectors: Some(detectors),
            lhc_fill,
            trigger_value: Some("CTP"),
            dcs: Some(true),
            dd_flp: Some(true),
            epn: Some(true),
            tfb_dd_mode: Some("processing"),
            pdp_workflow_parameters: Some("QC,CTF,GPU"),
            ..Default::default()
        }
    }

    #[test]
    fn test_physics_with_its_and_stable_beams() {
        let fill = fill(true);
        let input = data_taking("ITS,TPC", Some(&fill));
        assert_eq!(classify(&input), Some(RunDefinition::Physics));
    }

    #[test]
    fn test_physics_with_ft0_only() {
        let fill = fill(true);
        let mut input = data_taking("FT0, TOF", Some(&fill));
        input.tfb_dd_mode = Some("processing-disk");
        assert_eq!(classify(&input), Some(RunDefinition::Physics));
    }

    #[test]
    fn test_cosmics_without_stable_beams() {
        let fill = fill(false);
        assert_eq!(
            classify(&data_taking("ITS", Some(&fill))),
            Some(RunDefinition::Cosmics)
        );
        assert_eq!(
            classify(&data_taking("ITS", None)),
            Some(RunDefinition::Cosmics)
        );
    }

    #[test]
    fn test_cosmics_without_physics_detector() {
        let fill = fill(true);
        // Substring matches do not count as detector membership.
        let input = data_taking("TPC,ITSX", Some(&fill));
        assert_eq!(classify(&input), Some(RunDefinition::Cosmics));
    }

    #[test]
    fn test_missing_ctf_leaves_data_taking_branch() {
        let fill = fill(true);
        let mut input = data_taking("ITS", Some(&fill));
        input.pdp_workflow_parameters = Some("QC");
        assert_eq!(classify(&input), None);

        input.pdp_workflow_parameters = None;
        assert_eq!(classify(&input), None);
    }

    #[test]
    fn test_unknown_tf_builder_mode_is_not_data_taking() {
        let mut input = data_taking("ITS", None);
        input.tfb_dd_mode = Some("discard");
        assert_eq!(classify(&input), None);
    }

    #[test]
    fn test_missing_flag_is_not_data_taking() {
        let mut input = data_taking("ITS", None);
        input.epn = None;
        assert_eq!(classify(&input), None);
    }

    #[test]
    fn test_technical() {
        let input = ClassificationInput {
            run_type: Some("technical"),
            pdp_beam_type: Some("technical"),
            ..Default::default()
        };
        assert_eq!(classify(&input), Some(RunDefinition::Technical));

        let upper = ClassificationInput {
            run_type: Some("TECHNICAL"),
            pdp_beam_type: Some("technical"),
            ..Default::default()
        };
        assert_eq!(classify(&upper), Some(RunDefinition::Technical));

        let other_beam = ClassificationInput {
            run_type: Some("technical"),
            pdp_beam_type: Some("pp"),
            ..Default::default()
        };
        assert_eq!(classify(&other_beam), None);
    }

    #[test]
    fn test_data_taking_wins_over_technical() {
        let mut input = data_taking("TPC", None);
        input.run_type = Some("technical");
        input.pdp_beam_type = Some("technical");
        assert_eq!(classify(&input), Some(RunDefinition::Cosmics));
    }

    fn replay(uri: &str) -> ClassificationInput<'_> {
        ClassificationInput {
            dcs: Some(false),
            trigger_value: Some("OFF"),
            readout_cfg_uri: Some(uri),
            pdp_workflow_parameters: Some("QC"),
            ..Default::default()
        }
    }

    #[test]
    fn test_synthetic_needs_both_patterns() {
        let both = "file:///local/replay_pp/chf/readout.cfg";
        assert_eq!(classify(&replay(both)), Some(RunDefinition::Synthetic));

        let replay_only = "file:///local/replay/chf/readout.cfg";
        assert_eq!(classify(&replay(replay_only)), None);

        let beam_only = "file:///local/pbpb/chf/readout.cfg";
        assert_eq!(classify(&replay(beam_only)), None);
    }

    #[test]
    fn test_synthetic_rejects_ctf_and_dcs() {
        let uri = "file:///local/replay_pbpb/chf/readout.cfg";
        let mut input = replay(uri);
        input.pdp_workflow_parameters = Some("CTF");
        assert_eq!(classify(&input), None);

        let mut input = replay(uri);
        input.dcs = Some(true);
        assert_eq!(classify(&input), None);

        let mut input = replay(uri);
        input.dcs = None;
        assert_eq!(classify(&input), Some(RunDefinition::Synthetic));
    }

    #[test]
    fn test_synthetic_without_uri() {
        let mut input = replay("");
        input.readout_cfg_uri = None;
        assert_eq!(classify(&input), None);
    }

    #[test]
    fn test_empty_input_is_unclassified() {
        assert_eq!(classify(&ClassificationInput::default()), None);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let fill = fill(true);
        let input = data_taking("ITS", Some(&fill));
        assert_eq!(classify(&input), classify(&input));
    }
}
