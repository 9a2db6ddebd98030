use crate::table::Table;
use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array},
    compute,
    datatypes::DataType,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Canonical outcome column name after standardization.
pub const OUTCOME_COL: &str = "churn";
/// Canonical treatment column name after standardization.
pub const TREATMENT_COL: &str = "treatment";

/// A strictly-binary column considered as a treatment indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryCandidate {
    pub col: String,
    /// Fraction of non-missing values equal to 1.
    pub p_ones: f64,
    /// |0.5 - p_ones|; smaller means closer to a balanced assignment.
    pub dist_to_0_5: f64,
}

/// Selection rule for the treatment column. A randomized assignment is
/// usually near-balanced, so the closest-to-0.5 candidate wins, but only if
/// its share of ones sits inside the acceptance band; otherwise the closest
/// candidate may just be a rare-event covariate and selection must fail.
///
/// The defaults reproduce the historical [0.2, 0.8] band.
#[derive(Debug, Clone, Copy)]
pub struct TreatmentHeuristic {
    pub accept_min: f64,
    pub accept_max: f64,
    /// How many candidates to surface in logs and metadata.
    pub top_n: usize,
}

impl Default for TreatmentHeuristic {
    fn default() -> Self {
        Self {
            accept_min: 0.2,
            accept_max: 0.8,
            top_n: 5,
        }
    }
}

/// Report of one standardization run, persisted as `{name}_std_meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizeMeta {
    pub chosen_treatment_col: String,
    pub p_ones_chosen: f64,
    pub top5_binary_candidates: Vec<BinaryCandidate>,
    /// `[rows, cols]` of the standardized table.
    pub shape: [usize; 2],
    /// First 20 column names of the standardized table.
    pub columns_preview: Vec<String>,
}

/// Result of a standardization pass: the renamed/coerced table plus the
/// metadata describing what was chosen.
#[derive(Debug, Clone)]
pub struct Standardized {
    pub table: Table,
    pub meta: StandardizeMeta,
}

/// If the column is strictly binary, return the fraction of ones over its
/// non-missing values. Columns that are not numeric or boolean, contain any
/// value outside {0,1}, or have no non-missing values at all return `None`.
fn binary_fraction(array: &ArrayRef) -> Option<f64> {
    match array.data_type() {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64 => {}
        _ => return None,
    }

    let values = compute::cast(array, &DataType::Float64).ok()?;
    let values = values.as_any().downcast_ref::<Float64Array>()?;

    let mut ones = 0usize;
    let mut total = 0usize;
    for v in values.iter().flatten() {
        if v != 0.0 && v != 1.0 {
            return None;
        }
        total += 1;
        if v == 1.0 {
            ones += 1;
        }
    }
    if total == 0 {
        return None;
    }
    Some(ones as f64 / total as f64)
}

/// Scan every column except `exclude` for strictly-binary {0,1} columns and
/// rank them by distance from a balanced 50/50 split, closest first. The sort
/// is stable, so ties keep the original column order. Pure function over an
/// immutable table.
pub fn find_binary_candidates(table: &Table, exclude: &[&str]) -> Vec<BinaryCandidate> {
    let mut candidates = Vec::new();
    for name in table.column_names() {
        if exclude.contains(&name.as_str()) {
            continue;
        }
        let Some(array) = table.column(&name) else {
            continue;
        };
        if let Some(p_ones) = binary_fraction(&array) {
            candidates.push(BinaryCandidate {
                col: name,
                p_ones,
                dist_to_0_5: (0.5 - p_ones).abs(),
            });
        }
    }
    candidates.sort_by(|a, b| a.dist_to_0_5.total_cmp(&b.dist_to_0_5));
    candidates
}

/// Apply the selection rule to an already-ranked candidate list.
pub fn select_treatment<'a>(
    candidates: &'a [BinaryCandidate],
    heuristic: &TreatmentHeuristic,
) -> Option<&'a BinaryCandidate> {
    let best = candidates.first()?;
    if best.p_ones >= heuristic.accept_min && best.p_ones <= heuristic.accept_max {
        Some(best)
    } else {
        None
    }
}

fn format_candidates(candidates: &[BinaryCandidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("{}: p(1)={:.3}, |p-0.5|={:.3}", c.col, c.p_ones, c.dist_to_0_5))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Standardize a raw table: rename the declared outcome column to `churn`,
/// infer and rename the treatment column, and coerce both to Int64 0/1.
///
/// Fatal if `target_current` is missing from the table or no binary candidate
/// passes the acceptance band; no fallback selection is attempted.
pub fn standardize(
    table: &Table,
    target_current: &str,
    heuristic: &TreatmentHeuristic,
) -> Result<Standardized> {
    if !table.has_column(target_current) {
        let preview: Vec<String> = table.column_names().into_iter().take(20).collect();
        bail!(
            "target column `{}` not found; first columns: {:?}",
            target_current,
            preview
        );
    }

    let mut df = if table.has_column(OUTCOME_COL) {
        table.clone()
    } else {
        table.rename(target_current, OUTCOME_COL)?
    };
    df = df
        .cast_to_int(OUTCOME_COL)
        .with_context(|| format!("coercing `{}` to 0/1", OUTCOME_COL))?;

    let candidates = find_binary_candidates(&df, &[OUTCOME_COL]);
    let top: Vec<BinaryCandidate> = candidates.iter().take(heuristic.top_n).cloned().collect();
    info!(
        "top-{} binary candidates (closer to 0.5 is likelier treatment): {}",
        heuristic.top_n,
        format_candidates(&top)
    );

    let Some(chosen) = select_treatment(&candidates, heuristic).cloned() else {
        bail!(
            "could not determine the treatment column automatically; \
             inspect the candidates and fix the column manually. considered: [{}]",
            format_candidates(&top)
        );
    };

    if chosen.col != TREATMENT_COL {
        df = df.rename(&chosen.col, TREATMENT_COL)?;
    }
    df = df
        .cast_to_int(TREATMENT_COL)
        .with_context(|| format!("coercing `{}` to 0/1", TREATMENT_COL))?;

    let (rows, cols) = df.shape();
    let meta = StandardizeMeta {
        chosen_treatment_col: chosen.col,
        p_ones_chosen: chosen.p_ones,
        top5_binary_candidates: top,
        shape: [rows, cols],
        columns_preview: df.column_names().into_iter().take(20).collect(),
    };
    Ok(Standardized { table: df, meta })
}
