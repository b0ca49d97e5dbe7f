use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::model::cv::FoldScore;
use crate::model::ensemble::PredictionRow;
use crate::model::evaluate::{FeatureImportance, Metrics, TestScores};
use crate::model::search::SearchResult;

pub struct ReportSummary {
    pub folds: usize,
    pub calibration_bins: usize,
    pub importances: usize,
    pub trials: usize,
}

fn metric_header() -> [&'static str; 5] {
    ["samples", "accuracy", "log_loss", "brier", "roc_auc"]
}

fn metric_cells(m: &Metrics) -> [String; 5] {
    [
        m.samples.to_string(),
        format!("{:.6}", m.accuracy),
        format!("{:.6}", m.log_loss),
        format!("{:.6}", m.brier),
        format!("{:.6}", m.roc_auc),
    ]
}

fn cv_rows(scores: &[FoldScore]) -> Vec<Vec<String>> {
    let mut rows = vec![
        ["fold", "train_start", "train_end", "test_start", "test_end"]
            .iter()
            .chain(metric_header().iter())
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    ];
    for s in scores {
        let mut row = vec![
            s.fold.to_string(),
            s.train_start.to_string(),
            s.train_end.to_string(),
            s.test_start.to_string(),
            s.test_end.to_string(),
        ];
        row.extend(metric_cells(&s.metrics));
        rows.push(row);
    }
    rows
}

/// Per-fold cross-validation scores, one CSV row per fold.
pub fn write_cv_scores_csv(path: &Path, scores: &[FoldScore]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for row in cv_rows(scores) {
        writer.write_record(&row).context("write cv score row")?;
    }
    writer.flush().context("flush cv scores")?;
    Ok(())
}

pub fn write_predictions_csv(path: &Path, rows: &[PredictionRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer =
            csv::Writer::from_path(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        for row in rows {
            writer.serialize(row).context("write prediction row")?;
        }
        writer.flush().context("flush predictions")?;
    }
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

/// Workbook with cross-validation, holdout, calibration, importance and search sheets.
pub fn export_training_report(
    path: &Path,
    model_name: &str,
    cv: &[FoldScore],
    test: &TestScores,
    importances: &[FeatureImportance],
    search: Option<&SearchResult>,
) -> Result<ReportSummary> {
    let mut test_rows = vec![
        ["model"]
            .iter()
            .chain(metric_header().iter())
            .chain(["tp", "fp", "tn", "fn"].iter())
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    ];
    let mut row = vec![model_name.to_string()];
    row.extend(metric_cells(&test.metrics));
    row.extend([
        test.true_positive.to_string(),
        test.false_positive.to_string(),
        test.true_negative.to_string(),
        test.false_negative.to_string(),
    ]);
    test_rows.push(row);

    let mut calibration_rows = vec![
        ["bucket_start", "bucket_end", "count", "avg_pred", "actual_rate"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    ];
    for b in &test.calibration {
        calibration_rows.push(vec![
            format!("{:.2}", b.bucket_start),
            format!("{:.2}", b.bucket_end),
            b.count.to_string(),
            format!("{:.4}", b.avg_pred),
            format!("{:.4}", b.actual_rate),
        ]);
    }

    let mut importance_rows = vec![vec![
        "feature".to_string(),
        "mean".to_string(),
        "std".to_string(),
    ]];
    let mut sorted = importances.to_vec();
    sorted.sort_by(|a, b| b.mean.total_cmp(&a.mean));
    for imp in &sorted {
        importance_rows.push(vec![
            imp.feature.clone(),
            format!("{:.6}", imp.mean),
            format!("{:.6}", imp.std),
        ]);
    }

    let mut search_rows = vec![vec![
        "trial".to_string(),
        "score".to_string(),
        "params".to_string(),
    ]];
    if let Some(result) = search {
        for (idx, trial) in result.trials.iter().enumerate() {
            search_rows.push(vec![
                idx.to_string(),
                format!("{:.6}", trial.score),
                serde_json::to_string(&trial.spec).unwrap_or_default(),
            ]);
        }
    }

    let mut workbook = Workbook::new();
    for (name, rows) in [
        ("CvScores", cv_rows(cv)),
        ("TestScores", test_rows),
        ("Calibration", calibration_rows),
        ("Importances", importance_rows),
        ("Search", search_rows),
    ] {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, &rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ReportSummary {
        folds: cv.len(),
        calibration_bins: test.calibration.len(),
        importances: importances.len(),
        trials: search.map_or(0, |s| s.trials.len()),
    })
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(fold: usize) -> FoldScore {
        FoldScore {
            fold,
            train_start: 2010,
            train_end: 2014,
            test_start: 2015 + fold as i32,
            test_end: 2015 + fold as i32,
            metrics: Metrics {
                samples: 10,
                brier: 0.2,
                log_loss: 0.6,
                accuracy: 0.7,
                roc_auc: 0.75,
            },
        }
    }

    #[test]
    fn cv_rows_have_header_and_one_row_per_fold() {
        let rows = cv_rows(&[score(0), score(1)]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "fold");
        assert_eq!(rows[0].len(), rows[1].len());
        assert_eq!(rows[2][3], "2016");
        assert_eq!(rows[1][6], "0.700000");
    }

    #[test]
    fn cv_scores_csv_is_readable() {
        let path = std::env::temp_dir().join(format!("nfl_cv_{}.csv", std::process::id()));
        write_cv_scores_csv(&path, &[score(0)]).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(5), Some("samples"));
        assert_eq!(reader.records().count(), 1);
        let _ = fs::remove_file(&path);
    }
}
