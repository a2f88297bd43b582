use super::table::TableIoError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Scores of a fully evaluated library, keyed by candidate label.
#[derive(Debug, Clone, Default)]
pub struct ReferenceScores {
    by_label: HashMap<String, f64>,
}

impl ReferenceScores {
    /// Reads whitespace-separated `score label` lines. The first score seen
    /// for a label wins.
    pub fn load(path: &Path) -> Result<Self, TableIoError> {
        let file = File::open(path).map_err(|source| TableIoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut by_label = HashMap::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| TableIoError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let mut fields = line.split_whitespace();
            let (Some(score), Some(label)) = (fields.next(), fields.next()) else {
                if line.trim().is_empty() {
                    continue;
                }
                return Err(TableIoError::Row {
                    path: path.to_path_buf(),
                    line: index as u64 + 1,
                    reason: "expected '<score> <label>'".to_string(),
                });
            };
            let score: f64 = score.parse().map_err(|_| TableIoError::Row {
                path: path.to_path_buf(),
                line: index as u64 + 1,
                reason: format!("'{score}' is not a number"),
            })?;
            by_label.entry(label.to_string()).or_insert(score);
        }
        Ok(Self { by_label })
    }

    pub fn score(&self, label: &str) -> Option<f64> {
        self.by_label.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    /// Size of the top fraction (at least one entry) and the score at its
    /// boundary, so that `score <= cutoff` marks a top-fraction member.
    pub fn top_fraction_cutoff(&self, fraction: f64) -> Option<(usize, f64)> {
        if self.by_label.is_empty() {
            return None;
        }
        let mut scores: Vec<f64> = self.by_label.values().copied().collect();
        scores.sort_by(f64::total_cmp);
        let top = ((fraction * scores.len() as f64).round() as usize).clamp(1, scores.len());
        Some((top, scores[top - 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reference(lines: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dock.txt");
        std::fs::write(&path, lines).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_scores_by_label_keeping_first() {
        let (_dir, path) = write_reference("-9.1 ZINC1\n-3.0 ZINC2\n\n-1.0 ZINC1\n");
        let reference = ReferenceScores::load(&path).unwrap();
        assert_eq!(reference.len(), 2);
        assert_eq!(reference.score("ZINC1"), Some(-9.1));
        assert_eq!(reference.score("ZINC3"), None);
    }

    #[test]
    fn top_percent_cutoff_is_taken_from_sorted_scores() {
        let text: String = (0..300).map(|i| format!("{} M{i}\n", -(i as f64) / 10.0)).collect();
        let (_dir, path) = write_reference(&text);
        let reference = ReferenceScores::load(&path).unwrap();
        let (top, cutoff) = reference.top_fraction_cutoff(0.01).unwrap();
        assert_eq!(top, 3);
        assert_eq!(cutoff, -29.7);
    }

    #[test]
    fn unparseable_score_is_fatal() {
        let (_dir, path) = write_reference("-1.0 A\nbad B\n");
        assert!(matches!(
            ReferenceScores::load(&path),
            Err(TableIoError::Row { line: 2, .. })
        ));
    }
}
