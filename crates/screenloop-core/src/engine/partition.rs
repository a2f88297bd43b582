use super::error::EngineError;
use super::layout::ScreenLayout;
use crate::core::io::table::write_work_list;
use crate::core::io::template::JobTemplate;
use crate::core::models::candidate::Candidate;
use std::ops::Range;
use std::path::PathBuf;
use tracing::{debug, info};

/// Splits `total` items into `workers` contiguous ranges whose lengths differ
/// by at most one. The first `total % workers` ranges get the extra item.
/// Always returns exactly `workers` ranges, some possibly empty.
pub fn shard_ranges(total: usize, workers: usize) -> Vec<Range<usize>> {
    if workers == 0 {
        return Vec::new();
    }
    let base = total / workers;
    let extra = total % workers;
    let mut start = 0;
    (0..workers)
        .map(|shard| {
            let len = base + usize::from(shard < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Files written for one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFiles {
    pub index: usize,
    pub work_list: PathBuf,
    pub descriptor: Option<PathBuf>,
    pub size: usize,
}

/// Writes `candidates` as `workers` batch shards for `iteration`, each with a
/// work list and, when a template is given, a job descriptor.
///
/// Existing `shard_*` files in the batch directory are removed first.
pub fn write_batch(
    layout: &ScreenLayout,
    iteration: u32,
    candidates: &[Candidate],
    workers: usize,
    template: Option<&JobTemplate>,
) -> Result<Vec<ShardFiles>, EngineError> {
    let batch_dir = layout.batch_dir(iteration);
    super::layout::prepare_dir(&batch_dir, "shard_")?;

    let mut shards = Vec::with_capacity(workers);
    for (offset, range) in shard_ranges(candidates.len(), workers).into_iter().enumerate() {
        let index = offset + 1;
        let work_list = layout.shard_work_list(iteration, index);
        write_work_list(&work_list, &candidates[range.clone()])?;

        let descriptor = match template {
            Some(template) => {
                let path = layout.shard_descriptor(iteration, index, template.extension());
                std::fs::write(&path, template.render(&work_list))
                    .map_err(|e| EngineError::io(&path, e))?;
                Some(path)
            }
            None => None,
        };
        debug!("Shard {} holds {} candidates", index, range.len());
        shards.push(ShardFiles {
            index,
            work_list,
            descriptor,
            size: range.len(),
        });
    }
    info!(
        "Wrote {} candidates into {} shards under {:?}",
        candidates.len(),
        workers,
        batch_dir
    );
    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::table::read_work_list;
    use crate::core::models::ids::CandidateId;
    use std::collections::HashSet;
    use std::path::Path;

    fn candidates(n: u64) -> Vec<Candidate> {
        (1..=n)
            .map(|i| Candidate {
                id: CandidateId(i),
                representation: format!("C{i}"),
                label: format!("m{i}"),
            })
            .collect()
    }

    #[test]
    fn ranges_cover_every_item_once_with_balanced_sizes() {
        for (total, workers) in [(10, 3), (3, 5), (0, 2), (12, 4), (1_000_003, 7)] {
            let ranges = shard_ranges(total, workers);
            assert_eq!(ranges.len(), workers);
            let lens: Vec<_> = ranges.iter().map(|r| r.len()).collect();
            let max = *lens.iter().max().unwrap();
            let min = *lens.iter().min().unwrap();
            assert!(max - min <= 1);
            assert_eq!(lens.iter().sum::<usize>(), total);
            assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));
            assert!(lens.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn first_shards_take_the_remainder() {
        let lens: Vec<_> = shard_ranges(10, 4).iter().map(|r| r.len()).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
    }

    #[test]
    fn batch_files_partition_the_selection() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScreenLayout::new(dir.path(), "s");
        let template =
            JobTemplate::from_text("LIGANDFILE {{input}}\n", "in", Path::new("t.in")).unwrap();
        let selection = candidates(10);

        let shards = write_batch(&layout, 1, &selection, 3, Some(&template)).unwrap();
        assert_eq!(shards.iter().map(|s| s.size).collect::<Vec<_>>(), vec![4, 3, 3]);

        let mut seen = HashSet::new();
        for shard in &shards {
            for (_, id) in read_work_list(&shard.work_list).unwrap() {
                assert!(seen.insert(id));
            }
            let descriptor = std::fs::read_to_string(shard.descriptor.as_ref().unwrap()).unwrap();
            assert_eq!(
                descriptor,
                format!("LIGANDFILE {}\n", shard.work_list.display())
            );
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn rewriting_a_batch_removes_stale_shards() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScreenLayout::new(dir.path(), "s");
        write_batch(&layout, 1, &candidates(8), 4, None).unwrap();
        write_batch(&layout, 1, &candidates(8), 2, None).unwrap();
        assert!(layout.shard_work_list(1, 2).exists());
        assert!(!layout.shard_work_list(1, 3).exists());
    }
}
