//! Rank-ordered merge of staged provider results.

use std::collections::BTreeMap;

use shelfmark_metadata::ProviderResult;

use crate::catalog::VolumeRecord;

/// Results of one provider, tagged with its configured rank.
#[derive(Clone, Debug)]
pub struct StagedResults {
    pub rank: usize,
    pub results: Vec<ProviderResult>,
}

/// Rebuild the working records from `base` and every staged result.
///
/// Staged results are applied in rank order, whatever order they arrived
/// in, and each only fills nulls. The earliest-ranked provider therefore
/// wins any field two providers both supply, and values already in `base`
/// are never replaced. Results for volumes not in `base` are ignored.
pub fn merge_staged(
    base: &BTreeMap<u32, VolumeRecord>,
    staged: &[StagedResults],
) -> BTreeMap<u32, VolumeRecord> {
    let mut ordered: Vec<&StagedResults> = staged.iter().collect();
    ordered.sort_by_key(|s| s.rank);

    let mut merged = base.clone();
    for stage in ordered {
        for result in &stage.results {
            if let Some(record) = merged.get_mut(&result.volume) {
                record.apply_provider(result);
            }
        }
    }
    merged
}
