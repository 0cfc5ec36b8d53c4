use std::collections::BTreeMap;

use bilirank_core::VideoItem;

/// Splits a global comment `budget` across `videos` in proportion to each
/// video's reported comment count.
///
/// Each quota is clamped to `[floor, ceiling]` and then capped at the video's
/// own count when that count is known. When no video reports any comments the
/// budget is split evenly (still clamped).
#[must_use]
pub fn allocate_comments(
    videos: &[VideoItem],
    budget: usize,
    floor: usize,
    ceiling: usize,
) -> BTreeMap<String, usize> {
    let mut allocation = BTreeMap::new();
    if videos.is_empty() {
        return allocation;
    }

    let clamp = |quota: usize| quota.max(floor).min(ceiling);
    let total: u128 = videos.iter().map(|v| u128::from(v.comment_count)).sum();

    if total == 0 {
        let even = clamp(budget / videos.len());
        for video in videos {
            allocation.insert(video.bvid.clone(), even);
        }
        return allocation;
    }

    for video in videos {
        let share = budget as u128 * u128::from(video.comment_count) / total;
        let mut quota = clamp(usize::try_from(share).unwrap_or(usize::MAX));
        if video.comment_count > 0 {
            quota = quota.min(usize::try_from(video.comment_count).unwrap_or(usize::MAX));
        }
        allocation.insert(video.bvid.clone(), quota);
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(bvid: &str, comment_count: u64) -> VideoItem {
        VideoItem {
            bvid: bvid.to_string(),
            comment_count,
            ..VideoItem::default()
        }
    }

    #[test]
    fn empty_input_allocates_nothing() {
        assert!(allocate_comments(&[], 500, 10, 200).is_empty());
    }

    #[test]
    fn zero_counts_split_evenly() {
        let videos = [video("BV1a", 0), video("BV1b", 0)];
        let allocation = allocate_comments(&videos, 100, 10, 200);
        assert_eq!(allocation["BV1a"], 50);
        assert_eq!(allocation["BV1b"], 50);
    }

    #[test]
    fn even_split_is_clamped_to_floor() {
        let videos: Vec<VideoItem> = (0..20).map(|i| video(&format!("BV{i}"), 0)).collect();
        let allocation = allocate_comments(&videos, 100, 10, 200);
        assert!(allocation.values().all(|&q| q == 10));
    }

    #[test]
    fn shares_follow_comment_counts() {
        let videos = [video("BV1a", 300), video("BV1b", 100)];
        let allocation = allocate_comments(&videos, 100, 10, 200);
        assert_eq!(allocation["BV1a"], 75);
        assert_eq!(allocation["BV1b"], 25);
    }

    #[test]
    fn quota_never_exceeds_ceiling() {
        let videos = [video("BV1a", 10_000), video("BV1b", 10)];
        let allocation = allocate_comments(&videos, 500, 10, 200);
        assert_eq!(allocation["BV1a"], 200);
        assert_eq!(allocation["BV1b"], 10);
    }

    #[test]
    fn floor_is_capped_at_known_count() {
        let videos = [video("BV1a", 5), video("BV1b", 995)];
        let allocation = allocate_comments(&videos, 1000, 10, 2000);
        assert_eq!(allocation["BV1a"], 5);
        assert_eq!(allocation["BV1b"], 995);
    }

    #[test]
    fn video_without_count_gets_floor_when_others_have_counts() {
        let videos = [video("BV1a", 0), video("BV1b", 400)];
        let allocation = allocate_comments(&videos, 200, 10, 200);
        assert_eq!(allocation["BV1a"], 10);
        assert_eq!(allocation["BV1b"], 200);
    }
}
