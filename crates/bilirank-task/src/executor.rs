//! One task end to end: search, scrape, analyze, classify, report.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bilirank_analysis::{
    analyze_comments, classify_results, collect_discovered_brands, collect_unknown_models,
    filter_and_rank, generate_recommendation, identify_brands_for_models, normalize_results,
    BatchConfig, BrandAliases, BrandIdentifyContext, ChatModel, FilterConfig,
};
use bilirank_bilibili::{allocate_comments, ScrapeProgress, ScrapeResult, Scraper, ScraperConfig};
use bilirank_core::{
    cancellable, CommentInput, RawComment, ScoredComment, TaskLimits, TaskRequest, TaskStage,
    VideoItem,
};
use bilirank_report::{generate_report, ReportData, ReportInput};
use chrono::{DateTime, Months, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::platform::Platform;
use crate::progress::{scaled, ProgressReporter};
use crate::store::TaskStore;

/// Pause between keyword searches.
const KEYWORD_DELAY: Duration = Duration::from_millis(500);

/// Comments shorter than this (after trimming) never reach the model.
const MIN_INPUT_CHARS: usize = 5;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub keyword_delay: Duration,
    pub batch: BatchConfig,
    /// Keep a copy of scraped comments in the store.
    pub persist_raw_comments: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            keyword_delay: KEYWORD_DELAY,
            batch: BatchConfig::default(),
            persist_raw_comments: true,
        }
    }
}

/// A finished task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub report_id: i64,
    pub report: ReportData,
}

/// Drops videos published before the configured window and videos with too
/// few comments. Either filter is off when its limit is `0`.
#[must_use]
pub fn filter_videos(
    videos: Vec<VideoItem>,
    limits: &TaskLimits,
    now: DateTime<Utc>,
) -> Vec<VideoItem> {
    let cutoff = if limits.video_date_range_months > 0 {
        now.checked_sub_months(Months::new(limits.video_date_range_months))
            .map(|t| t.timestamp())
    } else {
        None
    };

    let before = videos.len();
    let kept: Vec<VideoItem> = videos
        .into_iter()
        .filter(|v| cutoff.is_none_or(|c| v.pubdate > c))
        .filter(|v| limits.min_video_comments == 0 || v.comment_count >= limits.min_video_comments)
        .collect();
    if kept.len() < before {
        tracing::info!(
            dropped = before - kept.len(),
            months = limits.video_date_range_months,
            min_comments = limits.min_video_comments,
            "filtered videos by age and comment count"
        );
    }
    kept
}

/// Flattens comments and their replies in video order, numbers them
/// `comment_{i}` in that order, then keeps the best ones per `config`.
///
/// The returned inputs are in quality order.
#[must_use]
pub fn prepare_inputs(
    videos: &[VideoItem],
    comments: &BTreeMap<String, Vec<RawComment>>,
    config: &FilterConfig,
) -> Vec<CommentInput> {
    let mut flat: Vec<RawComment> = Vec::new();
    let mut origin: HashMap<(String, i64), (usize, &str)> = HashMap::new();

    for video in videos {
        let Some(roots) = comments.get(&video.bvid) else {
            continue;
        };
        for root in roots {
            for comment in std::iter::once(root).chain(root.replies.iter()) {
                let mut c = comment.clone();
                c.replies.clear();
                c.video_bvid.clone_from(&video.bvid);
                origin
                    .entry((c.video_bvid.clone(), c.rpid))
                    .or_insert((flat.len(), video.title.as_str()));
                flat.push(c);
            }
        }
    }

    filter_and_rank(&flat, config)
        .into_iter()
        .filter_map(|c| {
            let (index, title) = origin.get(&(c.video_bvid.clone(), c.rpid))?;
            Some(CommentInput {
                id: format!("comment_{index}"),
                content: c.content,
                video_title: (*title).to_string(),
                video_bvid: c.video_bvid,
            })
        })
        .collect()
}

fn filter_config(request: &TaskRequest) -> FilterConfig {
    FilterConfig {
        min_length: MIN_INPUT_CHARS,
        max_comments: request.limits.max_comments,
        keywords: request
            .brands
            .iter()
            .cloned()
            .chain(request.dimensions.iter().map(|d| d.name.clone()))
            .collect(),
    }
}

fn ensure_running(cancel: &CancellationToken) -> Result<(), TaskError> {
    if cancel.is_cancelled() {
        Err(TaskError::Cancelled)
    } else {
        Ok(())
    }
}

pub struct Executor<P> {
    platform: Arc<P>,
    model: Arc<dyn ChatModel>,
    store: Arc<dyn TaskStore>,
    aliases: Arc<BrandAliases>,
    options: ExecutorOptions,
}

impl<P: Platform> Executor<P> {
    #[must_use]
    pub fn new(
        platform: Arc<P>,
        model: Arc<dyn ChatModel>,
        store: Arc<dyn TaskStore>,
        aliases: Arc<BrandAliases>,
    ) -> Self {
        Self {
            platform,
            model,
            store,
            aliases,
            options: ExecutorOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the whole pipeline for `request` and marks the task completed.
    ///
    /// The caller owns failure handling: on `Err` the task is still active in
    /// the store.
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidRequest`] before any search when the request has
    /// no keywords or dimensions, [`TaskError::NoVideos`],
    /// [`TaskError::NoComments`] and
    /// [`TaskError::AllAnalysisFailed`] when a stage has nothing to work with,
    /// [`TaskError::Cancelled`] once `cancel` fires, and [`TaskError::Store`]
    /// when the report or completion cannot be saved.
    pub async fn run(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<TaskOutcome, TaskError> {
        let task_id = request.task_id.as_str();
        tracing::info!(
            task_id = %task_id,
            category = %request.category,
            keywords = request.keywords.len(),
            brands = request.brands.len(),
            "task started"
        );

        request.validate().map_err(TaskError::InvalidRequest)?;
        let videos = self.search(request, cancel, progress).await?;
        let scraped = self.scrape(request, &videos, cancel, progress).await?;
        let results = self.analyze(request, &scraped, cancel, progress).await?;
        let grouped = self.classify(request, results, cancel).await;
        ensure_running(cancel)?;
        let report = self
            .build_report(request, &scraped, grouped, cancel, progress)
            .await?;

        progress
            .report(TaskStage::Generating, 95, "正在保存报告...")
            .await;
        let report_id = self.store.save_report(task_id, &report).await?;

        let message = format!(
            "分析完成！共分析{}个视频，{}条评论",
            scraped.stats.total_videos, scraped.stats.total_comments
        );
        self.store
            .mark_completed(task_id, Some(report_id), &message)
            .await?;
        progress.emit(TaskStage::Completed, 100, message);
        tracing::info!(task_id = %task_id, report_id, brands = report.brands.len(), "task completed");

        Ok(TaskOutcome {
            task_id: task_id.to_string(),
            report_id,
            report,
        })
    }

    async fn search(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<Vec<VideoItem>, TaskError> {
        progress
            .report(TaskStage::Searching, 5, "正在搜索相关视频...")
            .await;

        let limits = &request.limits;
        let total = request.keywords.len();
        let mut seen = HashSet::new();
        let mut videos = Vec::new();

        for (i, keyword) in request.keywords.iter().enumerate() {
            if i > 0
                && cancellable(cancel, tokio::time::sleep(self.options.keyword_delay))
                    .await
                    .is_none()
            {
                return Err(TaskError::Cancelled);
            }
            progress.emit(
                TaskStage::Searching,
                scaled(5, 15, i, total),
                format!("正在搜索: {keyword} ({}/{total})", i + 1),
            );

            let search = self.platform.search(
                keyword,
                limits.max_videos_per_keyword,
                limits.min_video_duration_secs,
            );
            let Some(found) = cancellable(cancel, search).await else {
                return Err(TaskError::Cancelled);
            };
            match found {
                Ok(found) => {
                    let fetched = found.len();
                    videos.extend(found.into_iter().filter(|v| seen.insert(v.bvid.clone())));
                    tracing::debug!(task_id = %request.task_id, keyword = %keyword, fetched, "keyword searched");
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %request.task_id,
                        keyword = %keyword,
                        error = %e,
                        "keyword search failed, skipping"
                    );
                }
            }
        }

        let videos = filter_videos(videos, limits, Utc::now());
        if videos.is_empty() {
            return Err(TaskError::NoVideos);
        }
        tracing::info!(task_id = %request.task_id, videos = videos.len(), "search finished");
        Ok(videos)
    }

    async fn scrape(
        &self,
        request: &TaskRequest,
        videos: &[VideoItem],
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<ScrapeResult, TaskError> {
        let limits = &request.limits;
        let allocation = allocate_comments(
            videos,
            limits.max_comments,
            limits.min_comments_per_video,
            limits.max_comments_per_video,
        );

        progress
            .report(
                TaskStage::Scraping,
                20,
                format!("开始抓取{}个视频的评论...", videos.len()),
            )
            .await;

        let config = ScraperConfig {
            max_videos: videos.len(),
            ..ScraperConfig::from_limits(limits)
        };
        let scraper = Scraper::new(Arc::clone(&self.platform), config);
        let result = scraper
            .scrape_videos(videos, &allocation, cancel, |p: ScrapeProgress| {
                progress.emit(
                    TaskStage::Scraping,
                    scaled(20, 30, p.completed, p.total),
                    p.message,
                );
            })
            .await;
        if result.cancelled {
            return Err(TaskError::Cancelled);
        }
        ensure_running(cancel)?;

        if self.options.persist_raw_comments {
            let all: Vec<RawComment> = result.comments.values().flatten().cloned().collect();
            if !all.is_empty() {
                match self.store.save_raw_comments(&request.task_id, &all).await {
                    Ok(rows) => tracing::debug!(task_id = %request.task_id, rows, "raw comments stored"),
                    Err(e) => {
                        tracing::warn!(task_id = %request.task_id, error = %e, "failed to store raw comments");
                    }
                }
            }
        }
        Ok(result)
    }

    async fn analyze(
        &self,
        request: &TaskRequest,
        scraped: &ScrapeResult,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<Vec<ScoredComment>, TaskError> {
        let inputs = prepare_inputs(
            &scraped.videos,
            &scraped.comments,
            &filter_config(request),
        );
        if inputs.is_empty() {
            return Err(TaskError::NoComments);
        }
        tracing::info!(task_id = %request.task_id, comments = inputs.len(), "prepared comments for analysis");

        progress
            .report(TaskStage::Analyzing, 50, "正在使用AI分析评论...")
            .await;
        progress
            .report(
                TaskStage::Analyzing,
                55,
                format!("正在AI分析 {} 条评论...", inputs.len()),
            )
            .await;

        let results = analyze_comments(
            self.model.as_ref(),
            &inputs,
            &request.dimensions,
            &self.options.batch,
            request.limits.ai_batch_concurrency,
            cancel,
            |p| {
                progress.emit(
                    TaskStage::Analyzing,
                    scaled(50, 35, p.completed_items, p.total_items),
                    p.message,
                );
            },
        )
        .await;
        ensure_running(cancel)?;

        let scored = results.iter().filter(|r| r.is_scored()).count();
        if scored == 0 {
            return Err(TaskError::AllAnalysisFailed {
                count: results.len(),
            });
        }
        tracing::info!(
            task_id = %request.task_id,
            scored,
            failed = results.len() - scored,
            "analysis finished"
        );
        Ok(results)
    }

    async fn classify(
        &self,
        request: &TaskRequest,
        mut results: Vec<ScoredComment>,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, Vec<ScoredComment>> {
        let unknown = collect_unknown_models(&results);
        let identified = if unknown.is_empty() {
            BTreeMap::new()
        } else {
            let ctx = BrandIdentifyContext {
                category: request.category.clone(),
                known_brands: request.brands.clone(),
                discovered_brands: collect_discovered_brands(&results),
            };
            tracing::info!(task_id = %request.task_id, models = ?unknown, "identifying brands for unknown models");
            let identify = identify_brands_for_models(self.model.as_ref(), &unknown, &ctx);
            match cancellable(cancel, identify).await {
                Some(Ok(map)) => map,
                Some(Err(e)) => {
                    tracing::warn!(task_id = %request.task_id, error = %e, "brand identification failed");
                    BTreeMap::new()
                }
                None => BTreeMap::new(),
            }
        };

        normalize_results(&mut results, &identified, &request.brands, &self.aliases);
        let grouped = classify_results(&results, &request.brands, &self.aliases);
        for (brand, comments) in &grouped {
            let declared = request.brands.iter().any(|b| b == brand);
            tracing::info!(
                task_id = %request.task_id,
                brand = %brand,
                comments = comments.len(),
                declared,
                "brand classified"
            );
        }
        grouped
    }

    async fn build_report(
        &self,
        request: &TaskRequest,
        scraped: &ScrapeResult,
        grouped: BTreeMap<String, Vec<ScoredComment>>,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<ReportData, TaskError> {
        progress
            .report(TaskStage::Generating, 85, "正在生成分析报告...")
            .await;

        let input = ReportInput {
            category: request.category.clone(),
            dimensions: request.dimensions.clone(),
            results: grouped,
            videos: scraped.videos.clone(),
            total_comments: scraped.stats.total_comments,
        };
        let mut report = generate_report(&input);

        progress
            .report(TaskStage::Generating, 90, "正在生成AI购买建议...")
            .await;
        let advice = generate_recommendation(
            self.model.as_ref(),
            &report.category,
            &report.rankings,
            &report.brand_analysis,
            &report.model_rankings,
        );
        match cancellable(cancel, advice).await {
            None => return Err(TaskError::Cancelled),
            Some(Ok(text)) if !text.is_empty() => report.recommendation = text,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(
                    task_id = %request.task_id,
                    error = %e,
                    "recommendation call failed, keeping template text"
                );
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use bilirank_core::Dimension;

    use super::*;

    fn video(bvid: &str, pubdate: i64, comment_count: u64) -> VideoItem {
        VideoItem {
            bvid: bvid.to_string(),
            title: format!("标题 {bvid}"),
            pubdate,
            comment_count,
            ..VideoItem::default()
        }
    }

    fn raw(rpid: i64, content: &str, replies: Vec<RawComment>) -> RawComment {
        RawComment {
            rpid,
            content: content.to_string(),
            replies,
            ..RawComment::default()
        }
    }

    #[test]
    fn date_filter_drops_old_videos() {
        let now = Utc::now();
        let limits = TaskLimits {
            video_date_range_months: 6,
            ..TaskLimits::default()
        };
        let recent = (now - chrono::Duration::days(30)).timestamp();
        let old = (now - chrono::Duration::days(400)).timestamp();

        let kept = filter_videos(
            vec![video("BV1", recent, 0), video("BV2", old, 0)],
            &limits,
            now,
        );

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bvid, "BV1");
    }

    #[test]
    fn comment_floor_filter_is_inclusive() {
        let limits = TaskLimits {
            min_video_comments: 100,
            ..TaskLimits::default()
        };
        let kept = filter_videos(
            vec![video("BV1", 0, 100), video("BV2", 0, 99)],
            &limits,
            Utc::now(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bvid, "BV1");
    }

    #[test]
    fn disabled_filters_keep_everything() {
        let kept = filter_videos(
            vec![video("BV1", 0, 0), video("BV2", 0, 0)],
            &TaskLimits::default(),
            Utc::now(),
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn inputs_number_comments_in_video_order() {
        let videos = vec![video("BV2", 0, 0), video("BV1", 0, 0)];
        let mut comments = BTreeMap::new();
        comments.insert(
            "BV1".to_string(),
            vec![raw(10, "第二个视频的评论内容", vec![])],
        );
        comments.insert(
            "BV2".to_string(),
            vec![raw(
                20,
                "第一个视频的评论内容",
                vec![raw(21, "这是一条回复内容", vec![]), raw(22, "短", vec![])],
            )],
        );

        let config = FilterConfig {
            min_length: MIN_INPUT_CHARS,
            ..FilterConfig::default()
        };
        let inputs = prepare_inputs(&videos, &comments, &config);

        let mut ids: Vec<(&str, &str)> = inputs
            .iter()
            .map(|i| (i.id.as_str(), i.video_bvid.as_str()))
            .collect();
        ids.sort_unstable();
        assert_eq!(
            ids,
            vec![
                ("comment_0", "BV2"),
                ("comment_1", "BV2"),
                ("comment_3", "BV1"),
            ]
        );
        let reply = inputs.iter().find(|i| i.id == "comment_1").unwrap();
        assert_eq!(reply.video_title, "标题 BV2");
    }

    #[test]
    fn inputs_respect_comment_cap() {
        let videos = vec![video("BV1", 0, 0)];
        let comments: BTreeMap<String, Vec<RawComment>> = [(
            "BV1".to_string(),
            (0..10)
                .map(|i| raw(i, &format!("足够长的评论内容 {i}"), vec![]))
                .collect(),
        )]
        .into_iter()
        .collect();

        let config = FilterConfig {
            min_length: MIN_INPUT_CHARS,
            max_comments: 4,
            keywords: vec![],
        };
        let inputs = prepare_inputs(&videos, &comments, &config);
        assert_eq!(inputs.len(), 4);
    }

    #[test]
    fn filter_keywords_cover_brands_and_dimensions() {
        let request = TaskRequest::new(
            "吸尘器",
            vec![],
            vec!["戴森".to_string()],
            vec![Dimension::new("吸力", "")],
        );
        let config = filter_config(&request);
        assert_eq!(config.keywords, vec!["戴森".to_string(), "吸力".to_string()]);
        assert_eq!(config.min_length, MIN_INPUT_CHARS);
        assert_eq!(config.max_comments, request.limits.max_comments);
    }
}
