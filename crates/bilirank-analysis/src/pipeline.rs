//! Batch scoring pipeline.
//!
//! Comments are packed into batches, each batch is scored by one merged model
//! call, and a batch whose merged reply is unusable is re-scored one comment
//! at a time. Output always has one [`ScoredComment`] per input, in input
//! order.

use std::collections::BTreeMap;

use bilirank_core::{cancellable, CommentInput, Dimension, ScoredComment};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;

use crate::batch::{calculate_batches, BatchConfig};
use crate::client::{ChatMessage, ChatModel};
use crate::error::AnalysisError;
use crate::json::clean_json_response;
use crate::prompt;

const NOT_IN_BATCH_REPLY: &str = "未在批量响应中找到对应结果";
const CANCELLED: &str = "已取消";

/// Reported after each completed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisProgress {
    pub completed_batches: usize,
    pub total_batches: usize,
    pub completed_items: usize,
    pub total_items: usize,
    pub message: String,
}

#[derive(Deserialize)]
struct SingleReply {
    #[serde(default)]
    brand: String,
    #[serde(default)]
    model: String,
    scores: BTreeMap<String, Option<f64>>,
}

#[derive(Deserialize)]
struct BatchReply {
    #[serde(default)]
    results: Option<Vec<BatchItem>>,
}

#[derive(Deserialize)]
struct BatchItem {
    #[serde(default, deserialize_with = "id_as_string")]
    id: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    scores: Option<BTreeMap<String, Option<f64>>>,
}

/// Accepts `"1"` or `1`.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn validate(empty: Option<&str>, dimensions: &[Dimension]) -> Result<(), AnalysisError> {
    if let Some(reason) = empty {
        return Err(AnalysisError::InvalidInput(reason.to_string()));
    }
    if dimensions.is_empty() {
        return Err(AnalysisError::InvalidInput("评价维度不能为空".to_string()));
    }
    Ok(())
}

/// Keeps one entry per declared dimension.
fn project_scores(
    scores: &BTreeMap<String, Option<f64>>,
    dimensions: &[Dimension],
) -> BTreeMap<String, Option<f64>> {
    dimensions
        .iter()
        .map(|d| (d.name.clone(), scores.get(&d.name).copied().flatten()))
        .collect()
}

fn scored(
    input: &CommentInput,
    brand: String,
    model: String,
    scores: BTreeMap<String, Option<f64>>,
) -> ScoredComment {
    ScoredComment {
        comment_id: input.id.clone(),
        content: input.content.clone(),
        video_bvid: input.video_bvid.clone(),
        video_title: input.video_title.clone(),
        scores,
        brand: brand.trim().to_string(),
        model: model.trim().to_string(),
        error: None,
    }
}

/// Scores a single comment with its own model call.
///
/// # Errors
///
/// - [`AnalysisError::InvalidInput`] for empty content or no dimensions.
/// - [`AnalysisError::Deserialize`] if the reply has no `{brand, model, scores}`
///   object.
/// - The model call's error.
pub async fn analyze_comment(
    model: &dyn ChatModel,
    input: &CommentInput,
    dimensions: &[Dimension],
) -> Result<ScoredComment, AnalysisError> {
    let blank = input.content.trim().is_empty();
    validate(blank.then_some("评论内容不能为空"), dimensions)?;

    let messages = [
        ChatMessage::system(prompt::single_comment_system(dimensions)),
        ChatMessage::user(prompt::single_comment_user(input)),
    ];
    let reply = model.complete(&messages).await?;
    let parsed: SingleReply = serde_json::from_str(clean_json_response(&reply)).map_err(|source| {
        AnalysisError::Deserialize {
            context: format!("analysis of {}", input.id),
            source,
        }
    })?;

    Ok(scored(
        input,
        parsed.brand,
        parsed.model,
        project_scores(&parsed.scores, dimensions),
    ))
}

/// Scores each comment with its own call, all at once; the client's
/// concurrency gate bounds how many run together. Failures become errored
/// items.
pub async fn analyze_comments_individually(
    model: &dyn ChatModel,
    inputs: &[CommentInput],
    dimensions: &[Dimension],
) -> Vec<ScoredComment> {
    join_all(inputs.iter().map(|input| async move {
        match analyze_comment(model, input, dimensions).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(comment_id = %input.id, error = %e, "comment analysis failed");
                ScoredComment::failed(input, e.to_string())
            }
        }
    }))
    .await
}

/// Scores `inputs` with one merged model call.
///
/// Reply item `i` belongs to input `i` when its id is `i + 1` or the input's
/// own id. Inputs with no matching item carry an error.
///
/// # Errors
///
/// - [`AnalysisError::InvalidInput`] for empty inputs or no dimensions.
/// - [`AnalysisError::Deserialize`] if the reply is not JSON.
/// - [`AnalysisError::MissingResults`] if the reply has no `results` array.
/// - The model call's error.
pub async fn analyze_batch_merged(
    model: &dyn ChatModel,
    inputs: &[CommentInput],
    dimensions: &[Dimension],
) -> Result<Vec<ScoredComment>, AnalysisError> {
    validate(inputs.is_empty().then_some("评论列表不能为空"), dimensions)?;

    let messages = [
        ChatMessage::system(prompt::merged_batch_system(dimensions)),
        ChatMessage::user(prompt::merged_batch_user(inputs)),
    ];
    let reply = model.complete(&messages).await?;
    let parsed: BatchReply =
        serde_json::from_str(clean_json_response(&reply)).map_err(|source| {
            AnalysisError::Deserialize {
                context: "batch analysis".to_string(),
                source,
            }
        })?;
    let mut items = parsed.results.ok_or(AnalysisError::MissingResults)?;

    Ok(inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let position = (i + 1).to_string();
            let found = items
                .iter()
                .position(|item| item.id == position || item.id == input.id)
                .map(|at| items.swap_remove(at));
            match found {
                Some(BatchItem {
                    brand,
                    model: model_name,
                    scores: Some(scores),
                    ..
                }) => scored(input, brand, model_name, project_scores(&scores, dimensions)),
                _ => ScoredComment::failed(input, NOT_IN_BATCH_REPLY),
            }
        })
        .collect())
}

/// Merged call with per-comment fallback. Always one result per input.
async fn analyze_batch(
    model: &dyn ChatModel,
    batch: &[CommentInput],
    dimensions: &[Dimension],
) -> Vec<ScoredComment> {
    match analyze_batch_merged(model, batch, dimensions).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(
                items = batch.len(),
                error = %e,
                "merged batch failed, falling back to per-comment analysis"
            );
            analyze_comments_individually(model, batch, dimensions).await
        }
    }
}

/// Scores every input, `concurrency` batches at a time.
///
/// Results are placed by batch index, so output order matches `inputs`
/// regardless of completion order. `on_progress` fires once per completed
/// batch. Once `cancel` fires no new batch starts; batches that never
/// finished come back as items with a cancellation error.
pub async fn analyze_comments<F>(
    model: &dyn ChatModel,
    inputs: &[CommentInput],
    dimensions: &[Dimension],
    batch_config: &BatchConfig,
    concurrency: usize,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Vec<ScoredComment>
where
    F: FnMut(AnalysisProgress),
{
    let batches = calculate_batches(inputs, batch_config);
    let total_batches = batches.len();
    let total_items = inputs.len();
    tracing::info!(
        comments = total_items,
        batches = total_batches,
        concurrency,
        "starting batch analysis"
    );

    let mut slots: Vec<Option<Vec<ScoredComment>>> = vec![None; total_batches];
    let mut completed_batches = 0usize;
    let mut completed_items = 0usize;

    let batch_futures: Vec<_> = batches
        .iter()
        .enumerate()
        .map(|(index, batch)| async move {
            if cancel.is_cancelled() {
                return (index, None);
            }
            (
                index,
                cancellable(cancel, analyze_batch(model, batch, dimensions)).await,
            )
        })
        .collect();
    let mut results = stream::iter(batch_futures).buffer_unordered(concurrency.max(1));

    while let Some((index, outcome)) = results.next().await {
        let Some(batch_results) = outcome else {
            continue;
        };
        completed_batches += 1;
        completed_items += batch_results.len();
        on_progress(AnalysisProgress {
            completed_batches,
            total_batches,
            completed_items,
            total_items,
            message: format!(
                "正在分析第 {completed_batches}/{total_batches} 批（{} 条评论）",
                batch_results.len()
            ),
        });
        slots[index] = Some(batch_results);
    }
    drop(results);

    if cancel.is_cancelled() {
        tracing::info!(completed_batches, total_batches, "batch analysis cancelled");
    }

    batches
        .iter()
        .zip(slots)
        .flat_map(|(batch, slot)| {
            slot.unwrap_or_else(|| {
                batch
                    .iter()
                    .map(|input| ScoredComment::failed(input, CANCELLED))
                    .collect()
            })
        })
        .collect()
}
