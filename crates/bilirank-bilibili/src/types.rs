//! Wire types for the platform's JSON envelope and the endpoints used here.
//!
//! Only the fields the pipeline consumes are modelled; everything else is
//! ignored by serde. Numeric counters are occasionally sent as strings (or as
//! `"--"` for hidden values), so they go through [`lenient_u64`].

use bilirank_core::{RawComment, VideoItem};
use serde::{Deserialize, Deserializer};

/// `{code, message, data}` wrapper shared by every endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|v| u64::try_from(v).unwrap_or(0)))
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SearchData {
    #[serde(rename = "numResults", default)]
    pub num_results: u64,
    #[serde(rename = "numPages", default)]
    pub num_pages: u32,
    #[serde(default)]
    pub result: Option<Vec<SearchVideo>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchVideo {
    #[serde(default)]
    pub bvid: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub aid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub mid: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub play: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub video_review: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub favorites: u64,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub pubdate: i64,
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ReplyPageInfo {
    #[serde(default)]
    pub num: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentPageData {
    #[serde(default)]
    pub page: ReplyPageInfo,
    /// `null` when the video has no (more) comments.
    #[serde(default)]
    pub replies: Option<Vec<ReplyItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyContent {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyMember {
    #[serde(default)]
    pub uname: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyItem {
    pub rpid: i64,
    #[serde(default)]
    pub oid: i64,
    #[serde(default)]
    pub mid: i64,
    #[serde(default)]
    pub root: i64,
    #[serde(default)]
    pub parent: i64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub count: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub rcount: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub like: u64,
    #[serde(default)]
    pub ctime: i64,
    #[serde(default)]
    pub content: ReplyContent,
    #[serde(default)]
    pub member: ReplyMember,
    /// Preloaded nested replies (usually the first three).
    #[serde(default)]
    pub replies: Option<Vec<ReplyItem>>,
}

impl ReplyItem {
    /// Converts into the domain comment, attributing it to `bvid`.
    ///
    /// Preloaded nested replies are dropped; the caller decides whether to
    /// fetch the full thread.
    #[must_use]
    pub fn into_raw_comment(self, bvid: &str) -> RawComment {
        RawComment {
            rpid: self.rpid,
            video_bvid: bvid.to_string(),
            content: self.content.message,
            like: self.like,
            reply_count: self.rcount,
            ctime: self.ctime,
            member: self.member.uname,
            replies: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Nav (WBI sub-keys)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct WbiImg {
    #[serde(default)]
    pub img_url: String,
    #[serde(default)]
    pub sub_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NavData {
    #[serde(default)]
    pub wbi_img: Option<WbiImg>,
}

/// Parses `"MM:SS"` or `"H:MM:SS"` into seconds. Anything else yields `None`.
#[must_use]
pub fn parse_duration(raw: &str) -> Option<u32> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let mut total: u32 = 0;
    for part in parts {
        let value: u32 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(value)?;
    }
    Some(total)
}

impl SearchVideo {
    /// Builds the domain video with an already-cleaned `title`.
    /// An unparseable duration maps to `0`.
    #[must_use]
    pub fn into_video_item(self, title: String) -> VideoItem {
        VideoItem {
            duration_secs: parse_duration(&self.duration).unwrap_or(0),
            bvid: self.bvid,
            aid: self.aid,
            title,
            author: self.author,
            mid: self.mid,
            play: self.play,
            comment_count: self.video_review,
            favorites: self.favorites,
            pubdate: self.pubdate,
        }
    }
}
