//! Bilibili platform access: video ID codec, WBI request signing, a retrying
//! HTTP client for search and comment listing, and a bounded concurrent
//! comment scraper.

pub mod bvid;
pub mod client;
pub mod error;
pub mod scraper;
pub mod types;
pub mod wbi;

mod retry;

pub use bvid::{decode_bvid, encode_avid};
pub use client::{BilibiliClient, ClientOptions, SearchPage};
pub use error::BilibiliError;
pub use scraper::{
    allocate_comments, CommentSource, ScrapeProgress, ScrapeResult, ScrapeStats, Scraper,
    ScraperConfig,
};
pub use wbi::{mixin_key, sign_params, WbiKeyCache};
