//! 日誌写真ダウンローダー
//!
//! ログイン済みブラウザで子供ごとの日誌ページを巡回し、写真を
//! `<保存先>/<フォルダ名>/<YYYY-MM-DD>/photo_<YYYYMMDD>_<NNN>.jpg` に保存する。
//! 既に保存済みの写真は再ダウンロードしても上書きしない。
//!
//! # 使用例
//!
//! ```rust,ignore
//! use diary_photo_scraper::{DiaryConfig, DiaryService};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DiaryConfig::load("config.json").unwrap();
//!
//!     let mut service = DiaryService::new();
//!     let summary = service.call(config.into()).await.unwrap();
//!     println!("Photos downloaded: {}", summary.total());
//! }
//! ```
//!
//! # ページ操作を差し替える
//!
//! 巡回ロジックは [`DiaryPage`] と [`Correlator`] にのみ依存するので、
//! ブラウザなしでも [`DiaryTraversal`] を動かせる。

pub mod browser;
pub mod config;
pub mod diary;
pub mod error;
pub mod service;
pub mod traits;

#[cfg(test)]
mod testing;

// 主要な型をリエクスポート
pub use browser::{BrowserSession, ChromePage};
pub use config::{ChildTarget, DiaryConfig, DownloadRules, Timing};
pub use error::ScraperError;
pub use service::{DiaryService, DownloadRequest, DownloadSummary};
pub use traits::{Correlator, DiaryPage};

pub use diary::{
    ChildTally, DiaryTraversal, DownloadOutcome, DownloadWatcher, EntryDate, PathResolver,
    PhotoNavigator, RunTally, SlotOutcome,
};
