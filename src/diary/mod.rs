//! 日誌スクレイパーモジュール
//!
//! 子供ごとの日誌ページを巡回し、写真を `<保存先>/<フォルダ>/<日付>/` に整理して保存する

mod download;
mod navigator;
mod pagination;
mod paths;
mod traversal;
mod types;

pub use download::{DownloadOutcome, DownloadWatcher};
pub use navigator::PhotoNavigator;
pub use pagination::{ExpansionReport, Paginator, StopReason};
pub use paths::PathResolver;
pub use traversal::DiaryTraversal;
pub use types::{
    AdvanceOutcome, Affordance, CardReport, ChildTally, EntryDate, RunTally, SlotOutcome,
    VisibleUnit,
};
