//! 日誌スクレイパー関連の型定義

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;

/// 日誌カードの日付
///
/// 処理済み判定には ISO 形式 (`YYYY-MM-DD`) を使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryDate(NaiveDate);

/// エストニア語の月名（日誌アプリの表示言語）
const ESTONIAN_MONTHS: [&str; 12] = [
    "jaanuar", "veebruar", "märts", "aprill", "mai", "juuni", "juuli", "august", "september",
    "oktoober", "november", "detsember",
];

const ENGLISH_MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

const NUMERIC_FORMATS: [&str; 3] = ["%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y"];

impl EntryDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// カードの日付テキストを解析する
    ///
    /// `"Reede, 15. märts 2024"` のような曜日付きの表記と、
    /// `15.03.2024` / `2024-03-15` / `15/03/2024` の数値表記を受け付ける。
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        // 曜日部分を落とす
        let body = text.rsplit(", ").next().unwrap_or(text).trim();

        if let Some(date) = Self::parse_named_month(body) {
            return Some(date);
        }
        NUMERIC_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(body, fmt).ok())
            .map(Self)
    }

    fn parse_named_month(body: &str) -> Option<Self> {
        let mut parts = body.split_whitespace();
        let day: u32 = parts.next()?.trim_end_matches('.').parse().ok()?;
        let month_name = parts.next()?.trim_end_matches(['.', ',']).to_lowercase();
        let year: i32 = parts.next()?.parse().ok()?;

        let month = ESTONIAN_MONTHS
            .iter()
            .position(|m| *m == month_name)
            .or_else(|| ENGLISH_MONTHS.iter().position(|m| *m == month_name))?;

        Self::from_ymd(year, month as u32 + 1, day)
    }

    /// `YYYY-MM-DD`
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `YYYYMMDD`（ファイル名用）
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for EntryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso())
    }
}

/// 画面上の操作対象（ボタン・アイコン）の役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affordance {
    /// カード内のサムネイル
    Thumbnail,
    /// ビューアのダウンロードボタン
    Download,
    /// ビューアの「次へ」矢印
    Forward,
    /// ビューアの閉じるボタン
    Close,
    /// 「Kuva rohkem」（写真をもっと見る）
    ShowMore,
    /// 「Vaata vanemaid päevikuid」（古い日誌を読み込む）
    LoadOlder,
}

impl Affordance {
    pub fn name(&self) -> &'static str {
        match self {
            Affordance::Thumbnail => "thumbnail",
            Affordance::Download => "download",
            Affordance::Forward => "forward",
            Affordance::Close => "close",
            Affordance::ShowMore => "show-more",
            Affordance::LoadOlder => "load-older",
        }
    }
}

impl fmt::Display for Affordance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ページ展開の進捗を測る単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibleUnit {
    /// 表示中のサムネイル数
    Photos,
    /// 表示中の日誌カード数
    Cards,
}

/// 1枚分のダウンロード結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// 保存先へ移動した
    Saved(PathBuf),
    /// 保存先に既にファイルがある（再実行時）
    AlreadyPresent(PathBuf),
    /// ダウンロードボタンが見つからない・押せない
    DownloadUnavailable,
    /// ダウンロードが時間内に完了しなかった
    TimedOut,
    /// その他の失敗
    Failed(String),
}

impl SlotOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SlotOutcome::DownloadUnavailable | SlotOutcome::TimedOut | SlotOutcome::Failed(_)
        )
    }
}

/// 「次へ」操作の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// 表示画像が切り替わった
    Advanced,
    /// 「次へ」矢印がない（最後の写真）
    NoAffordance,
    /// 押しても画像が変わらなかった
    Stalled,
    /// 既に表示した画像に戻った
    Wrapped,
}

/// 日誌カード1枚分の処理結果
#[derive(Debug, Clone)]
pub struct CardReport {
    pub date: EntryDate,
    /// スロット順（1始まりの連番に対応）
    pub slots: Vec<SlotOutcome>,
    /// ループを終了させた「次へ」の結果
    pub last_advance: Option<AdvanceOutcome>,
    /// 途中でブラウザ操作が失敗した場合の理由
    pub aborted: Option<String>,
}

impl CardReport {
    pub fn empty(date: EntryDate) -> Self {
        Self {
            date,
            slots: Vec::new(),
            last_advance: None,
            aborted: None,
        }
    }

    pub fn saved(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotOutcome::Saved(_)))
            .count()
    }

    pub fn already_present(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotOutcome::AlreadyPresent(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_failure()).count()
    }
}

/// 子供1人分の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildTally {
    pub child_id: String,
    pub name: String,
    pub saved: usize,
    pub already_present: usize,
    pub failed: usize,
    /// 処理済みの日付（ISO形式、処理順）
    pub dates: Vec<String>,
    /// 日誌ページへ遷移できなかった場合の理由
    pub navigation_error: Option<String>,
}

impl ChildTally {
    pub fn new(child_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, report: &CardReport) {
        self.saved += report.saved();
        self.already_present += report.already_present();
        self.failed += report.failed();
        self.dates.push(report.date.iso());
    }

    pub fn skipped(&self) -> bool {
        self.navigation_error.is_some()
    }
}

/// 実行全体の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTally {
    pub children: Vec<ChildTally>,
}

impl RunTally {
    /// 新たに保存した写真の合計
    pub fn total(&self) -> usize {
        self.children.iter().map(|c| c.saved).sum()
    }

    pub fn child(&self, child_id: &str) -> Option<&ChildTally> {
        self.children.iter().find(|c| c.child_id == child_id)
    }
}
