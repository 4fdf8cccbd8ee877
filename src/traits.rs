use std::path::Path;

use async_trait::async_trait;

use crate::diary::{Affordance, DownloadOutcome, VisibleUnit};
use crate::error::ScraperError;

/// 日誌ページに対するブラウザ操作
///
/// 認証済みのブラウザセッションを前提とし、起動・終了は扱わない。
/// 画面構造の差異はすべて実装側（`find_affordance`）に閉じ込める。
#[async_trait]
pub trait DiaryPage: Send + Sync {
    /// 要素ハンドル
    type Handle: Send + Sync;

    /// URLへ遷移し、ページ本体が現れるまで待つ
    async fn navigate(&self, url: &str) -> Result<(), ScraperError>;

    /// 現在表示されている日誌カード（表示順）
    async fn date_cards(&self) -> Result<Vec<Self::Handle>, ScraperError>;

    /// カードの日付表記
    async fn card_date_text(&self, card: &Self::Handle) -> Result<Option<String>, ScraperError>;

    /// カード内のサムネイル数
    async fn thumbnail_count(&self, card: &Self::Handle) -> Result<usize, ScraperError>;

    /// ページ全体で表示中の単位数
    async fn visible_count(&self, unit: VisibleUnit) -> Result<usize, ScraperError>;

    /// 役割に対応する操作対象を探す。見つからなければ `None`。
    ///
    /// `scope` を指定した場合はその要素の内側だけを探す。
    async fn find_affordance(
        &self,
        role: Affordance,
        scope: Option<&Self::Handle>,
    ) -> Result<Option<Self::Handle>, ScraperError>;

    async fn scroll_into_view(&self, target: &Self::Handle) -> Result<(), ScraperError>;

    /// スクリプト経由でクリックする（オーバーレイや非表示状態を回避）
    async fn click(&self, target: &Self::Handle) -> Result<(), ScraperError>;

    /// ビューアに表示中の画像の識別子（画像URL）
    async fn displayed_image(&self) -> Result<Option<String>, ScraperError>;

    async fn press_escape(&self) -> Result<(), ScraperError>;

    async fn scroll_to_bottom(&self) -> Result<(), ScraperError>;
}

/// ダウンロードされたファイルと保存先の対応付け
#[async_trait]
pub trait Correlator: Send + Sync {
    /// ダウンロード開始直前に監視ディレクトリを空にする。削除した件数を返す。
    fn clear(&self) -> Result<usize, ScraperError>;

    /// ダウンロード完了を待ち、成果物を `destination` へ移動する
    async fn await_and_relocate(
        &self,
        destination: &Path,
    ) -> Result<DownloadOutcome, ScraperError>;
}
