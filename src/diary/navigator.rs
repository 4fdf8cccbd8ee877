//! 日誌カード1枚分の写真を、ビューアの「次へ」矢印でたどりながらダウンロードする

use std::collections::HashSet;
use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Timing;
use crate::error::ScraperError;
use crate::traits::{Correlator, DiaryPage};

use super::download::DownloadOutcome;
use super::paths::PathResolver;
use super::types::{AdvanceOutcome, Affordance, CardReport, EntryDate, SlotOutcome};

/// 写真ビューアの巡回
///
/// 状態遷移: サムネイルを開く → ダウンロード → 「次へ」→ 画像が変わればスロットを進めて繰り返す。
/// 矢印がない・画像が変わらない・既に見た画像に戻った場合はビューアを閉じて終了する。
pub struct PhotoNavigator<'a, P: DiaryPage, C: Correlator> {
    page: &'a P,
    correlator: &'a C,
    resolver: &'a PathResolver,
    timing: &'a Timing,
}

impl<'a, P: DiaryPage, C: Correlator> PhotoNavigator<'a, P, C> {
    pub fn new(
        page: &'a P,
        correlator: &'a C,
        resolver: &'a PathResolver,
        timing: &'a Timing,
    ) -> Self {
        Self {
            page,
            correlator,
            resolver,
            timing,
        }
    }

    /// カード1枚分を処理する。ブラウザ操作の失敗は `CardReport::aborted` に記録する。
    pub async fn process_card(
        &self,
        card: &P::Handle,
        folder_name: &str,
        date: EntryDate,
    ) -> CardReport {
        let mut report = CardReport::empty(date);

        match self.walk(card, folder_name, &mut report).await {
            Ok(false) => {}
            Ok(true) => self.close_viewer().await,
            Err(e) => {
                warn!("Error processing photos for {}: {}", date, e);
                report.aborted = Some(e.to_string());
                self.close_viewer().await;
            }
        }

        report
    }

    /// ビューアを開いた場合は `true`
    async fn walk(
        &self,
        card: &P::Handle,
        folder_name: &str,
        report: &mut CardReport,
    ) -> Result<bool, ScraperError> {
        let date = report.date;
        let first = match self
            .page
            .find_affordance(Affordance::Thumbnail, Some(card))
            .await?
        {
            Some(thumbnail) => thumbnail,
            None => {
                debug!("No visible photos for {}", date);
                return Ok(false);
            }
        };
        let visible = self.page.thumbnail_count(card).await.unwrap_or(0);
        info!("Found {} visible photos for {}", visible, date);

        self.page.scroll_into_view(&first).await?;
        sleep(self.timing.scroll_settle).await;
        self.page.click(&first).await?;
        sleep(self.timing.viewer_settle).await;

        let mut seen: HashSet<String> = HashSet::new();
        if let Some(src) = self.page.displayed_image().await.unwrap_or(None) {
            seen.insert(src);
        }

        let mut slot: u32 = 1;
        loop {
            let outcome = self.download_slot(folder_name, &date, slot).await;
            match &outcome {
                SlotOutcome::Saved(path) => info!("  Photo {}: saved {:?}", slot, path),
                SlotOutcome::AlreadyPresent(_) => info!("  Photo {}: exists", slot),
                SlotOutcome::DownloadUnavailable => warn!("  Photo {}: download button unavailable", slot),
                SlotOutcome::TimedOut => warn!("  Photo {}: download timed out", slot),
                SlotOutcome::Failed(reason) => warn!("  Photo {}: failed ({})", slot, reason),
            }
            report.slots.push(outcome);

            let advance = self.advance(&mut seen).await;
            if advance != AdvanceOutcome::Advanced {
                debug!("Stopping after photo {} of {}: {:?}", slot, date, advance);
                report.last_advance = Some(advance);
                return Ok(true);
            }

            slot += 1;
            sleep(self.timing.advance_settle).await;
        }
    }

    async fn download_slot(&self, folder_name: &str, date: &EntryDate, slot: u32) -> SlotOutcome {
        match self.try_download(folder_name, date, slot).await {
            Ok(outcome) => outcome,
            Err(e) => SlotOutcome::Failed(e.to_string()),
        }
    }

    async fn try_download(
        &self,
        folder_name: &str,
        date: &EntryDate,
        slot: u32,
    ) -> Result<SlotOutcome, ScraperError> {
        let Some(button) = self.wait_for_download_button().await else {
            return Ok(SlotOutcome::DownloadUnavailable);
        };
        let destination = self.resolver.resolve(folder_name, date, slot)?;

        // 前の写真のファイルを取り違えないよう、クリック直前に空にする
        self.correlator.clear()?;

        if let Err(e) = self.page.click(&button).await {
            debug!("Download button click failed: {}", e);
            return Ok(SlotOutcome::DownloadUnavailable);
        }

        Ok(match self.correlator.await_and_relocate(&destination).await? {
            DownloadOutcome::Moved(path) => SlotOutcome::Saved(path),
            DownloadOutcome::AlreadyExists => SlotOutcome::AlreadyPresent(destination),
            DownloadOutcome::TimedOut => SlotOutcome::TimedOut,
        })
    }

    /// ビューアの描画を待ちながらダウンロードボタンを探す
    async fn wait_for_download_button(&self) -> Option<P::Handle> {
        let start = Instant::now();
        loop {
            match self.page.find_affordance(Affordance::Download, None).await {
                Ok(Some(button)) => return Some(button),
                Ok(None) => {}
                Err(e) => debug!("Download button lookup failed: {}", e),
            }
            if start.elapsed() >= self.timing.affordance_timeout {
                return None;
            }
            sleep(self.timing.advance_poll_interval).await;
        }
    }

    /// 「次へ」を押し、表示画像のURLが変わるまで待つ
    async fn advance(&self, seen: &mut HashSet<String>) -> AdvanceOutcome {
        let before = match self.page.displayed_image().await {
            Ok(src) => src,
            Err(e) => {
                debug!("Could not read displayed image: {}", e);
                None
            }
        };
        // ビューアを開いた直後は画像が未描画のことがある
        if let Some(src) = &before {
            seen.insert(src.clone());
        }

        let arrow = match self.page.find_affordance(Affordance::Forward, None).await {
            Ok(Some(arrow)) => arrow,
            Ok(None) => return AdvanceOutcome::NoAffordance,
            Err(e) => {
                debug!("Forward arrow lookup failed: {}", e);
                return AdvanceOutcome::NoAffordance;
            }
        };

        if let Err(e) = self.page.click(&arrow).await {
            debug!("Forward arrow click failed: {}", e);
            return AdvanceOutcome::NoAffordance;
        }

        let start = Instant::now();
        while start.elapsed() < self.timing.advance_timeout {
            sleep(self.timing.advance_poll_interval).await;

            let current = match self.page.displayed_image().await {
                Ok(Some(src)) => src,
                _ => continue,
            };
            if before.as_deref() == Some(current.as_str()) {
                continue;
            }
            // 先頭に戻るタイプのビューア
            if !seen.insert(current) {
                return AdvanceOutcome::Wrapped;
            }
            return AdvanceOutcome::Advanced;
        }

        warn!("Image didn't change after forward click");
        AdvanceOutcome::Stalled
    }

    /// 閉じるボタン、なければ Escape。失敗しても続行する。
    async fn close_viewer(&self) {
        match self.page.find_affordance(Affordance::Close, None).await {
            Ok(Some(button)) => match self.page.click(&button).await {
                Ok(()) => {
                    sleep(self.timing.close_settle).await;
                    return;
                }
                Err(e) => debug!("Close button click failed: {}", e),
            },
            Ok(None) => {}
            Err(e) => debug!("Close button lookup failed: {}", e),
        }

        if let Err(e) = self.page.press_escape().await {
            debug!("Escape failed, leaving viewer open: {}", e);
        }
        sleep(self.timing.close_settle).await;
    }
}
