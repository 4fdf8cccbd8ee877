//! 子供ごとの日誌ページを巡回する

use std::collections::HashSet;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ChildTarget, DiaryConfig};
use crate::error::ScraperError;
use crate::traits::{Correlator, DiaryPage};

use super::navigator::PhotoNavigator;
use super::pagination::Paginator;
use super::paths::PathResolver;
use super::types::{ChildTally, EntryDate, RunTally};

/// 日誌巡回
///
/// 子供は設定順に1人ずつ、カードは表示順に1枚ずつ処理する（並列化しない）。
/// ブラウザとダウンロード先は1つしかないため。
pub struct DiaryTraversal<'a, P: DiaryPage, C: Correlator> {
    page: &'a P,
    correlator: &'a C,
    config: &'a DiaryConfig,
    resolver: PathResolver,
}

impl<'a, P: DiaryPage, C: Correlator> DiaryTraversal<'a, P, C> {
    pub fn new(page: &'a P, correlator: &'a C, config: &'a DiaryConfig) -> Self {
        Self {
            page,
            correlator,
            config,
            resolver: PathResolver::new(&config.download_path),
        }
    }

    /// 全員分を処理する。子供単位の失敗は集計に記録して次へ進む。
    pub async fn run(&self) -> RunTally {
        let mut run = RunTally::default();

        for child in &self.config.children {
            info!("==================================================");
            info!("Processing {}...", child.name);
            let tally = self.process_child(child).await;
            info!(
                "{}: {} saved, {} already present, {} failed, {} dates",
                child.name,
                tally.saved,
                tally.already_present,
                tally.failed,
                tally.dates.len()
            );
            run.children.push(tally);
        }

        run
    }

    pub async fn process_child(&self, child: &ChildTarget) -> ChildTally {
        let mut tally = ChildTally::new(&child.id, &child.name);

        let url = self.config.diary_url(child);
        info!("Navigating to diary: {}", url);
        if let Err(e) = self.page.navigate(&url).await {
            warn!("Failed to navigate to {}'s diary: {}", child.name, e);
            tally.navigation_error = Some(e.to_string());
            return tally;
        }
        sleep(self.config.timing.initial_load_delay).await;

        let navigator = PhotoNavigator::new(
            self.page,
            self.correlator,
            &self.resolver,
            &self.config.timing,
        );
        let paginator = Paginator::from_config(self.page, self.config);
        let mut processed: HashSet<EntryDate> = HashSet::new();

        loop {
            match self.discover(&processed).await {
                Ok(cards) if !cards.is_empty() => {
                    info!("Found {} new diary entries to process", cards.len());
                    let total = cards.len();
                    for (i, (card, date)) in cards.into_iter().enumerate() {
                        info!("[{}/{}] Processing {}...", i + 1, total, date);
                        let report = navigator
                            .process_card(&card, &child.folder_name, date)
                            .await;
                        info!("  Downloaded {} photos", report.saved());
                        processed.insert(date);
                        tally.record(&report);
                    }
                }
                Ok(_) => debug!("No new diary entries in this pass"),
                Err(e) => warn!("Failed to list diary entries: {}", e),
            }

            match paginator.expand().await {
                Ok(report) if report.revealed_more() => {
                    debug!("Expansion revealed more content: {:?}", report);
                }
                Ok(report) => {
                    debug!("No further expansion: {:?}", report);
                    break;
                }
                Err(e) => {
                    warn!("Failed to expand diary page: {}", e);
                    break;
                }
            }
        }

        tally
    }

    /// 未処理の日付のカードを表示順に返す
    async fn discover(
        &self,
        processed: &HashSet<EntryDate>,
    ) -> Result<Vec<(P::Handle, EntryDate)>, ScraperError> {
        let mut found = Vec::new();
        let mut this_pass: HashSet<EntryDate> = HashSet::new();

        for card in self.page.date_cards().await? {
            let text = match self.page.card_date_text(&card).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Could not read card date: {}", e);
                    continue;
                }
            };
            let Some(date) = EntryDate::parse(&text) else {
                warn!("Skipping card with unparseable date: {:?}", text);
                continue;
            };
            if processed.contains(&date) || !this_pass.insert(date) {
                continue;
            }
            found.push((card, date));
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diary::DownloadWatcher;
    use crate::testing::{fast_config, FakeCard, FakeDiary, FakeDownload};

    fn card(day: u32, photos: usize) -> FakeCard {
        FakeCard::new(&format!("Reede, {}. märts 2024", day), photos)
    }

    #[tokio::test]
    async fn test_downloads_all_pages_for_one_child() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path());
        // 1ページ2枚 → 古い日誌を2回読み込む
        let page = FakeDiary::new(watch.path(), 2).with_child(
            "1",
            vec![card(15, 2), card(14, 0), card(13, 3), card(12, 1), card(11, 1)],
        );
        let watcher = DownloadWatcher::from_config(&config);

        let run = DiaryTraversal::new(&page, &watcher, &config).run().await;

        let mia = run.child("1").unwrap();
        assert_eq!(mia.saved, 7);
        assert_eq!(
            mia.dates,
            ["2024-03-15", "2024-03-14", "2024-03-13", "2024-03-12", "2024-03-11"]
        );
        assert_eq!(run.total(), 7);
        assert!(out
            .path()
            .join("Mia/2024-03-13/photo_20240313_003.jpg")
            .exists());
        assert!(!out.path().join("Mia/2024-03-14").exists());
    }

    #[tokio::test]
    async fn test_single_expansion_round_reaches_older_entries() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path()).with_max_scroll_attempts(1);
        let page = FakeDiary::new(watch.path(), 1).with_child("1", vec![card(15, 1), card(14, 1)]);
        let watcher = DownloadWatcher::from_config(&config);

        let run = DiaryTraversal::new(&page, &watcher, &config).run().await;

        assert_eq!(run.child("1").unwrap().dates, ["2024-03-15", "2024-03-14"]);
        assert_eq!(run.total(), 2);
    }

    #[tokio::test]
    async fn test_each_date_is_processed_once() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path());
        // 同じ日付のカードが2枚ある
        let page = FakeDiary::new(watch.path(), 10)
            .with_child("1", vec![card(15, 1), card(15, 2), card(14, 1)]);
        let watcher = DownloadWatcher::from_config(&config);

        let run = DiaryTraversal::new(&page, &watcher, &config).run().await;

        let mia = run.child("1").unwrap();
        assert_eq!(mia.dates, ["2024-03-15", "2024-03-14"]);
        assert_eq!(mia.saved, 2);
    }

    #[tokio::test]
    async fn test_unparseable_cards_are_skipped() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path());
        let page = FakeDiary::new(watch.path(), 10)
            .with_child("1", vec![FakeCard::new("Täna", 2), card(14, 1)]);
        let watcher = DownloadWatcher::from_config(&config);

        let run = DiaryTraversal::new(&page, &watcher, &config).run().await;

        assert_eq!(run.child("1").unwrap().dates, ["2024-03-14"]);
        assert_eq!(run.total(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_skips_only_that_child() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path());
        let page = FakeDiary::new(watch.path(), 10)
            .with_child("1", vec![card(15, 2)])
            .with_child("2", vec![card(15, 5)])
            .with_child("3", vec![card(14, 1), card(13, 1)])
            .unreachable("2");
        let watcher = DownloadWatcher::from_config(&config);

        let run = DiaryTraversal::new(&page, &watcher, &config).run().await;

        assert_eq!(run.children.len(), 3);
        assert_eq!(run.child("1").unwrap().saved, 2);
        let oskar = run.child("2").unwrap();
        assert!(oskar.skipped());
        assert_eq!(oskar.saved, 0);
        assert_eq!(run.child("3").unwrap().saved, 2);
        assert_eq!(run.total(), 4);
        assert!(!out.path().join("Oskar").exists());
    }

    #[tokio::test]
    async fn test_second_run_downloads_nothing_new() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path());
        let page = FakeDiary::new(watch.path(), 2)
            .with_child("1", vec![card(15, 2), card(14, 1), card(13, 3)])
            .with_child("3", vec![card(12, 2)]);
        let watcher = DownloadWatcher::from_config(&config);

        let first = DiaryTraversal::new(&page, &watcher, &config).run().await;
        let second = DiaryTraversal::new(&page, &watcher, &config).run().await;

        assert_eq!(first.total(), 8);
        assert_eq!(second.total(), 0);
        assert_eq!(
            second.children.iter().map(|c| c.already_present).sum::<usize>(),
            8
        );
    }

    #[tokio::test]
    async fn test_failed_slots_are_counted_but_not_saved() {
        let watch = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = fast_config(watch.path(), out.path());
        let page = FakeDiary::new(watch.path(), 10).with_child(
            "1",
            vec![card(15, 3).with_download(1, FakeDownload::Never)],
        );
        let watcher = DownloadWatcher::from_config(&config);

        let run = DiaryTraversal::new(&page, &watcher, &config).run().await;

        let mia = run.child("1").unwrap();
        assert_eq!(mia.saved, 2);
        assert_eq!(mia.failed, 1);
    }
}
