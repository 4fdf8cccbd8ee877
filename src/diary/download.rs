//! ブラウザのダウンロード先を監視し、成果物を保存先へ移動する

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{DiaryConfig, DownloadRules};
use crate::error::ScraperError;
use crate::traits::Correlator;

/// 1回のダウンロード待機の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// 保存先へ移動した
    Moved(PathBuf),
    /// 保存先が既に存在するため移動しなかった
    AlreadyExists,
    /// 時間内に完了したファイルが現れなかった
    TimedOut,
}

/// 監視ディレクトリ内のファイル状態
#[derive(Debug, Default)]
struct Snapshot {
    complete: Vec<PathBuf>,
    partial: usize,
}

/// ダウンロード監視
///
/// 同時に追跡する成果物は1つだけ。呼び出し側はダウンロードを開始する直前に
/// [`Correlator::clear`] を呼ぶこと。
#[derive(Debug, Clone)]
pub struct DownloadWatcher {
    watch_dir: PathBuf,
    rules: DownloadRules,
    timeout: Duration,
    poll_interval: Duration,
}

impl DownloadWatcher {
    pub fn new(
        watch_dir: impl Into<PathBuf>,
        rules: DownloadRules,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            rules,
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &DiaryConfig) -> Self {
        Self::new(
            config.watch_dir(),
            config.download.clone(),
            config.timing.download_timeout,
            config.timing.download_poll_interval,
        )
    }

    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    fn has_extension(path: &Path, extensions: &[String]) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                extensions.iter().any(|e| ext.eq_ignore_ascii_case(e))
            })
            .unwrap_or(false)
    }

    fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let entries = match std::fs::read_dir(&self.watch_dir) {
            Ok(entries) => entries,
            Err(_) => return snapshot,
        };

        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if !path.is_file() {
                continue;
            }
            if Self::has_extension(&path, &self.rules.partial_extensions) {
                snapshot.partial += 1;
            } else if Self::has_extension(&path, &self.rules.final_extensions) {
                snapshot.complete.push(path);
            }
        }
        snapshot.complete.sort();
        snapshot
    }

    /// 完了したファイルを待つ。途中ファイルが残っている間は完了とみなさない。
    async fn wait_for_complete(&self) -> Option<PathBuf> {
        let start = Instant::now();

        loop {
            let snapshot = self.snapshot();
            if snapshot.partial == 0 {
                if let Some(path) = snapshot.complete.into_iter().next() {
                    debug!("Download complete: {:?}", path);
                    return Some(path);
                }
            }

            if start.elapsed() >= self.timeout {
                return None;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// 移動（別ファイルシステムの場合はコピーして削除）
    fn relocate(source: &Path, destination: &Path) -> Result<(), ScraperError> {
        if std::fs::rename(source, destination).is_ok() {
            return Ok(());
        }
        std::fs::copy(source, destination)?;
        std::fs::remove_file(source)?;
        Ok(())
    }
}

#[async_trait]
impl Correlator for DownloadWatcher {
    fn clear(&self) -> Result<usize, ScraperError> {
        std::fs::create_dir_all(&self.watch_dir)?;

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.watch_dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let stale = Self::has_extension(&path, &self.rules.final_extensions)
                || Self::has_extension(&path, &self.rules.partial_extensions);
            if !stale {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale download {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }

    async fn await_and_relocate(
        &self,
        destination: &Path,
    ) -> Result<DownloadOutcome, ScraperError> {
        let source = match self.wait_for_complete().await {
            Some(path) => path,
            None => {
                debug!(
                    "No completed download in {:?} after {:?}",
                    self.watch_dir, self.timeout
                );
                return Ok(DownloadOutcome::TimedOut);
            }
        };

        if destination.exists() {
            // 次のスロットに紛れ込まないよう捨てる
            if let Err(e) = std::fs::remove_file(&source) {
                debug!("Failed to discard duplicate download {:?}: {}", source, e);
            }
            return Ok(DownloadOutcome::AlreadyExists);
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::relocate(&source, destination)?;
        info!("Moved {:?} -> {:?}", source, destination);

        Ok(DownloadOutcome::Moved(destination.to_path_buf()))
    }
}
