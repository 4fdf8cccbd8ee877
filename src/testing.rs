//! テスト用の疑似日誌ページ
//!
//! ダウンロードボタンを押すと監視ディレクトリへ実ファイル（中身は画像URL）を書き出すので、
//! 本物の `DownloadWatcher` / `PathResolver` と組み合わせて検証できる。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ChildTarget, DiaryConfig, Timing};
use crate::diary::{Affordance, VisibleUnit};
use crate::error::ScraperError;
use crate::traits::DiaryPage;

/// 短い待機時間の設定（子供: 1=Mia, 2=Oskar, 3=Lena）
pub(crate) fn fast_config(watch_dir: &Path, out_dir: &Path) -> DiaryConfig {
    DiaryConfig::new(vec![
        ChildTarget::new("1", "Mia", "Mia"),
        ChildTarget::new("2", "Oskar", "Oskar"),
        ChildTarget::new("3", "Lena", "Lena"),
    ])
    .with_base_url("https://diary.test")
    .with_download_path(out_dir)
    .with_browser_download_dir(watch_dir)
    .with_timing(Timing::uniform(
        Duration::from_millis(1),
        Duration::from_millis(150),
        Duration::from_millis(5),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeDownload {
    /// ボタンを押すとファイルができる
    Writes,
    /// ボタンはあるが何も起きない
    Never,
    /// ボタンがない
    NoButton,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeCard {
    date_text: String,
    photos: Vec<(String, FakeDownload)>,
}

impl FakeCard {
    pub(crate) fn new(date_text: &str, photos: usize) -> Self {
        Self {
            date_text: date_text.to_string(),
            photos: (0..photos)
                .map(|i| (Self::photo_src(date_text, i), FakeDownload::Writes))
                .collect(),
        }
    }

    pub(crate) fn photo_src(date_text: &str, index: usize) -> String {
        let slug: String = date_text
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        format!("https://cdn.test/{}/{}.jpg", slug, index)
    }

    /// `index` は0始まり
    pub(crate) fn with_download(mut self, index: usize, behavior: FakeDownload) -> Self {
        self.photos[index].1 = behavior;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeHandle {
    Card(usize),
    Thumbnail(usize),
    Download,
    Forward,
    Close,
    LoadOlder,
}

#[derive(Default)]
struct State {
    diaries: HashMap<String, Vec<FakeCard>>,
    unreachable: HashSet<String>,
    current: Option<String>,
    revealed: usize,
    /// (カード, 写真)
    viewer: Option<(usize, usize)>,
    stuck_forward: bool,
    wrapping: bool,
    /// ビューアを開いた直後、ダウンロードボタンが見つからない回数
    late_download: usize,
    /// ビューアを開いた直後、画像が未描画の回数
    blank_image: usize,
    hidden_download_left: usize,
    hidden_image_left: usize,
    downloads: usize,
    forward_clicks: usize,
    close_attempts: usize,
}

impl State {
    fn cards(&self) -> &[FakeCard] {
        self.current
            .as_ref()
            .and_then(|id| self.diaries.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn viewer_photo(&self) -> Option<&(String, FakeDownload)> {
        let (card, photo) = self.viewer?;
        self.cards().get(card)?.photos.get(photo)
    }

    fn has_next(&self) -> bool {
        match self.viewer {
            Some((card, photo)) => {
                self.stuck_forward
                    || self.wrapping
                    || photo + 1 < self.cards()[card].photos.len()
            }
            None => false,
        }
    }
}

pub(crate) struct FakeDiary {
    watch_dir: PathBuf,
    page_size: usize,
    state: Mutex<State>,
}

impl FakeDiary {
    /// `page_size`: 1回の読み込みで表示されるカード数
    pub(crate) fn new(watch_dir: &Path, page_size: usize) -> Self {
        Self {
            watch_dir: watch_dir.to_path_buf(),
            page_size,
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn with_child(self, id: &str, cards: Vec<FakeCard>) -> Self {
        self.state().diaries.insert(id.to_string(), cards);
        self
    }

    pub(crate) fn unreachable(self, id: &str) -> Self {
        self.state().unreachable.insert(id.to_string());
        self
    }

    pub(crate) fn set_stuck_forward(&self, stuck: bool) {
        self.state().stuck_forward = stuck;
    }

    pub(crate) fn set_wrapping(&self, wrapping: bool) {
        self.state().wrapping = wrapping;
    }

    /// ビューアを開くたびに、ダウンロードボタンの検索が `lookups` 回空振りする
    pub(crate) fn set_late_download(&self, lookups: usize) {
        self.state().late_download = lookups;
    }

    /// ビューアを開くたびに、表示画像の取得が `reads` 回 `None` を返す
    pub(crate) fn set_blank_image(&self, reads: usize) {
        self.state().blank_image = reads;
    }

    pub(crate) fn viewer_open(&self) -> bool {
        self.state().viewer.is_some()
    }

    pub(crate) fn downloads(&self) -> usize {
        self.state().downloads
    }

    pub(crate) fn forward_clicks(&self) -> usize {
        self.state().forward_clicks
    }

    pub(crate) fn close_attempts(&self) -> usize {
        self.state().close_attempts
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl DiaryPage for FakeDiary {
    type Handle = FakeHandle;

    async fn navigate(&self, url: &str) -> Result<(), ScraperError> {
        let id = url
            .split("/child/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default()
            .to_string();

        let mut state = self.state();
        if state.unreachable.contains(&id) || !state.diaries.contains_key(&id) {
            return Err(ScraperError::Navigation(format!("cannot open {}", url)));
        }
        state.current = Some(id);
        state.revealed = self.page_size;
        state.viewer = None;
        Ok(())
    }

    async fn date_cards(&self) -> Result<Vec<FakeHandle>, ScraperError> {
        let state = self.state();
        let visible = state.revealed.min(state.cards().len());
        Ok((0..visible).map(FakeHandle::Card).collect())
    }

    async fn card_date_text(&self, card: &FakeHandle) -> Result<Option<String>, ScraperError> {
        let state = self.state();
        Ok(match card {
            FakeHandle::Card(i) => state.cards().get(*i).map(|c| c.date_text.clone()),
            _ => None,
        })
    }

    async fn thumbnail_count(&self, card: &FakeHandle) -> Result<usize, ScraperError> {
        let state = self.state();
        Ok(match card {
            FakeHandle::Card(i) => state.cards().get(*i).map_or(0, |c| c.photos.len()),
            _ => 0,
        })
    }

    async fn visible_count(&self, unit: VisibleUnit) -> Result<usize, ScraperError> {
        let state = self.state();
        let visible = state.revealed.min(state.cards().len());
        Ok(match unit {
            VisibleUnit::Cards => visible,
            VisibleUnit::Photos => state.cards()[..visible]
                .iter()
                .map(|c| c.photos.len())
                .sum(),
        })
    }

    async fn find_affordance(
        &self,
        role: Affordance,
        scope: Option<&FakeHandle>,
    ) -> Result<Option<FakeHandle>, ScraperError> {
        let mut state = self.state();
        if role == Affordance::Download && state.hidden_download_left > 0 {
            state.hidden_download_left -= 1;
            return Ok(None);
        }
        let found = match role {
            Affordance::Thumbnail => match scope {
                Some(FakeHandle::Card(i)) => state
                    .cards()
                    .get(*i)
                    .filter(|c| !c.photos.is_empty())
                    .map(|_| FakeHandle::Thumbnail(*i)),
                _ => None,
            },
            Affordance::Download => state
                .viewer_photo()
                .filter(|(_, behavior)| *behavior != FakeDownload::NoButton)
                .map(|_| FakeHandle::Download),
            Affordance::Forward => state.has_next().then_some(FakeHandle::Forward),
            Affordance::Close => state.viewer.map(|_| FakeHandle::Close),
            Affordance::ShowMore => None,
            Affordance::LoadOlder => {
                (state.revealed < state.cards().len()).then_some(FakeHandle::LoadOlder)
            }
        };
        Ok(found)
    }

    async fn scroll_into_view(&self, _target: &FakeHandle) -> Result<(), ScraperError> {
        Ok(())
    }

    async fn click(&self, target: &FakeHandle) -> Result<(), ScraperError> {
        let mut state = self.state();
        match *target {
            FakeHandle::Card(_) => {}
            FakeHandle::Thumbnail(card) => {
                state.viewer = Some((card, 0));
                state.hidden_download_left = state.late_download;
                state.hidden_image_left = state.blank_image;
            }
            FakeHandle::Download => {
                let Some((src, behavior)) = state.viewer_photo().cloned() else {
                    return Err(ScraperError::ElementNotFound("download".into()));
                };
                if behavior == FakeDownload::Writes {
                    state.downloads += 1;
                    let name = format!("IMG_{:04}.jpg", state.downloads);
                    std::fs::write(self.watch_dir.join(name), src)?;
                }
            }
            FakeHandle::Forward => {
                state.forward_clicks += 1;
                if let Some((card, photo)) = state.viewer {
                    let len = state.cards()[card].photos.len();
                    if state.stuck_forward {
                        // 変化なし
                    } else if photo + 1 < len {
                        state.viewer = Some((card, photo + 1));
                    } else if state.wrapping {
                        state.viewer = Some((card, 0));
                    }
                }
            }
            FakeHandle::Close => {
                state.close_attempts += 1;
                state.viewer = None;
            }
            FakeHandle::LoadOlder => state.revealed += self.page_size,
        }
        Ok(())
    }

    async fn displayed_image(&self) -> Result<Option<String>, ScraperError> {
        let mut state = self.state();
        if state.viewer.is_some() && state.hidden_image_left > 0 {
            state.hidden_image_left -= 1;
            return Ok(None);
        }
        Ok(state.viewer_photo().map(|(src, _)| src.clone()))
    }

    async fn press_escape(&self) -> Result<(), ScraperError> {
        let mut state = self.state();
        state.close_attempts += 1;
        state.viewer = None;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScraperError> {
        Ok(())
    }
}
