//! 「Kuva rohkem」「Vaata vanemaid päevikuid」を押してページを展開する

use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::{DiaryConfig, Timing};
use crate::error::ScraperError;
use crate::traits::DiaryPage;

use super::types::{Affordance, VisibleUnit};

/// 展開ループを終えた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 増加が止まり、古い日誌を読み込むボタンもない
    FixedPoint,
    /// ラウンド上限に達した
    RoundLimit,
}

/// 1回の展開の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionReport {
    pub rounds: u32,
    /// 開始時の表示数
    pub initial: usize,
    /// 終了時の表示数
    pub visible: usize,
    pub stop: StopReason,
}

impl ExpansionReport {
    pub fn revealed_more(&self) -> bool {
        self.visible > self.initial
    }
}

/// ページ展開ドライバ
///
/// 非同期描画の完了は観測できないため、停止条件は「増加なし かつ 読み込みボタンなし」
/// とラウンド上限の組み合わせによる経験則。
pub struct Paginator<'a, P: DiaryPage> {
    page: &'a P,
    unit: VisibleUnit,
    max_rounds: u32,
    max_show_more_clicks: u32,
    timing: &'a Timing,
}

impl<'a, P: DiaryPage> Paginator<'a, P> {
    pub fn new(
        page: &'a P,
        unit: VisibleUnit,
        max_rounds: u32,
        max_show_more_clicks: u32,
        timing: &'a Timing,
    ) -> Self {
        Self {
            page,
            unit,
            max_rounds,
            max_show_more_clicks,
            timing,
        }
    }

    pub fn from_config(page: &'a P, config: &'a DiaryConfig) -> Self {
        Self::new(
            page,
            config.expansion_unit,
            config.max_scroll_attempts,
            config.max_show_more_clicks,
            &config.timing,
        )
    }

    pub async fn expand(&self) -> Result<ExpansionReport, ScraperError> {
        let initial = self.page.visible_count(self.unit).await?;
        let mut previous = initial;

        for round in 1..=self.max_rounds {
            let clicks = self.exhaust_show_more().await?;
            let visible = self.page.visible_count(self.unit).await?;
            debug!(
                "Expansion round {}/{}: {} visible ({:?}), {} show-more clicks",
                round, self.max_rounds, visible, self.unit, clicks
            );

            if visible == previous {
                if !self.load_older().await? {
                    return Ok(ExpansionReport {
                        rounds: round,
                        initial,
                        visible,
                        stop: StopReason::FixedPoint,
                    });
                }
                continue;
            }

            previous = visible;
            self.page.scroll_to_bottom().await?;
            sleep(self.timing.wait_time).await;
        }

        // 最後のラウンドで読み込んだ分も数える
        let visible = self.page.visible_count(self.unit).await?;
        info!(
            "Stopped expanding after {} rounds ({} visible)",
            self.max_rounds, visible
        );
        Ok(ExpansionReport {
            rounds: self.max_rounds,
            initial,
            visible,
            stop: StopReason::RoundLimit,
        })
    }

    /// 「Kuva rohkem」が消えるまで押す。押した回数を返す。
    async fn exhaust_show_more(&self) -> Result<u32, ScraperError> {
        let mut clicks = 0;
        while clicks < self.max_show_more_clicks {
            let Some(button) = self.page.find_affordance(Affordance::ShowMore, None).await? else {
                break;
            };
            if !self.press(&button, self.timing.show_more_settle).await {
                break;
            }
            clicks += 1;
            info!("Clicked 'Kuva rohkem' ({})", clicks);
        }
        Ok(clicks)
    }

    /// 古い日誌の読み込みボタンを押す。ボタンがなければ `false`。
    async fn load_older(&self) -> Result<bool, ScraperError> {
        let Some(button) = self.page.find_affordance(Affordance::LoadOlder, None).await? else {
            return Ok(false);
        };
        if !self.press(&button, self.timing.load_older_settle).await {
            return Ok(false);
        }
        info!("Loading older diary entries...");
        Ok(true)
    }

    async fn press(&self, button: &P::Handle, settle: std::time::Duration) -> bool {
        if let Err(e) = self.page.scroll_into_view(button).await {
            debug!("Scroll into view failed: {}", e);
        }
        sleep(self.timing.scroll_settle).await;
        if let Err(e) = self.page.click(button).await {
            debug!("Click failed: {}", e);
            return false;
        }
        sleep(settle).await;
        true
    }
}
