//! chromiumoxide による `DiaryPage` 実装

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::debug;

use crate::config::DiaryConfig;
use crate::diary::{Affordance, VisibleUnit};
use crate::error::ScraperError;
use crate::traits::DiaryPage;

use super::locator::{self, Matcher};

/// ページ読み込み完了の待機上限（秒）
const PAGE_LOAD_TIMEOUT_SECS: u64 = 10;

/// 認証済みタブ1つを操作する
pub struct ChromePage {
    page: Page,
    debug: bool,
    wait_time: Duration,
}

impl ChromePage {
    pub fn new(page: Page, config: &DiaryConfig) -> Self {
        Self {
            page,
            debug: config.debug,
            wait_time: config.timing.wait_time,
        }
    }

    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T, ScraperError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    /// 要素を `this` として関数を実行し、真偽値を返す
    async fn element_bool(element: &Element, function: &str) -> Result<bool, ScraperError> {
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn query(
        &self,
        css: &str,
        scope: Option<&Element>,
    ) -> Result<Vec<Element>, ScraperError> {
        let found = match scope {
            Some(element) => element.find_elements(css).await,
            None => self.page.find_elements(css).await,
        };
        found.map_err(|e| ScraperError::ElementNotFound(format!("{}: {}", css, e)))
    }

    async fn try_matcher(
        &self,
        matcher: &Matcher,
        scope: Option<&Element>,
    ) -> Result<Option<Element>, ScraperError> {
        let check = locator::check_fn(matcher)?;
        for candidate in self.query(matcher.css(), scope).await? {
            if Self::element_bool(&candidate, &check).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn wait_for_load(&self) -> Result<(), ScraperError> {
        for i in 0..PAGE_LOAD_TIMEOUT_SECS {
            let state: String = self
                .evaluate("document.readyState")
                .await
                .unwrap_or_default();
            if state == "complete" {
                debug!("Page load complete after {}s", i);
                return Ok(());
            }
            sleep(Duration::from_secs(1)).await;
        }
        Err(ScraperError::Timeout(format!(
            "ページが{}秒以内に読み込まれませんでした",
            PAGE_LOAD_TIMEOUT_SECS
        )))
    }

    /// デバッグ用に矢印らしい要素を列挙する
    async fn log_arrow_candidates(&self) {
        let script = format!(
            r#"
            (function() {{
                const found = [];
                for (const el of document.querySelectorAll({probe})) {{
                    const cls = el.getAttribute('class') || '';
                    if (/arrow|chevron|next/.test(cls)) found.push(el.tagName + ': ' + cls);
                }}
                return found.slice(0, 10).join(' | ');
            }})()
            "#,
            probe = serde_json::to_string(locator::ARROW_PROBE).unwrap_or_default(),
        );
        let candidates: String = self.evaluate(&script).await.unwrap_or_default();
        debug!("Arrow-like candidates: {}", candidates);
    }

    async fn log_screenshot(&self) {
        if let Ok(screenshot) = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("Screenshot: data:image/png;base64,{}", encoded);
        }
    }
}

#[async_trait]
impl DiaryPage for ChromePage {
    type Handle = Element;

    async fn navigate(&self, url: &str) -> Result<(), ScraperError> {
        let result: Result<(), ScraperError> = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| ScraperError::Navigation(e.to_string()))?;
            self.wait_for_load().await?;
            sleep(self.wait_time).await;

            let current = self
                .page
                .url()
                .await
                .map_err(|e| ScraperError::Navigation(e.to_string()))?
                .unwrap_or_default();
            if current.contains("/login") {
                return Err(ScraperError::Navigation(format!(
                    "ログインページへリダイレクトされました: {}",
                    current
                )));
            }
            Ok(())
        }
        .await;

        if result.is_err() && self.debug {
            self.log_screenshot().await;
        }
        result
    }

    async fn date_cards(&self) -> Result<Vec<Element>, ScraperError> {
        self.query(locator::DATE_CARD, None).await
    }

    async fn card_date_text(&self, card: &Element) -> Result<Option<String>, ScraperError> {
        let label = match card.find_element(locator::CARD_DATE).await {
            Ok(label) => label,
            Err(_) => return Ok(None),
        };
        label
            .inner_text()
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))
    }

    async fn thumbnail_count(&self, card: &Element) -> Result<usize, ScraperError> {
        Ok(self.query(locator::THUMBNAIL, Some(card)).await?.len())
    }

    async fn visible_count(&self, unit: VisibleUnit) -> Result<usize, ScraperError> {
        let script = format!(
            "document.querySelectorAll({}).length",
            serde_json::to_string(locator::unit_selector(unit))?
        );
        self.evaluate(&script).await
    }

    async fn find_affordance(
        &self,
        role: Affordance,
        scope: Option<&Element>,
    ) -> Result<Option<Element>, ScraperError> {
        for matcher in locator::matchers(role) {
            match self.try_matcher(matcher, scope).await {
                Ok(Some(element)) => {
                    debug!("Found {} via {:?}", role, matcher);
                    return Ok(Some(element));
                }
                Ok(None) => {}
                Err(e) => debug!("Matcher {:?} for {} failed: {}", matcher, role, e),
            }
        }

        if self.debug && role == Affordance::Forward {
            self.log_arrow_candidates().await;
        }
        Ok(None)
    }

    async fn scroll_into_view(&self, target: &Element) -> Result<(), ScraperError> {
        target
            .call_js_fn("function() { this.scrollIntoView(true); }", false)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(())
    }

    async fn click(&self, target: &Element) -> Result<(), ScraperError> {
        target
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(())
    }

    async fn displayed_image(&self) -> Result<Option<String>, ScraperError> {
        let script = locator::displayed_image_script()?;
        match self.evaluate::<Option<String>>(&script).await {
            Ok(src) => Ok(src),
            Err(e) => {
                debug!("Could not read displayed image: {}", e);
                Ok(None)
            }
        }
    }

    async fn press_escape(&self) -> Result<(), ScraperError> {
        self.page
            .find_element("body")
            .await
            .map_err(|e| ScraperError::ElementNotFound(format!("body: {}", e)))?
            .press_key("Escape")
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScraperError> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        Ok(())
    }
}
