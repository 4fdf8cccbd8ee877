use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DiaryConfig;
use crate::error::ScraperError;

/// ログイン済みプロファイルで起動したブラウザとタブ
///
/// 終了時は必ず [`BrowserSession::close`] を呼ぶこと。
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// ブラウザを起動し、ダウンロード先を監視ディレクトリに設定する
    pub async fn launch(config: &DiaryConfig) -> Result<Self, ScraperError> {
        info!("ブラウザを初期化中...");

        let user_data_dir = Self::profile_dir(config)?;

        // ダウンロードディレクトリを作成
        let watch_dir = config.watch_dir();
        std::fs::create_dir_all(&watch_dir)?;
        let watch_dir = watch_dir.canonicalize().unwrap_or(watch_dir);

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(1280, 900)
            .request_timeout(Duration::from_secs(60));

        if let Some(executable) = Self::executable(config) {
            builder = builder.chrome_executable(executable);
        }

        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ブラウザ設定エラー: {}", e)))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ブラウザイベントハンドラをバックグラウンドで実行
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = match Self::prepare_page(&browser, &watch_dir).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    debug!("Failed to close browser after init error: {}", close_err);
                }
                handler.abort();
                return Err(e);
            }
        };

        info!("ブラウザ初期化完了 (downloads -> {:?})", watch_dir);
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    fn profile_dir(config: &DiaryConfig) -> Result<PathBuf, ScraperError> {
        match &config.browser_profile_path {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(ScraperError::BrowserInit(format!(
                "ブラウザプロファイルが見つかりません: {}",
                path.display()
            ))),
            None => {
                // ユニークな使い捨てプロファイル
                let unique_id = format!(
                    "{}-{}",
                    std::process::id(),
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_nanos()
                );
                let dir = std::env::temp_dir().join(format!("diary-photos-{}", unique_id));
                warn!(
                    "No browser profile configured, using {:?}; log in manually in the opened window",
                    dir
                );
                Ok(dir)
            }
        }
    }

    fn executable(config: &DiaryConfig) -> Option<PathBuf> {
        config.chrome_executable.clone().or_else(|| {
            std::env::var("CHROME_PATH")
                .or_else(|_| std::env::var("CHROMIUM_PATH"))
                .ok()
                .map(PathBuf::from)
        })
    }

    async fn prepare_page(browser: &Browser, watch_dir: &Path) -> Result<Page, ScraperError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // 元のファイル名のまま監視ディレクトリへ保存させる
        let download_params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(watch_dir.to_string_lossy().to_string())
            .events_enabled(true)
            .build()
            .map_err(|e| ScraperError::BrowserInit(format!("ダウンロード設定エラー: {}", e)))?;

        page.execute(download_params)
            .await
            .map_err(|e| ScraperError::BrowserInit(format!("ダウンロード設定エラー: {}", e)))?;

        Ok(page)
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// ブラウザを終了する。失敗してもログに残すだけ。
    pub async fn close(mut self) {
        info!("ブラウザを終了中...");

        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to wait for browser exit: {}", e);
        }
        self.handler.abort();

        info!("ブラウザ終了完了");
    }
}
