use std::future::{self, Future};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tower::Service;
use tracing::{info, warn};

use crate::browser::{BrowserSession, ChromePage};
use crate::config::DiaryConfig;
use crate::diary::{DiaryTraversal, DownloadWatcher, RunTally};
use crate::error::ScraperError;

/// ダウンロードリクエスト
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub config: DiaryConfig,
}

impl DownloadRequest {
    pub fn new(config: DiaryConfig) -> Self {
        Self { config }
    }
}

impl From<DiaryConfig> for DownloadRequest {
    fn from(config: DiaryConfig) -> Self {
        Self::new(config)
    }
}

/// 実行結果
#[derive(Debug, Clone)]
pub struct DownloadSummary {
    pub tally: RunTally,
    pub elapsed: Duration,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.tally.total()
    }
}

/// 中断シグナルを待つ。ハンドラを登録できなければ中断しない。
async fn interrupted(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!("Failed to listen for Ctrl-C, running without interrupt support: {}", e);
        future::pending::<()>().await;
    }
}

/// tower::Serviceを実装した写真ダウンロードサービス
///
/// ブラウザの起動から終了までを1リクエストで行う。Ctrl-C を受けた場合は
/// `ScraperError::Cancelled` を返すが、その場合もブラウザは必ず閉じる。
#[derive(Debug, Clone, Default)]
pub struct DiaryService {}

impl DiaryService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Service<DownloadRequest> for DiaryService {
    type Response = DownloadSummary;
    type Error = ScraperError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DownloadRequest) -> Self::Future {
        info!(
            "ダウンロードリクエスト受信: children={}",
            req.config.children.len()
        );

        Box::pin(async move {
            let config = req.config;
            config.validate()?;

            let start = Instant::now();
            let session = BrowserSession::launch(&config).await?;

            let page = ChromePage::new(session.page().clone(), &config);
            let watcher = DownloadWatcher::from_config(&config);
            let traversal = DiaryTraversal::new(&page, &watcher, &config);

            let outcome = tokio::select! {
                tally = traversal.run() => Ok(tally),
                _ = interrupted(tokio::signal::ctrl_c()) => Err(ScraperError::Cancelled),
            };

            session.close().await;

            let summary = DownloadSummary {
                tally: outcome?,
                elapsed: start.elapsed(),
            };
            info!(
                "ダウンロード完了: {} photos in {:.1}s",
                summary.total(),
                summary.elapsed.as_secs_f64()
            );
            Ok(summary)
        })
    }
}
