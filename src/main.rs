//! 日誌写真ダウンローダー CLI
//!
//! 実行方法:
//! ```
//! cargo run --bin diary-photos -- --config config.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use diary_photo_scraper::{DiaryConfig, DiaryService, DownloadRequest, ScraperError};
use tower::Service;
use tracing_subscriber::EnvFilter;

/// 子供ごとの日誌ページから写真をダウンロードする
#[derive(Debug, Parser)]
#[command(name = "diary-photos", version, about)]
struct Cli {
    /// 設定ファイル (JSON)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// デバッグログと失敗時のスクリーンショットを有効にする
    #[arg(long)]
    debug: bool,

    /// ブラウザを表示せずに実行する
    #[arg(long)]
    headless: bool,

    /// 対象の子供ID（複数指定可、省略時は全員）
    #[arg(long = "child", value_name = "ID")]
    children: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match DiaryConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if cli.debug {
        config.debug = true;
    }
    if cli.headless {
        config.headless = true;
    }
    config.retain_children(&cli.children);
    if config.children.is_empty() {
        eprintln!("Error: no children match {:?}", cli.children);
        return ExitCode::FAILURE;
    }

    // ログ設定
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    println!("=== Diary Photo Downloader ===");
    println!("Config: {}", cli.config.display());
    println!("Children: {}", config.children.len());
    println!("Save to: {}", config.download_path.display());
    println!("Headless: {}", config.headless);
    println!();

    let mut service = DiaryService::new();
    match service.call(DownloadRequest::new(config)).await {
        Ok(summary) => {
            println!();
            println!("=== Download Result ===");
            for child in &summary.tally.children {
                match &child.navigation_error {
                    Some(e) => println!("  - {}: skipped ({})", child.name, e),
                    None => println!(
                        "  - {}: {} saved, {} already present, {} failed, {} dates",
                        child.name,
                        child.saved,
                        child.already_present,
                        child.failed,
                        child.dates.len()
                    ),
                }
            }
            println!("Total photos downloaded: {}", summary.total());
            println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
            ExitCode::SUCCESS
        }
        Err(ScraperError::Cancelled) => {
            println!();
            println!("Download cancelled by user");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
