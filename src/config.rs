use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::diary::VisibleUnit;
use crate::error::ScraperError;

/// 対象の子供
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChildTarget {
    /// 日誌アプリ側の子供ID
    pub id: String,
    /// 表示名（ログ用）
    pub name: String,
    /// 保存先フォルダ名
    pub folder_name: String,
}

impl ChildTarget {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        folder_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            folder_name: folder_name.into(),
        }
    }
}

/// 待機時間の設定（JSONでは秒単位の小数）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Timing {
    #[serde(deserialize_with = "secs")]
    pub wait_time: Duration,
    #[serde(deserialize_with = "secs")]
    pub initial_load_delay: Duration,
    #[serde(deserialize_with = "secs")]
    pub scroll_settle: Duration,
    #[serde(deserialize_with = "secs")]
    pub viewer_settle: Duration,
    #[serde(deserialize_with = "secs")]
    pub advance_settle: Duration,
    #[serde(deserialize_with = "secs")]
    pub show_more_settle: Duration,
    #[serde(deserialize_with = "secs")]
    pub load_older_settle: Duration,
    #[serde(deserialize_with = "secs")]
    pub close_settle: Duration,
    #[serde(deserialize_with = "secs")]
    pub download_timeout: Duration,
    #[serde(deserialize_with = "secs")]
    pub download_poll_interval: Duration,
    #[serde(deserialize_with = "secs")]
    pub advance_timeout: Duration,
    #[serde(deserialize_with = "secs")]
    pub advance_poll_interval: Duration,
    /// ビューアのボタンが現れるまでの待機上限
    #[serde(deserialize_with = "secs")]
    pub affordance_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(3),
            initial_load_delay: Duration::from_secs(5),
            scroll_settle: Duration::from_millis(500),
            viewer_settle: Duration::from_secs(1),
            advance_settle: Duration::from_millis(500),
            show_more_settle: Duration::from_secs(2),
            load_older_settle: Duration::from_secs(3),
            close_settle: Duration::from_millis(500),
            download_timeout: Duration::from_secs(10),
            download_poll_interval: Duration::from_millis(500),
            advance_timeout: Duration::from_secs(5),
            advance_poll_interval: Duration::from_millis(300),
            affordance_timeout: Duration::from_secs(10),
        }
    }
}

impl Timing {
    /// 全ての待機を同じ短い値にする（テスト用）
    pub fn uniform(settle: Duration, timeout: Duration, poll: Duration) -> Self {
        Self {
            wait_time: settle,
            initial_load_delay: settle,
            scroll_settle: settle,
            viewer_settle: settle,
            advance_settle: settle,
            show_more_settle: settle,
            load_older_settle: settle,
            close_settle: settle,
            download_timeout: timeout,
            download_poll_interval: poll,
            advance_timeout: timeout,
            advance_poll_interval: poll,
            affordance_timeout: timeout,
        }
    }
}

/// ダウンロード成果物の判定ルール
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DownloadRules {
    /// 完了したファイルの拡張子
    pub final_extensions: Vec<String>,
    /// ダウンロード途中のファイルの拡張子
    pub partial_extensions: Vec<String>,
}

impl Default for DownloadRules {
    fn default() -> Self {
        Self {
            final_extensions: vec!["jpg".into(), "jpeg".into()],
            partial_extensions: vec!["part".into(), "crdownload".into(), "tmp".into()],
        }
    }
}

/// 実行全体の設定。起動時に一度読み込み、各コンポーネントへ参照で渡す。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiaryConfig {
    pub children: Vec<ChildTarget>,
    /// 整理済み写真の保存先
    pub download_path: PathBuf,
    /// ブラウザのダウンロード先（監視ディレクトリ）
    pub browser_download_dir: Option<PathBuf>,
    #[serde(alias = "firefox_profile_path")]
    pub browser_profile_path: Option<PathBuf>,
    pub chrome_executable: Option<PathBuf>,
    pub base_url: String,
    pub headless: bool,
    #[serde(alias = "debug_mode")]
    pub debug: bool,
    pub max_scroll_attempts: u32,
    pub max_show_more_clicks: u32,
    pub expansion_unit: VisibleUnit,
    pub timing: Timing,
    pub download: DownloadRules,
    /// 旧形式の `wait_time`（トップレベル）
    #[serde(default, deserialize_with = "opt_secs", rename = "wait_time")]
    legacy_wait_time: Option<Duration>,
}

impl Default for DiaryConfig {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            download_path: PathBuf::from("downloads"),
            browser_download_dir: None,
            browser_profile_path: None,
            chrome_executable: None,
            base_url: "https://eliis.eu".to_string(),
            headless: false,
            debug: false,
            max_scroll_attempts: 10,
            max_show_more_clicks: 50,
            expansion_unit: VisibleUnit::Cards,
            timing: Timing::default(),
            download: DownloadRules::default(),
            legacy_wait_time: None,
        }
    }
}

impl DiaryConfig {
    pub fn new(children: Vec<ChildTarget>) -> Self {
        Self {
            children,
            ..Default::default()
        }
    }

    /// JSON文字列から読み込んで検証する
    pub fn from_json(json: &str) -> Result<Self, ScraperError> {
        let mut config: DiaryConfig = serde_json::from_str(json)?;
        if let Some(wait) = config.legacy_wait_time.take() {
            config.timing.wait_time = wait;
        }
        config.validate()?;
        Ok(config)
    }

    /// 設定ファイルを読み込む
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScraperError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("{} を読み込めません: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = path.into();
        self
    }

    pub fn with_browser_download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_download_dir = Some(path.into());
        self
    }

    pub fn with_profile(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_profile_path = Some(path.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_max_scroll_attempts(mut self, rounds: u32) -> Self {
        self.max_scroll_attempts = rounds;
        self
    }

    pub fn with_expansion_unit(mut self, unit: VisibleUnit) -> Self {
        self.expansion_unit = unit;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// 指定IDの子供だけに絞る（設定順は維持）
    pub fn retain_children(&mut self, ids: &[String]) {
        if !ids.is_empty() {
            self.children.retain(|c| ids.contains(&c.id));
        }
    }

    /// ブラウザのダウンロード監視ディレクトリ
    pub fn watch_dir(&self) -> PathBuf {
        self.browser_download_dir
            .clone()
            .unwrap_or_else(|| self.download_path.join(".incoming"))
    }

    /// 子供の日誌ページURL
    pub fn diary_url(&self, child: &ChildTarget) -> String {
        format!(
            "{}/child/{}/diary",
            self.base_url.trim_end_matches('/'),
            child.id
        )
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.children.is_empty() {
            return Err(ScraperError::Config("children が空です".into()));
        }
        for child in &self.children {
            if child.id.trim().is_empty() {
                return Err(ScraperError::Config(format!(
                    "子供 '{}' のIDが空です",
                    child.name
                )));
            }
            if !is_safe_folder_name(&child.folder_name) {
                return Err(ScraperError::Config(format!(
                    "folder_name '{}' はフォルダ名として使えません",
                    child.folder_name
                )));
            }
        }
        if self.max_scroll_attempts == 0 || self.max_show_more_clicks == 0 {
            return Err(ScraperError::Config(
                "max_scroll_attempts / max_show_more_clicks は1以上が必要です".into(),
            ));
        }
        let t = &self.timing;
        for (name, poll, timeout) in [
            ("download_poll_interval", t.download_poll_interval, t.download_timeout),
            ("advance_poll_interval", t.advance_poll_interval, t.advance_timeout),
            ("advance_poll_interval", t.advance_poll_interval, t.affordance_timeout),
        ] {
            if poll.is_zero() || poll > timeout {
                return Err(ScraperError::Config(format!(
                    "{} は0より大きく、タイムアウト以下である必要があります",
                    name
                )));
            }
        }
        if self.download.final_extensions.is_empty() {
            return Err(ScraperError::Config(
                "download.final_extensions が空です".into(),
            ));
        }
        Ok(())
    }
}

fn is_safe_folder_name(name: &str) -> bool {
    if name.trim().is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(value).map_err(serde::de::Error::custom)
}

fn opt_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Option::<f64>::deserialize(deserializer)?
        .map(|value| Duration::try_from_secs_f64(value).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_JSON: &str = r#"{
        "firefox_profile_path": "/home/me/.mozilla/firefox/abc.default",
        "download_path": "pildid",
        "wait_time": 2,
        "max_scroll_attempts": 4,
        "debug_mode": true,
        "children": [
            {"id": "123", "name": "Mia", "folder_name": "Mia"},
            {"id": "456", "name": "Oskar", "folder_name": "Oskar"}
        ]
    }"#;

    #[test]
    fn test_legacy_keys_are_accepted() {
        let config = DiaryConfig::from_json(LEGACY_JSON).unwrap();

        assert_eq!(
            config.browser_profile_path,
            Some(PathBuf::from("/home/me/.mozilla/firefox/abc.default"))
        );
        assert_eq!(config.download_path, PathBuf::from("pildid"));
        assert_eq!(config.timing.wait_time, Duration::from_secs(2));
        assert_eq!(config.max_scroll_attempts, 4);
        assert!(config.debug);
        assert_eq!(config.children.len(), 2);
        assert_eq!(config.children[1].folder_name, "Oskar");
    }

    #[test]
    fn test_defaults() {
        let config = DiaryConfig::from_json(
            r#"{"children": [{"id": "1", "name": "A", "folder_name": "A"}]}"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://eliis.eu");
        assert_eq!(config.max_scroll_attempts, 10);
        assert_eq!(config.expansion_unit, VisibleUnit::Cards);
        assert_eq!(config.timing.download_timeout, Duration::from_secs(10));
        assert_eq!(config.timing.advance_timeout, Duration::from_secs(5));
        assert_eq!(config.watch_dir(), PathBuf::from("downloads/.incoming"));
        assert!(!config.headless);
    }

    #[test]
    fn test_fractional_timing() {
        let config = DiaryConfig::from_json(
            r#"{
                "children": [{"id": "1", "name": "A", "folder_name": "A"}],
                "timing": {"download_poll_interval": 0.25, "advance_timeout": 1.5}
            }"#,
        )
        .unwrap();

        assert_eq!(config.timing.download_poll_interval, Duration::from_millis(250));
        assert_eq!(config.timing.advance_timeout, Duration::from_millis(1500));
        assert_eq!(config.timing.viewer_settle, Duration::from_secs(1));
        assert_eq!(config.timing.affordance_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_empty_children() {
        let err = DiaryConfig::from_json(r#"{"children": []}"#).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_rejects_unsafe_folder_names() {
        for name in ["", "..", "a/b", "a\\b", "."] {
            let config = DiaryConfig::new(vec![ChildTarget::new("1", "A", name)]);
            assert!(config.validate().is_err(), "accepted {:?}", name);
        }
        let config = DiaryConfig::new(vec![ChildTarget::new("1", "A", "Mia Maasikas")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_poll_longer_than_timeout() {
        let mut config = DiaryConfig::new(vec![ChildTarget::new("1", "A", "A")]);
        config.timing.advance_poll_interval = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_diary_url_and_child_filter() {
        let mut config = DiaryConfig::new(vec![
            ChildTarget::new("1", "A", "A"),
            ChildTarget::new("2", "B", "B"),
            ChildTarget::new("3", "C", "C"),
        ])
        .with_base_url("https://example.test/");

        assert_eq!(
            config.diary_url(&config.children[1]),
            "https://example.test/child/2/diary"
        );

        config.retain_children(&["3".to_string(), "1".to_string()]);
        let ids: Vec<_> = config.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn test_config_builder() {
        let config = DiaryConfig::new(vec![ChildTarget::new("1", "A", "A")])
            .with_headless(true)
            .with_download_path("/tmp/photos")
            .with_browser_download_dir("/tmp/incoming")
            .with_max_scroll_attempts(3);

        assert!(config.headless);
        assert_eq!(config.download_path, PathBuf::from("/tmp/photos"));
        assert_eq!(config.watch_dir(), PathBuf::from("/tmp/incoming"));
        assert_eq!(config.max_scroll_attempts, 3);
    }
}
