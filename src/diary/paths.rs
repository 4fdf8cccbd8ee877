//! 保存先パスの決定

use std::path::PathBuf;

use crate::error::ScraperError;

use super::types::EntryDate;

/// `<base>/<folder>/<YYYY-MM-DD>/photo_<YYYYMMDD>_<NNN>.jpg` を組み立てる。
///
/// 状態は持たない。日付ディレクトリは必要に応じて作成する（既存でもエラーにしない）。
#[derive(Debug, Clone)]
pub struct PathResolver {
    base: PathBuf,
}

impl PathResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// スロット番号は1始まり
    pub fn resolve(
        &self,
        folder_name: &str,
        date: &EntryDate,
        slot: u32,
    ) -> Result<PathBuf, ScraperError> {
        let dir = self.base.join(folder_name).join(date.iso());
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(file_name(date, slot)))
    }
}

fn file_name(date: &EntryDate, slot: u32) -> String {
    format!("photo_{}_{:03}.jpg", date.compact(), slot)
}
