//! 操作対象ごとのセレクタ候補
//!
//! 日誌アプリのDOM構造は安定していないため、役割ごとに複数の探し方を優先順に並べ、
//! 最初に見つかったものを使う。

use crate::diary::{Affordance, VisibleUnit};

/// 要素の探し方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// CSSセレクタに一致する表示中の要素
    Css(&'static str),
    /// CSSセレクタに一致し、指定テキストを含む表示中の要素
    CssWithText {
        css: &'static str,
        text: &'static str,
    },
    /// SVG の path 形状で識別するボタン（非表示クラスが付いていても対象にする）
    SvgPathButton(&'static str),
}

impl Matcher {
    /// 候補要素を集めるセレクタ
    pub fn css(&self) -> &'static str {
        match self {
            Matcher::Css(css) => css,
            Matcher::CssWithText { css, .. } => css,
            Matcher::SvgPathButton(_) => "button",
        }
    }
}

pub const DATE_CARD: &str = "div.card.p-3.mb-3";
pub const CARD_DATE: &str = ".text-muted";
pub const THUMBNAIL: &str = ".e3-image-thumbnail";

/// 「次へ」矢印アイコンの path
const FORWARD_ARROW_PATH: &str = "M8.59,16.58L13.17,12";

const THUMBNAIL_MATCHERS: &[Matcher] = &[Matcher::Css(THUMBNAIL)];

const DOWNLOAD_MATCHERS: &[Matcher] = &[
    Matcher::Css(".mdi-download"),
    Matcher::Css("[aria-label*='download' i]"),
    Matcher::Css("button[title*='download' i]"),
];

const FORWARD_MATCHERS: &[Matcher] = &[
    Matcher::SvgPathButton(FORWARD_ARROW_PATH),
    Matcher::Css(".mdi-chevron-right"),
    Matcher::Css(".mdi-arrow-right"),
    Matcher::Css("[aria-label*='next' i]"),
    Matcher::Css("button[title*='next' i]"),
];

const CLOSE_MATCHERS: &[Matcher] = &[
    Matcher::Css(".mdi-close"),
    Matcher::Css("[aria-label='close']"),
    Matcher::Css("button.close"),
    Matcher::Css(".modal-close"),
];

const SHOW_MORE_MATCHERS: &[Matcher] = &[Matcher::CssWithText {
    css: "button",
    text: "Kuva rohkem",
}];

const LOAD_OLDER_MATCHERS: &[Matcher] = &[
    Matcher::CssWithText {
        css: "button.position-relative",
        text: "Vaata vanemaid",
    },
    Matcher::CssWithText {
        css: "button",
        text: "Vaata vanemaid",
    },
];

/// 役割ごとの探し方（優先順）
pub fn matchers(role: Affordance) -> &'static [Matcher] {
    match role {
        Affordance::Thumbnail => THUMBNAIL_MATCHERS,
        Affordance::Download => DOWNLOAD_MATCHERS,
        Affordance::Forward => FORWARD_MATCHERS,
        Affordance::Close => CLOSE_MATCHERS,
        Affordance::ShowMore => SHOW_MORE_MATCHERS,
        Affordance::LoadOlder => LOAD_OLDER_MATCHERS,
    }
}

pub fn unit_selector(unit: VisibleUnit) -> &'static str {
    match unit {
        VisibleUnit::Photos => THUMBNAIL,
        VisibleUnit::Cards => DATE_CARD,
    }
}

/// ビューアの拡大画像の候補（優先順）
const VIEWER_IMAGES: &[&str] = &[
    "img.e3-img-full",
    ".modal img",
    ".photo-viewer img",
    "img[style*='display: block']",
    "img:not(.e3-image-thumbnail)",
];

/// これより低い画像はサムネイルとみなす
const MIN_VIEWER_IMAGE_HEIGHT: u32 = 100;

/// デバッグ時に矢印候補を列挙するセレクタ
pub const ARROW_PROBE: &str =
    "button, i[class*='mdi'], div[class*='arrow'], span[class*='arrow']";

/// 要素が表示されているか（`this` = 要素）
pub const IS_VISIBLE_FN: &str = r#"
function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0 &&
           style.display !== 'none' && style.visibility !== 'hidden';
}
"#;

/// `matcher` を満たすかを判定する関数宣言（`this` = 候補要素）
pub fn check_fn(matcher: &Matcher) -> Result<String, serde_json::Error> {
    Ok(match matcher {
        Matcher::Css(_) => IS_VISIBLE_FN.to_string(),
        Matcher::CssWithText { text, .. } => format!(
            r#"
            function() {{
                const visible = ({visible}).call(this);
                return visible && (this.innerText || '').includes({text});
            }}
            "#,
            visible = IS_VISIBLE_FN.trim(),
            text = serde_json::to_string(text)?,
        ),
        Matcher::SvgPathButton(prefix) => format!(
            r#"
            function() {{
                const path = this.querySelector('svg path');
                const d = path ? (path.getAttribute('d') || '') : '';
                return d.includes({prefix});
            }}
            "#,
            prefix = serde_json::to_string(prefix)?,
        ),
    })
}

/// 表示中の拡大画像の `src` を返すスクリプト（なければ `null`）
pub fn displayed_image_script() -> Result<String, serde_json::Error> {
    Ok(format!(
        r#"
        (function() {{
            const selectors = {selectors};
            for (const selector of selectors) {{
                for (const img of document.querySelectorAll(selector)) {{
                    const rect = img.getBoundingClientRect();
                    const style = window.getComputedStyle(img);
                    if (style.display === 'none' || style.visibility === 'hidden') continue;
                    if (rect.height <= {min_height}) continue;
                    const src = img.currentSrc || img.src || '';
                    if (src.startsWith('http')) return src;
                }}
            }}
            return null;
        }})()
        "#,
        selectors = serde_json::to_string(VIEWER_IMAGES)?,
        min_height = MIN_VIEWER_IMAGE_HEIGHT,
    ))
}
