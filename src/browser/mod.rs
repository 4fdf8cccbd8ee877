//! ブラウザ (Chrome DevTools Protocol) 側の実装

pub mod locator;
mod page;
mod session;

pub use page::ChromePage;
pub use session::BrowserSession;
