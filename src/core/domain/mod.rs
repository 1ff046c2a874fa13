//! Pure domain types shared across the crate.

mod alert;
mod market;
mod position;
mod trade;
mod wallet;

pub use alert::{
    AlertReason, AsymmetricExitDetail, ConvictionDetail, ExitTimingDetail, HedgeRemovalDetail,
    StealthDetail, TradeAlert,
};
pub use market::MarketInfo;
pub use position::{ActivityEntry, ClosedPosition, Position};
pub use trade::{is_contrarian_price, Side, TradeEvent};
pub use wallet::WalletStats;
