pub mod audit_window;
pub mod candle;
pub mod events;
pub mod gap;
pub mod timeframe;

pub use audit_window::{AuditWindow, AuditWindowError};
pub use candle::{Candle, CandleValidationError};
pub use events::{EventKind, MarketDataEvent};
pub use gap::{detect_gaps, GapAuditEntry, GapInterval, GapSeverity};
pub use timeframe::{parse_interval, Timeframe, TimeframeError};
