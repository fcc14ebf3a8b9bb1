use chrono::NaiveDate;
use thiserror::Error;

/// レポート処理中に発生する、既定値へ置き換えて回復できるエラー。
#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid date: {0:?}")]
    UnparsableDate(String),

    #[error("both from and to dates are required")]
    MissingDate,

    #[error("unknown period: {0:?}")]
    UnknownPeriod(String),

    #[error("overtime cycle is not configured")]
    OvertimeNotConfigured,

    #[error("series cover different periods")]
    PeriodMismatch,
}
