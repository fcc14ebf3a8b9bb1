use chrono::{Local, NaiveDate};

#[cfg(not(test))]
/// Localタイムゾーンでの今日の日付を取得する。
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// テスト時に利用するモックの日付を取得する。
#[cfg(test)]
pub mod mock_datetime {
    use std::cell::RefCell;

    use super::Local;
    use super::NaiveDate;

    thread_local! {
        static MOCK_TODAY: RefCell<Option<NaiveDate>> = RefCell::new(None);
    }

    /// モックの日付を取得する。設定されていなければ今日の日付を返す。
    pub fn today() -> NaiveDate {
        MOCK_TODAY.with(|cell| {
            cell.borrow()
                .as_ref()
                .cloned()
                .unwrap_or_else(|| Local::now().date_naive())
        })
    }

    /// モックの日付を設定する。
    pub fn set_mock_today(day: NaiveDate) {
        MOCK_TODAY.with(|cell| *cell.borrow_mut() = Some(day));
    }

    // 設定したモックの日付をクリアする。
    pub fn clear_mock_today() {
        MOCK_TODAY.with(|cell| *cell.borrow_mut() = None);
    }
}

#[cfg(test)]
pub use mock_datetime::today;
