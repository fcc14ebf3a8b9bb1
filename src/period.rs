use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// 開始日と終了日を両端に含む期間。`start <= end`が常に成り立つ。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// 新しい`Period`を返す。開始日が終了日より後ならエラーを返す。
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ReportError> {
        if start > end {
            return Err(ReportError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// 期間に含まれる日数。
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// 期間内の日付を昇順に返す。
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |offset| start + Duration::days(offset))
    }
}

/// 基準日から求める期間の種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeriodKind {
    Week,
    Month,
    Overtime,
}

/// 前後の期間へ移動するときのモード。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavMode {
    Week,
    Month,
    Overtime,
    #[default]
    Custom,
}

impl NavMode {
    /// 境界に揃えるモードの場合、対応する期間の種類を返す。
    fn kind(self) -> Option<PeriodKind> {
        match self {
            NavMode::Week => Some(PeriodKind::Week),
            NavMode::Month => Some(PeriodKind::Month),
            NavMode::Overtime => Some(PeriodKind::Overtime),
            NavMode::Custom => None,
        }
    }
}

impl FromStr for NavMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(NavMode::Week),
            "month" | "monthly" => Ok(NavMode::Month),
            "overtime" => Ok(NavMode::Overtime),
            "custom" => Ok(NavMode::Custom),
            _ => Err(format!("unknown navigation mode: {}", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// 名前付きの期間指定。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shortcut {
    CurrentWeek,
    PreviousWeek,
    CurrentMonth,
    LastMonth,
    Overtime,
}

impl FromStr for Shortcut {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current_week" => Ok(Shortcut::CurrentWeek),
            "previous_week" => Ok(Shortcut::PreviousWeek),
            "current_month" => Ok(Shortcut::CurrentMonth),
            "last_month" => Ok(Shortcut::LastMonth),
            "overtime" => Ok(Shortcut::Overtime),
            _ => Err(format!("unknown period: {}", s)),
        }
    }
}

/// 残業集計用の周期。`anchor`から`length_days`日ごとに区切られる。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct OvertimeCycle {
    pub anchor: NaiveDate,
    pub length_days: u32,
}

impl OvertimeCycle {
    fn containing(&self, day: NaiveDate) -> Period {
        let length = i64::from(self.length_days.max(1));
        let cycles = (day - self.anchor).num_days().div_euclid(length);
        let start = self.anchor + Duration::days(cycles * length);
        Period {
            start,
            end: start + Duration::days(length - 1),
        }
    }
}

/// 期間の境界を計算する。
#[derive(Clone, Debug)]
pub struct Calendar {
    first_weekday: Weekday,
    overtime: Option<OvertimeCycle>,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(Weekday::Mon, None)
    }
}

impl Calendar {
    /// 新しい`Calendar`を返す。
    ///
    /// # Arguments
    ///
    /// * `first_weekday` - 週の始まりの曜日
    /// * `overtime` - 残業周期。設定されていない場合、残業期間は計算できない
    pub fn new(first_weekday: Weekday, overtime: Option<OvertimeCycle>) -> Self {
        Self {
            first_weekday,
            overtime,
        }
    }

    /// `day`を含む7日間の週を返す。
    pub fn week(&self, day: NaiveDate) -> Period {
        let offset = (day.weekday().num_days_from_monday() + 7
            - self.first_weekday.num_days_from_monday())
            % 7;
        let start = day - Duration::days(i64::from(offset));
        Period {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn previous_week(&self, day: NaiveDate) -> Period {
        self.week(day - Duration::days(7))
    }

    /// `day`を含む月の初日と末日を返す。
    pub fn month(&self, day: NaiveDate) -> Period {
        let start = day - Duration::days(i64::from(day.day0()));
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        Period { start, end }
    }

    /// `day`を含む残業周期を返す。
    pub fn overtime(&self, day: NaiveDate) -> Result<Period, ReportError> {
        self.overtime
            .map(|cycle| cycle.containing(day))
            .ok_or(ReportError::OvertimeNotConfigured)
    }

    pub fn boundaries(&self, kind: PeriodKind, day: NaiveDate) -> Result<Period, ReportError> {
        match kind {
            PeriodKind::Week => Ok(self.week(day)),
            PeriodKind::Month => Ok(self.month(day)),
            PeriodKind::Overtime => self.overtime(day),
        }
    }

    /// 名前付きの期間を`today`を基準に解決し、対応する移動モードと共に返す。
    pub fn shortcut(
        &self,
        shortcut: Shortcut,
        today: NaiveDate,
    ) -> Result<(Period, NavMode), ReportError> {
        match shortcut {
            Shortcut::CurrentWeek => Ok((self.week(today), NavMode::Week)),
            Shortcut::PreviousWeek => Ok((self.previous_week(today), NavMode::Week)),
            Shortcut::CurrentMonth => Ok((self.month(today), NavMode::Month)),
            Shortcut::LastMonth => {
                let current = self.month(today);
                Ok((
                    self.month(current.start - Duration::days(1)),
                    NavMode::Month,
                ))
            }
            Shortcut::Overtime => Ok((self.overtime(today)?, NavMode::Overtime)),
        }
    }

    /// 隣接する期間を返す。
    ///
    /// `Custom`では同じ日数だけずらす。それ以外のモードでは、隣接する日を基準日として
    /// 対応する週・月・残業周期の境界に揃える。
    ///
    /// # Arguments
    ///
    /// * `window` - 現在の期間
    /// * `mode` - 移動モード
    /// * `direction` - 移動方向
    pub fn navigate(
        &self,
        window: Period,
        mode: NavMode,
        direction: Direction,
    ) -> Result<Period, ReportError> {
        let reference = match direction {
            Direction::Previous => window.start - Duration::days(1),
            Direction::Next => window.end + Duration::days(1),
        };

        if let Some(kind) = mode.kind() {
            return self.boundaries(kind, reference);
        }

        let length = Duration::days(window.days() - 1);
        match direction {
            Direction::Previous => Ok(Period {
                start: reference - length,
                end: reference,
            }),
            Direction::Next => Ok(Period {
                start: reference,
                end: reference + length,
            }),
        }
    }
}
