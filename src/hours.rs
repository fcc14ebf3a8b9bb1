use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ReportError;
use crate::model::{effective_on, AvgHours, Capability, TimeLogEntry, Wage};
use crate::period::Period;

/// 金額に関わる値を見せてよいかどうか。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Full,
    Restricted,
}

impl Visibility {
    /// `view_billable`と`view_wage`の両方を持つ場合のみ`Full`になる。
    pub fn from_capabilities(capabilities: &BTreeSet<Capability>) -> Self {
        if capabilities.contains(&Capability::ViewBillable)
            && capabilities.contains(&Capability::ViewWage)
        {
            Visibility::Full
        } else {
            Visibility::Restricted
        }
    }

    pub fn is_full(self) -> bool {
        self == Visibility::Full
    }
}

/// 1ユーザー分の集計対象データ。
#[derive(Clone, Debug, Default)]
pub struct HoursInput {
    pub username: String,
    pub entries: Vec<TimeLogEntry>,
    pub avg_hours: Vec<AvgHours>,
    pub wages: Vec<Wage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HoursTotals {
    pub worked: f64,
    pub loggable: f64,
    pub billable: f64,
    /// 時給から計算した原価。`Full`の場合のみ。
    pub cost: Option<Decimal>,
}

/// 日毎の集計結果。各系列は期間内の日付と同じ順序・長さを持つ。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HoursSeries {
    pub period: Period,
    pub worked: Vec<f64>,
    pub loggable: Vec<f64>,
    pub billable: Vec<f64>,
    pub totals: HoursTotals,
}

impl HoursSeries {
    /// 全て0の系列を返す。
    pub fn zero(period: Period, visibility: Visibility) -> Self {
        let len = period.days() as usize;
        Self {
            period,
            worked: vec![0.0; len],
            loggable: vec![0.0; len],
            billable: vec![0.0; len],
            totals: HoursTotals {
                worked: 0.0,
                loggable: 0.0,
                billable: 0.0,
                cost: visibility.is_full().then_some(Decimal::ZERO),
            },
        }
    }

    /// 別の集計結果を日毎に加算する。期間が異なる場合はエラーを返す。
    pub fn add(&mut self, other: &HoursSeries) -> Result<(), ReportError> {
        if self.period != other.period {
            return Err(ReportError::PeriodMismatch);
        }
        self.accumulate(other);
        Ok(())
    }

    /// 期間が同じであることを前提に、日毎に加算する。
    fn accumulate(&mut self, other: &HoursSeries) {
        add_into(&mut self.worked, &other.worked);
        add_into(&mut self.loggable, &other.loggable);
        add_into(&mut self.billable, &other.billable);
        let cost = match (self.totals.cost, other.totals.cost) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        self.totals = totals(&self.worked, &self.loggable, &self.billable, cost);
    }
}

fn add_into(acc: &mut [f64], other: &[f64]) {
    acc.iter_mut().zip(other).for_each(|(a, b)| *a += b);
}

fn totals(worked: &[f64], loggable: &[f64], billable: &[f64], cost: Option<Decimal>) -> HoursTotals {
    HoursTotals {
        worked: worked.iter().sum(),
        loggable: loggable.iter().sum(),
        billable: billable.iter().sum(),
        cost,
    }
}

/// 1ユーザー分の作業時間・想定時間・請求可能時間を日毎に集計する。
///
/// 請求可能時間と原価は`Visibility::Full`の場合のみ計算し、それ以外は0(原価は`None`)とする。
///
/// # Arguments
///
/// * `input` - 集計対象のユーザーのデータ
/// * `billable_projects` - 請求可能なプロジェクトの外部ID
/// * `period` - 集計期間
/// * `visibility` - 呼び出し元の権限
pub fn aggregate(
    input: &HoursInput,
    billable_projects: &HashSet<String>,
    period: Period,
    visibility: Visibility,
) -> HoursSeries {
    let mut worked_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    let mut billable_by_day: HashMap<NaiveDate, f64> = HashMap::new();
    input
        .entries
        .iter()
        .filter(|entry| entry.user == input.username && period.contains(entry.date))
        .for_each(|entry| {
            *worked_by_day.entry(entry.date).or_insert(0.0) += entry.hours_booked;
            if billable_projects.contains(&entry.project) {
                *billable_by_day.entry(entry.date).or_insert(0.0) += entry.hours_booked;
            }
        });

    let mut worked = Vec::new();
    let mut loggable = Vec::new();
    let mut billable = Vec::new();
    let mut cost = Decimal::ZERO;
    for day in period.iter_days() {
        let day_worked = worked_by_day.get(&day).copied().unwrap_or(0.0);
        worked.push(day_worked);
        loggable.push(
            effective_on(&input.avg_hours, day)
                .map(|avg| avg.hours)
                .unwrap_or(0.0),
        );
        if visibility.is_full() {
            billable.push(billable_by_day.get(&day).copied().unwrap_or(0.0));
            if let Some(wage) = effective_on(&input.wages, day) {
                cost += Decimal::from_f64(day_worked).unwrap_or_default() * wage.amount_per_hour;
            }
        } else {
            billable.push(0.0);
        }
    }

    let cost = visibility.is_full().then_some(cost);
    let totals = totals(&worked, &loggable, &billable, cost);
    HoursSeries {
        period,
        worked,
        loggable,
        billable,
        totals,
    }
}

/// 複数ユーザーの集計結果を日毎に合計する。全ユーザーを同じ期間で集計する。
pub fn aggregate_many(
    inputs: &[HoursInput],
    billable_projects: &HashSet<String>,
    period: Period,
    visibility: Visibility,
) -> HoursSeries {
    inputs
        .iter()
        .map(|input| aggregate(input, billable_projects, period, visibility))
        .fold(HoursSeries::zero(period, visibility), |mut acc, series| {
            acc.accumulate(&series);
            acc
        })
}
