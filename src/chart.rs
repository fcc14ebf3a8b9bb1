use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::hours::{HoursSeries, Visibility};
use crate::period::Period;

/// 値を1文字に符号化するための62文字。
const SIMPLE_ENCODING: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// この日数以下の期間は日単位のレイアウトで描画する。
const DAY_LAYOUT_MAX_DAYS: i64 = 42;

/// 1ユーザーあたりのグラフの縦軸の上限(時間)。
const HOURS_PER_USER: usize = 24;

/// 1つの値を`[0, max_value]`の62段階に量子化した文字を返す。
///
/// `max_value`は正の値であること。
pub fn encode_value(value: f64, max_value: f64) -> char {
    debug_assert!(max_value > 0.0, "chart scale must be positive");
    let index = (value * 61.0 / max_value).floor().clamp(0.0, 61.0) as usize;
    SIMPLE_ENCODING[index] as char
}

/// 複数の系列を符号化する。系列内は区切りなし、系列間は`,`で区切る。
pub fn encode(series: &[Vec<f64>], max_value: f64) -> String {
    series
        .iter()
        .map(|values| {
            values
                .iter()
                .map(|value| encode_value(*value, max_value))
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// 複数ユーザーを選択したときのグラフの描き方。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChartKind {
    /// ユーザーごとに1つずつ。
    MultiGraph,
    /// 全ユーザーの合計を1つ。
    SumGraph,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartLayout {
    /// 日毎のラベル。x軸は日、2本目のx軸は月。
    Day,
    /// y軸に時間、x軸に月の切り替わり位置を示すラベル。
    Month,
}

impl ChartLayout {
    pub fn for_period(period: Period) -> Self {
        if (period.end - period.start).num_days() <= DAY_LAYOUT_MAX_DAYS {
            ChartLayout::Day
        } else {
            ChartLayout::Month
        }
    }
}

/// 軸ラベルの文字列。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AxisLabels {
    pub layout: ChartLayout,
    pub labels: String,
    pub axes: String,
    /// 月の切り替わり位置。月単位のレイアウトのみ。
    pub positions: Option<String>,
}

/// 外部のグラフ描画サービスに渡すデータ。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChartPayload {
    pub name: String,
    pub chart_type: String,
    pub width_px: u32,
    pub height_px: u32,
    pub bar_format: String,
    pub encoded_series: String,
    pub axis_labels: AxisLabels,
    pub color_scheme: String,
}

/// ユーザー数から縦軸の上限を返す。ユーザーがいなくても1人分を下限にする。
pub fn scale(users: usize) -> usize {
    users.max(1) * HOURS_PER_USER
}

/// 縦軸の時間ラベルを`0|2|...|24|`の形式で返す。
fn hours_labels(users: usize) -> String {
    let max_hours = scale(users);
    let step = match users {
        0..=3 => 2,
        4..=6 => 4,
        7..=12 => 8,
        _ => 16,
    };
    (0..max_hours)
        .step_by(step)
        .chain(std::iter::once(max_hours))
        .map(|label| format!("{}|", label))
        .collect()
}

fn month_name(day: NaiveDate) -> String {
    day.format("%b").to_string()
}

/// 期間内で月が切り替わる日を`(期間の先頭からの日数, 日付)`で返す。先頭の日を含む。
fn month_starts(period: Period) -> Vec<(i64, NaiveDate)> {
    period
        .iter_days()
        .enumerate()
        .filter(|(i, day)| *i == 0 || day.day() == 1)
        .map(|(i, day)| (i as i64, day))
        .collect()
}

/// 軸ラベルを作る。
///
/// # Arguments
///
/// * `period` - グラフの期間
/// * `users` - グラフに含まれるユーザー数
pub fn axis_labels(period: Period, users: usize) -> AxisLabels {
    let hours = hours_labels(users);
    let starts = month_starts(period);
    let months = starts
        .iter()
        .map(|(_, day)| month_name(*day))
        .collect::<Vec<_>>()
        .join("|");

    match ChartLayout::for_period(period) {
        ChartLayout::Day => {
            let days: String = period
                .iter_days()
                .map(|day| format!("{}|", day.format("%d")))
                .collect();
            AxisLabels {
                layout: ChartLayout::Day,
                labels: format!("1:|{}0:|{}2:|{}", hours, days, months),
                axes: "x,y,x".to_string(),
                positions: None,
            }
        }
        ChartLayout::Month => {
            let offsets = starts
                .iter()
                .map(|(offset, _)| offset.to_string())
                .collect::<Vec<_>>()
                .join(",");
            AxisLabels {
                layout: ChartLayout::Month,
                labels: format!("0:|{}1:|{}", hours, months),
                axes: "y,x".to_string(),
                positions: Some(format!("1,{}", offsets)),
            }
        }
    }
}

/// 集計結果からグラフのデータを作る。
///
/// 系列は`[請求可能時間, 作業時間 - 請求可能時間]`の積み上げ棒グラフ。
///
/// # Arguments
///
/// * `name` - グラフの表示名
/// * `series` - 表示するユーザー(複数の場合は合計)の集計結果
/// * `users` - 集計に含まれるユーザー数
/// * `visibility` - 呼び出し元の権限
pub fn chart_payload(
    name: String,
    series: &HoursSeries,
    users: usize,
    visibility: Visibility,
) -> ChartPayload {
    let non_billable: Vec<f64> = series
        .worked
        .iter()
        .zip(&series.billable)
        .map(|(worked, billable)| worked - billable)
        .collect();
    let encoded_series = encode(&[series.billable.clone(), non_billable], scale(users) as f64);
    let axis_labels = axis_labels(series.period, users);

    let (width_px, bar_format) = match axis_labels.layout {
        ChartLayout::Day => {
            let days = (series.period.end - series.period.start).num_days() as u32;
            (days * 24 + 50, "18,2")
        }
        ChartLayout::Month => (640, "2,1"),
    };
    let height_px = if users < 2 { 240 } else { 400 };
    let color_scheme = if visibility.is_full() {
        "4d89f9,c6d9fd"
    } else {
        "4d89f9"
    };

    ChartPayload {
        name,
        chart_type: "bvs".to_string(),
        width_px,
        height_px,
        bar_format: bar_format.to_string(),
        encoded_series,
        axis_labels,
        color_scheme: color_scheme.to_string(),
    }
}
