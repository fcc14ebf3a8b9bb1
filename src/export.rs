use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::period::Period;
use crate::report::{Export, ExportFormat, Table};

/// エクスポートをCSVとして書き出す。最後の行は合計時間。
pub fn write_csv<W: Write>(export: &Export, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&export.table.headers)
        .context("Failed to write csv header")?;
    for row in &export.table.rows {
        csv.write_record(row)
            .with_context(|| format!("Failed to write csv row: {:?}", row))?;
    }

    let mut total = vec![String::new(); export.table.headers.len()];
    if let Some(first) = total.first_mut() {
        *first = "total".to_string();
    }
    if let Some(last) = total.last_mut() {
        *last = format!("{:.2}", export.total_hours);
    }
    csv.write_record(&total).context("Failed to write csv total")?;
    csv.flush().context("Failed to flush csv writer")?;
    Ok(())
}

/// 文書テンプレートへ差し込むデータ。描画は外部のレンダラーが行う。
#[derive(Debug, Serialize)]
struct DocumentFields<'a> {
    title: &'a str,
    period: Period,
    table: &'a Table,
    total_hours: f64,
}

/// エクスポートを文書テンプレート用のJSONとして書き出す。
pub fn write_document_fields<W: Write>(export: &Export, writer: W) -> Result<()> {
    let fields = DocumentFields {
        title: &export.title,
        period: export.period,
        table: &export.table,
        total_hours: export.total_hours,
    };
    serde_json::to_writer_pretty(writer, &fields).context("Failed to write document fields")?;
    Ok(())
}

/// エクスポートを`dir`に保存し、作成したファイルのパスを返す。
///
/// CSVはそのまま、文書形式は`<file_name>.json`としてテンプレート用のデータを保存する。
pub fn save(export: &Export, dir: &Path) -> Result<PathBuf> {
    let path = match export.format {
        ExportFormat::Csv => dir.join(&export.file_name),
        ExportFormat::Odt => dir.join(format!("{}.json", export.file_name)),
    };
    let file =
        File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    match export.format {
        ExportFormat::Csv => write_csv(export, file)?,
        ExportFormat::Odt => write_document_fields(export, file)?,
    }
    info!("Exported to {}", path.display());
    Ok(path)
}
