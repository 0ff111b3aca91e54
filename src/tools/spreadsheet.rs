//! Excel workbook tools.
//!
//! Workbook I/O is synchronous, so every tool parses its arguments and does its
//! work on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use umya_spreadsheet::structs::drawing::spreadsheet::MarkerType;
use umya_spreadsheet::structs::{Chart, ChartType};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use super::error::{required_array, required_str};
use super::{Tool, ToolContext, ToolError};

const MAX_ROWS_PER_SHEET: usize = 100;
const MAX_AUTO_WIDTH: f64 = 50.0;
const HEADER_FILL: &str = "FF4472C4";
const HEADER_FONT: &str = "FFFFFFFF";

pub(super) fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CreateExcel),
        Arc::new(ReadExcel),
        Arc::new(EditExcelCell),
        Arc::new(AddExcelFormula),
        Arc::new(AddExcelChart),
        Arc::new(AddExcelSheet),
        Arc::new(ExcelAddRows),
        Arc::new(ExcelStyleRange),
    ]
}

async fn blocking<F>(work: F) -> Result<String, ToolError>
where
    F: FnOnce() -> Result<String, ToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ToolError::Spreadsheet(format!("worker failed: {}", e)))?
}

fn open(path: &Path) -> Result<Spreadsheet, ToolError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if extension != "xlsx" && extension != "xlsm" {
        return Err(ToolError::Unsupported(format!(
            "{} is not an .xlsx workbook",
            path.display()
        )));
    }

    umya_spreadsheet::reader::xlsx::read(path)
        .map_err(|e| ToolError::Spreadsheet(format!("cannot open {}: {}", path.display(), e)))
}

fn save(book: &Spreadsheet, path: &Path) -> Result<(), ToolError> {
    umya_spreadsheet::writer::xlsx::write(book, path)
        .map_err(|e| ToolError::Spreadsheet(format!("cannot save {}: {}", path.display(), e)))
}

/// The named sheet, or the first sheet when no sheet has that name.
fn sheet_mut<'a>(book: &'a mut Spreadsheet, name: &str) -> Result<&'a mut Worksheet, ToolError> {
    let index = book
        .get_sheet_collection()
        .iter()
        .position(|sheet| sheet.get_name() == name)
        .unwrap_or(0);
    book.get_sheet_mut(&index)
        .ok_or_else(|| ToolError::Spreadsheet("workbook has no sheets".into()))
}

/// Sheet name as it must appear in a range reference.
fn sheet_ref(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

/// Parse an A1-style reference into 1-based (column, row).
fn parse_cell(reference: &str) -> Result<(u32, u32), ToolError> {
    let reference = reference.trim().replace('$', "").to_uppercase();
    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| ToolError::invalid("cell", format!("'{}' has no row", reference)))?;
    let (letters, digits) = reference.split_at(split);

    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ToolError::invalid(
            "cell",
            format!("'{}' has no column", reference),
        ));
    }

    let column = letters
        .chars()
        .fold(0u32, |acc, c| acc * 26 + (c as u32 - 'A' as u32 + 1));
    let row: u32 = digits
        .parse()
        .map_err(|_| ToolError::invalid("cell", format!("'{}' has a bad row", reference)))?;

    if row == 0 {
        return Err(ToolError::invalid("cell", "rows start at 1"));
    }
    Ok((column, row))
}

/// Parse `A1:D4` (or a single cell) into ordered corners.
fn parse_range(range: &str) -> Result<((u32, u32), (u32, u32)), ToolError> {
    let (start, end) = match range.split_once(':') {
        Some((a, b)) => (parse_cell(a)?, parse_cell(b)?),
        None => {
            let cell = parse_cell(range)?;
            (cell, cell)
        }
    };
    Ok((
        (start.0.min(end.0), start.1.min(end.1)),
        (start.0.max(end.0), start.1.max(end.1)),
    ))
}

fn column_letter(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Write a JSON value into a cell, returning its display text.
fn set_cell(sheet: &mut Worksheet, column: u32, row: u32, value: &Value) -> String {
    let cell = sheet.get_cell_mut((column, row));
    match value {
        Value::Null => String::new(),
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or_default();
            cell.set_value_number(n);
            format_number(n)
        }
        Value::Bool(b) => {
            cell.set_value_bool(*b);
            b.to_string()
        }
        Value::String(s) => {
            cell.set_value(s.clone());
            s.clone()
        }
        other => {
            let text = other.to_string();
            cell.set_value(text.clone());
            text
        }
    }
}

fn append_rows(sheet: &mut Worksheet, rows: &[Value]) -> Result<(), ToolError> {
    for row in rows {
        let cells = row
            .as_array()
            .ok_or_else(|| ToolError::invalid("rows", "each row must be an array"))?;
        let target = sheet.get_highest_row() + 1;
        for (i, value) in cells.iter().enumerate() {
            set_cell(sheet, i as u32 + 1, target, value);
        }
    }
    Ok(())
}

fn style_header(sheet: &mut Worksheet, columns: u32) {
    for column in 1..=columns {
        let style = sheet.get_style_mut((column, 1));
        let font = style.get_font_mut();
        font.set_bold(true);
        font.get_color_mut().set_argb(HEADER_FONT);
        style.set_background_color(HEADER_FILL);
    }
}

fn auto_fit_columns(sheet: &mut Worksheet) {
    let rows = sheet.get_highest_row();
    for column in 1..=sheet.get_highest_column() {
        let longest = (1..=rows)
            .map(|row| sheet.get_value((column, row)).chars().count())
            .max()
            .filter(|len| *len > 0)
            .unwrap_or(10);
        let width = (longest as f64 + 4.0).min(MAX_AUTO_WIDTH);
        sheet
            .get_column_dimension_mut(&column_letter(column))
            .set_width(width);
    }
}

/// `RRGGBB` or `#RRGGBB` to an opaque ARGB string.
fn argb(color: &str) -> Result<String, ToolError> {
    let hex = color.trim().trim_start_matches('#').to_uppercase();
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ToolError::invalid("bg_color", format!("'{}' is not hex", color)));
    }
    match hex.len() {
        6 => Ok(format!("FF{}", hex)),
        8 => Ok(hex),
        _ => Err(ToolError::invalid("bg_color", "expected RRGGBB")),
    }
}

fn create_workbook(path: &Path, sheets: &[Value]) -> Result<String, ToolError> {
    if sheets.is_empty() {
        return Err(ToolError::invalid("sheets_data", "at least one sheet is required"));
    }

    let mut book = umya_spreadsheet::new_file();
    for (index, data) in sheets.iter().enumerate() {
        let name = data["name"].as_str().unwrap_or("Sheet1");
        let sheet = if index == 0 {
            let first = book
                .get_sheet_mut(&0)
                .ok_or_else(|| ToolError::Spreadsheet("new workbook has no sheet".into()))?;
            first.set_name(name);
            first
        } else {
            book.new_sheet(name)
                .map_err(|e| ToolError::Spreadsheet(format!("sheet '{}': {}", name, e)))?
        };

        let headers = data["headers"].as_array().cloned().unwrap_or_default();
        if !headers.is_empty() {
            for (i, header) in headers.iter().enumerate() {
                set_cell(sheet, i as u32 + 1, 1, header);
            }
            style_header(sheet, headers.len() as u32);
        }

        if let Some(rows) = data["rows"].as_array() {
            append_rows(sheet, rows)?;
        }

        match data["col_widths"].as_array() {
            Some(widths) if !widths.is_empty() => {
                for (i, width) in widths.iter().enumerate() {
                    if let Some(width) = width.as_f64() {
                        sheet
                            .get_column_dimension_mut(&column_letter(i as u32 + 1))
                            .set_width(width);
                    }
                }
            }
            _ => auto_fit_columns(sheet),
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ToolError::io("Excel create error", e))?;
    }
    save(&book, path)?;

    Ok(format!(
        "Excel '{}' created ({} sheet(s)).",
        path.display(),
        sheets.len()
    ))
}

fn read_workbook(path: &Path) -> Result<String, ToolError> {
    let book = open(path)?;
    let mut out = Vec::new();

    for sheet in book.get_sheet_collection() {
        let rows = sheet.get_highest_row();
        let columns = sheet.get_highest_column();
        out.push(format!(
            "=== Sheet: {} ({}r x {}c) ===",
            sheet.get_name(),
            rows,
            columns
        ));

        let mut shown = 0;
        for row in 1..=rows {
            let values: Vec<String> = (1..=columns)
                .map(|column| sheet.get_value((column, row)))
                .collect();
            if values.iter().all(|v| v.is_empty()) {
                continue;
            }
            if shown == MAX_ROWS_PER_SHEET {
                out.push("[truncated]".to_string());
                break;
            }
            out.push(values.join("\t"));
            shown += 1;
        }
    }

    if out.is_empty() {
        Ok("Empty.".to_string())
    } else {
        Ok(out.join("\n"))
    }
}

fn edit_cell(path: &Path, args: &Value) -> Result<String, ToolError> {
    let sheet_name = required_str(args, "sheet_name")?;
    let reference = required_str(args, "cell")?;
    let (column, row) = parse_cell(reference)?;

    // Numeric text is stored as a number.
    let value = match args.get("value") {
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => json!(n),
            _ => Value::String(s.clone()),
        },
        Some(other) if !other.is_null() => other.clone(),
        _ => return Err(ToolError::MissingField("value".into())),
    };

    let mut book = open(path)?;
    let shown = set_cell(sheet_mut(&mut book, sheet_name)?, column, row, &value);
    save(&book, path)?;

    Ok(format!("Cell {}!{} = {}", sheet_name, reference, shown))
}

fn add_formula(path: &Path, args: &Value) -> Result<String, ToolError> {
    let sheet_name = required_str(args, "sheet_name")?;
    let reference = required_str(args, "cell")?;
    let formula = required_str(args, "formula")?;
    let coordinate = parse_cell(reference)?;

    let mut book = open(path)?;
    sheet_mut(&mut book, sheet_name)?
        .get_cell_mut(coordinate)
        .set_formula(formula.trim().trim_start_matches('='));
    save(&book, path)?;

    Ok(format!(
        "Formula '{}' set in {}!{}",
        formula, sheet_name, reference
    ))
}

fn add_chart(path: &Path, args: &Value) -> Result<String, ToolError> {
    let sheet_name = required_str(args, "sheet_name")?;
    let kind = required_str(args, "chart_type")?;
    let data_range = required_str(args, "data_range")?;
    let title = required_str(args, "title")?;
    let position = required_str(args, "position")?;

    let chart_type = match kind {
        "line" => ChartType::LineChart,
        "pie" => ChartType::PieChart,
        _ => ChartType::BarChart,
    };
    let ((c1, r1), (c2, r2)) = parse_range(data_range)?;
    let (anchor_col, anchor_row) = parse_cell(position)?;

    let mut book = open(path)?;
    let sheet = sheet_mut(&mut book, sheet_name)?;
    let target = sheet_ref(sheet.get_name());

    // The first row holds series titles when the range spans several rows.
    let first_data_row = if r2 > r1 { r1 + 1 } else { r1 };
    let last_column = if kind == "pie" { c1 } else { c2 };
    let series: Vec<String> = (c1..=last_column)
        .map(|column| {
            let letter = column_letter(column);
            format!(
                "{}!${}${}:${}${}",
                target, letter, first_data_row, letter, r2
            )
        })
        .collect();

    let mut from = MarkerType::default();
    from.set_coordinate(format!("{}{}", column_letter(anchor_col), anchor_row));
    let mut to = MarkerType::default();
    to.set_coordinate(format!("{}{}", column_letter(anchor_col + 8), anchor_row + 15));

    let mut chart = Chart::default();
    chart.new_chart(
        chart_type,
        from,
        to,
        series.iter().map(String::as_str).collect(),
    );
    sheet.add_chart(chart);
    save(&book, path)?;

    Ok(format!(
        "Chart '{}' ({}) added at {}.",
        kind, title, position
    ))
}

fn add_sheet(path: &Path, args: &Value) -> Result<String, ToolError> {
    let sheet_name = required_str(args, "sheet_name")?;

    let mut book = open(path)?;
    if book.get_sheet_by_name(sheet_name).is_some() {
        return Ok(format!("Sheet '{}' already exists.", sheet_name));
    }
    book.new_sheet(sheet_name)
        .map_err(|e| ToolError::Spreadsheet(format!("sheet '{}': {}", sheet_name, e)))?;
    save(&book, path)?;

    Ok(format!("Sheet '{}' added.", sheet_name))
}

fn add_rows(path: &Path, args: &Value) -> Result<String, ToolError> {
    let sheet_name = required_str(args, "sheet_name")?;
    let rows = required_array(args, "rows")?;

    let mut book = open(path)?;
    append_rows(sheet_mut(&mut book, sheet_name)?, rows)?;
    save(&book, path)?;

    Ok(format!("Added {} row(s) to '{}'.", rows.len(), sheet_name))
}

fn style_range(path: &Path, args: &Value) -> Result<String, ToolError> {
    let sheet_name = required_str(args, "sheet_name")?;
    let cell_range = required_str(args, "cell_range")?;
    let ((c1, r1), (c2, r2)) = parse_range(cell_range)?;

    let bold = match args.get("bold") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let fill = match args.get("bg_color").and_then(|v| v.as_str()) {
        Some(color) if !color.is_empty() => Some(argb(color)?),
        _ => None,
    };
    let font_size = args.get("font_size").and_then(|v| match v {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    });

    let mut book = open(path)?;
    let sheet = sheet_mut(&mut book, sheet_name)?;
    for row in r1..=r2 {
        for column in c1..=c2 {
            let style = sheet.get_style_mut((column, row));
            if bold {
                style.get_font_mut().set_bold(true);
            }
            if let Some(size) = font_size {
                style.get_font_mut().set_size(size);
            }
            if let Some(fill) = &fill {
                style.set_background_color(fill.as_str());
            }
        }
    }
    save(&book, path)?;

    Ok(format!("Style applied to {}.", cell_range))
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn sheet_params(extra: &[(&str, Value)]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("path".into(), string_prop("Path to the .xlsx file"));
    properties.insert("sheet_name".into(), string_prop("Sheet name"));
    let mut required = vec!["path".to_string(), "sheet_name".to_string()];
    for (name, schema) in extra {
        properties.insert(name.to_string(), schema.clone());
        required.push(name.to_string());
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

fn resolved_path(args: &Value, ctx: &ToolContext) -> Result<PathBuf, ToolError> {
    Ok(ctx.resolve(required_str(args, "path")?))
}

/// Create a workbook with styled headers and data rows.
pub struct CreateExcel;

#[async_trait]
impl Tool for CreateExcel {
    fn name(&self) -> &str {
        "create_excel"
    }

    fn description(&self) -> &str {
        "Create a new Excel .xlsx file with sheets, headers, data rows, and auto-formatting."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": string_prop("Full path to the .xlsx file"),
                "sheets_data": {
                    "type": "array",
                    "description": "List of sheets to create",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": string_prop("Sheet name"),
                            "headers": {
                                "type": "array",
                                "description": "Column headers",
                                "items": { "type": "string" }
                            },
                            "rows": {
                                "type": "array",
                                "description": "Data rows (list of lists)",
                                "items": { "type": "array", "items": { "type": "string" } }
                            },
                            "col_widths": {
                                "type": "array",
                                "description": "Optional column widths",
                                "items": { "type": "number" }
                            }
                        }
                    }
                }
            },
            "required": ["path", "sheets_data"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let mut path = resolved_path(args, ctx)?;
        if path.extension().and_then(|e| e.to_str()) != Some("xlsx") {
            path = PathBuf::from(format!("{}.xlsx", path.display()));
        }
        let sheets = required_array(args, "sheets_data")?.clone();
        blocking(move || create_workbook(&path, &sheets)).await
    }
}

/// Dump workbook contents as tab-separated text.
pub struct ReadExcel;

#[async_trait]
impl Tool for ReadExcel {
    fn name(&self) -> &str {
        "read_excel"
    }

    fn description(&self) -> &str {
        "Read an Excel file contents (max 100 rows per sheet)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "path": string_prop("Path to the .xlsx file") },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        blocking(move || read_workbook(&path)).await
    }
}

pub struct EditExcelCell;

#[async_trait]
impl Tool for EditExcelCell {
    fn name(&self) -> &str {
        "edit_excel_cell"
    }

    fn description(&self) -> &str {
        "Edit a single cell value in an Excel file."
    }

    fn parameters_schema(&self) -> Value {
        sheet_params(&[
            ("cell", string_prop("Cell address e.g. A1")),
            ("value", string_prop("New value")),
        ])
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        let args = args.clone();
        blocking(move || edit_cell(&path, &args)).await
    }
}

pub struct AddExcelFormula;

#[async_trait]
impl Tool for AddExcelFormula {
    fn name(&self) -> &str {
        "add_excel_formula"
    }

    fn description(&self) -> &str {
        "Insert an Excel formula: =SUM(), =VLOOKUP(), =COUNTIF(), =IF(), =AVERAGE(), =MAX(), =MIN()."
    }

    fn parameters_schema(&self) -> Value {
        sheet_params(&[
            ("cell", string_prop("Target cell e.g. B12")),
            ("formula", string_prop("Excel formula e.g. =SUM(B2:B11)")),
        ])
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        let args = args.clone();
        blocking(move || add_formula(&path, &args)).await
    }
}

pub struct AddExcelChart;

#[async_trait]
impl Tool for AddExcelChart {
    fn name(&self) -> &str {
        "add_excel_chart"
    }

    fn description(&self) -> &str {
        "Add a bar, line, or pie chart to an Excel sheet."
    }

    fn parameters_schema(&self) -> Value {
        sheet_params(&[
            (
                "chart_type",
                json!({ "type": "string", "enum": ["bar", "line", "pie"] }),
            ),
            ("data_range", string_prop("Data range e.g. A1:B10")),
            ("title", string_prop("Chart title")),
            ("position", string_prop("Anchor cell e.g. D2")),
        ])
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        let args = args.clone();
        blocking(move || add_chart(&path, &args)).await
    }
}

pub struct AddExcelSheet;

#[async_trait]
impl Tool for AddExcelSheet {
    fn name(&self) -> &str {
        "add_excel_sheet"
    }

    fn description(&self) -> &str {
        "Add a new sheet to an existing Excel file."
    }

    fn parameters_schema(&self) -> Value {
        sheet_params(&[])
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        let args = args.clone();
        blocking(move || add_sheet(&path, &args)).await
    }
}

pub struct ExcelAddRows;

#[async_trait]
impl Tool for ExcelAddRows {
    fn name(&self) -> &str {
        "excel_add_rows"
    }

    fn description(&self) -> &str {
        "Append rows to the end of an Excel sheet."
    }

    fn parameters_schema(&self) -> Value {
        sheet_params(&[(
            "rows",
            json!({
                "type": "array",
                "description": "Rows to append; each row is a list of cell values",
                "items": { "type": "array", "items": { "type": "string" } }
            }),
        )])
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        let args = args.clone();
        blocking(move || add_rows(&path, &args)).await
    }
}

pub struct ExcelStyleRange;

#[async_trait]
impl Tool for ExcelStyleRange {
    fn name(&self) -> &str {
        "excel_style_range"
    }

    fn description(&self) -> &str {
        "Style a cell range: bold, background color, font size."
    }

    fn parameters_schema(&self) -> Value {
        let mut schema = sheet_params(&[("cell_range", string_prop("Range e.g. A1:D1"))]);
        if let Some(properties) = schema["properties"].as_object_mut() {
            properties.insert(
                "bold".into(),
                json!({ "type": "boolean", "description": "Make text bold" }),
            );
            properties.insert(
                "bg_color".into(),
                string_prop("Hex fill color without # e.g. FF0000"),
            );
            properties.insert(
                "font_size".into(),
                json!({ "type": "integer", "description": "Font size in pt" }),
            );
        }
        schema
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = resolved_path(args, ctx)?;
        let args = args.clone();
        blocking(move || style_range(&path, &args)).await
    }
}
