//! CSV readers for the spreadsheet exports of each domain.
//!
//! Headers are matched ignoring case and surrounding whitespace. Numbers use
//! the es-AR convention ("1.234,56"). A batch is accepted whole or rejected
//! with one error naming the row (header = row 1) and column.

use crate::config::EngineConfig;
use crate::error::{AnalyticsError, Result};
use crate::goals::SalesGoal;
use crate::schema::{
    ExpenseRecord, FiscalType, HrRecord, PurchaseRecord, SaleRecord, StockRecord,
};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use log::{info, warn};
use std::collections::HashMap;
use std::io::Read;

pub const SALES_COLUMNS: [&str; 9] = [
    "Suc",
    "Tipo",
    "Tipo Comp.",
    "Cant",
    "Fecha",
    "Total",
    "Cliente",
    "ID VENDEDOR",
    "Vendedor",
];

pub const PURCHASE_COLUMNS: [&str; 7] = [
    "Fecha",
    "Modalidad",
    "Proveedor",
    "Sin Impuestos",
    "Otros Tributos",
    "IVA",
    "Con Impuestos",
];

pub const EXPENSE_COLUMNS: [&str; 5] = ["Fecha", "Categoría", "Subcategoría", "Detalle", "Monto"];

pub const HR_COLUMNS: [&str; 8] = [
    "Fecha",
    "Legajo",
    "Area",
    "Actividad",
    "Tipo",
    "Fecha Ingreso",
    "Fecha de Nacimiento",
    "Fecha Baja",
];

pub const STOCK_COLUMNS: [&str; 9] = [
    "Fecha",
    "Rubro productos",
    "Costo sin imp en $",
    "Suc",
    "Cotizacion Dolar Sistema",
    "Cotizacion Dolar Oficial",
    "Valorizado en USD SISTEMA",
    "Valorizado en USD OFICIAL",
    "Valorizado en $ a dolar oficial",
];

pub const GOAL_COLUMNS: [&str; 5] = [
    "Sucursal",
    "Año",
    "Mes",
    "Objetivo de ventas",
    "Venta final con impuestos",
];

const DATE_FORMATS: [&str; 4] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Largest spreadsheet serial accepted as a date (9999-12-31).
const MAX_DATE_SERIAL: f64 = 2_958_465.0;

/// Parses an es-AR formatted number.
///
/// With a comma, dots are thousands separators and the comma is the decimal
/// mark. Without one, a value shaped like "1.234.567" is read as thousands;
/// anything else is parsed as written.
pub fn parse_es_ar_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_start_matches('$').trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replacen(',', ".", 1)
    } else if is_dotted_thousands(trimmed) {
        trimmed.replace('.', "")
    } else {
        trimmed.to_string()
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_dotted_thousands(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let mut groups = digits.split('.');
    let head_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.chars().all(|c| c.is_ascii_digit()));
    let mut tail_count = 0;
    let tail_ok = groups.all(|g| {
        tail_count += 1;
        g.len() == 3 && g.chars().all(|c| c.is_ascii_digit())
    });
    head_ok && tail_ok && tail_count > 0
}

/// Parses `dd/mm/yyyy`, `yyyy-mm-dd` and similar layouts, with or without a
/// time part, or a spreadsheet serial day number.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }

    let serial = trimmed.parse::<f64>().ok()?;
    if serial <= 0.0 || serial > MAX_DATE_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}

fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Picks `;` when the header line has more of them than commas.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or("");
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

/// Header positions of the required columns.
struct ColumnMap {
    positions: HashMap<&'static str, usize>,
}

impl ColumnMap {
    fn build(domain: &str, headers: &StringRecord, required: &[&'static str]) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();

        let mut positions = HashMap::new();
        let mut missing = Vec::new();
        for column in required {
            let wanted = normalize_header(column);
            match normalized.iter().position(|h| *h == wanted) {
                Some(idx) => {
                    positions.insert(*column, idx);
                }
                None => missing.push(*column),
            }
        }

        if !missing.is_empty() {
            return Err(AnalyticsError::MissingColumns {
                domain: domain.to_string(),
                columns: missing.join(", "),
            });
        }
        Ok(Self { positions })
    }
}

/// One data row with typed accessors that report the row and column on failure.
struct Row<'a> {
    record: &'a StringRecord,
    columns: &'a ColumnMap,
    number: usize,
}

impl<'a> Row<'a> {
    fn raw(&self, column: &'static str) -> &'a str {
        self.columns
            .positions
            .get(column)
            .and_then(|idx| self.record.get(*idx))
            .unwrap_or("")
    }

    fn text(&self, column: &'static str) -> String {
        self.raw(column).trim().to_string()
    }

    fn upper(&self, column: &'static str) -> String {
        self.raw(column).trim().to_uppercase()
    }

    fn invalid(&self, column: &'static str) -> AnalyticsError {
        AnalyticsError::InvalidValue {
            row: self.number,
            column: column.to_string(),
            value: self.raw(column).to_string(),
        }
    }

    fn number(&self, column: &'static str) -> Result<f64> {
        parse_es_ar_number(self.raw(column)).ok_or_else(|| self.invalid(column))
    }

    /// Whole part of a number; "3,0" and "3" both read as 3.
    fn integer(&self, column: &'static str) -> Result<i64> {
        self.number(column).map(|v| v.trunc() as i64)
    }

    fn date(&self, column: &'static str) -> Result<NaiveDate> {
        parse_date(self.raw(column)).ok_or_else(|| self.invalid(column))
    }

    /// Blank cells are `None`; anything else must be a valid date.
    fn optional_date(&self, column: &'static str) -> Result<Option<NaiveDate>> {
        if self.raw(column).trim().is_empty() {
            return Ok(None);
        }
        self.date(column).map(Some)
    }
}

/// Reads the whole export and converts every row, or nothing.
fn read_batch<R, T, F>(reader: R, domain: &str, required: &[&'static str], convert: F) -> Result<Vec<T>>
where
    R: Read,
    F: FnMut(&Row<'_>) -> Result<T>,
{
    let outcome = parse_batch(reader, domain, required, convert);
    match &outcome {
        Ok(records) => info!("Accepted {} {} records", records.len(), domain),
        Err(e) => warn!("Rejected {} upload: {}", domain, e),
    }
    outcome
}

fn parse_batch<R, T, F>(
    mut reader: R,
    domain: &str,
    required: &[&'static str],
    mut convert: F,
) -> Result<Vec<T>>
where
    R: Read,
    F: FnMut(&Row<'_>) -> Result<T>,
{
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut rdr = ReaderBuilder::new()
        .delimiter(sniff_delimiter(&content))
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers = rdr.headers()?.clone();
    let columns = ColumnMap::build(domain, &headers, required)?;

    let mut records = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let row = Row {
            record: &record,
            columns: &columns,
            number: index + 2,
        };
        records.push(convert(&row)?);
    }

    if records.is_empty() {
        return Err(AnalyticsError::EmptyUpload(domain.to_string()));
    }
    Ok(records)
}

pub fn read_sales<R: Read>(reader: R) -> Result<Vec<SaleRecord>> {
    read_batch(reader, "sales", &SALES_COLUMNS, |row| {
        Ok(SaleRecord {
            branch: row.upper("Suc"),
            document_type: row.text("Tipo Comp."),
            quantity: row.integer("Cant")?,
            date: row.date("Fecha")?,
            total: row.number("Total")?,
            client: row.text("Cliente"),
            salesperson_id: row.number("ID VENDEDOR").map_or(0, |v| v.max(0.0) as u64),
            salesperson: row.upper("Vendedor"),
            fiscal_type: FiscalType::from_label(row.raw("Tipo")),
        })
    })
}

pub fn read_purchases<R: Read>(reader: R) -> Result<Vec<PurchaseRecord>> {
    read_batch(reader, "purchases", &PURCHASE_COLUMNS, |row| {
        Ok(PurchaseRecord::new(
            row.date("Fecha")?,
            FiscalType::from_label(row.raw("Modalidad")),
            row.upper("Proveedor"),
            row.number("Sin Impuestos")?,
            row.number("Otros Tributos")?,
            row.number("IVA")?,
            row.number("Con Impuestos")?,
        ))
    })
}

pub fn read_expenses<R: Read>(reader: R) -> Result<Vec<ExpenseRecord>> {
    read_batch(reader, "expenses", &EXPENSE_COLUMNS, |row| {
        Ok(ExpenseRecord::new(
            row.date("Fecha")?,
            row.text("Categoría"),
            row.text("Subcategoría"),
            row.text("Detalle"),
            row.number("Monto")?,
        ))
    })
}

pub fn read_hr<R: Read>(reader: R) -> Result<Vec<HrRecord>> {
    read_batch(reader, "HR", &HR_COLUMNS, |row| {
        let date = row.date("Fecha")?;
        Ok(HrRecord {
            date,
            year: date.year(),
            month: date.month(),
            employee: row.text("Legajo"),
            area: row.text("Area"),
            activity: row.text("Actividad"),
            kind: row.text("Tipo"),
            entry_date: row.date("Fecha Ingreso")?,
            birth_date: row.date("Fecha de Nacimiento")?,
            termination_date: row.optional_date("Fecha Baja")?,
        })
    })
}

pub fn read_stock<R: Read>(reader: R) -> Result<Vec<StockRecord>> {
    read_batch(reader, "stock", &STOCK_COLUMNS, |row| {
        let date = row.date("Fecha")?;
        Ok(StockRecord {
            date,
            year: date.year(),
            month: date.month(),
            branch: row.upper("Suc"),
            rubro: row.text("Rubro productos"),
            cost: row.number("Costo sin imp en $")?,
            system_rate: row.number("Cotizacion Dolar Sistema")?,
            official_rate: row.number("Cotizacion Dolar Oficial")?,
            valued_usd_system: row.number("Valorizado en USD SISTEMA")?,
            valued_usd_official: row.number("Valorizado en USD OFICIAL")?,
            valued_ars_official: row.number("Valorizado en $ a dolar oficial")?,
        })
    })
}

/// Reads a goal import. "Mes" is a number or a month name from `config`.
pub fn read_goals<R: Read>(reader: R, config: &EngineConfig) -> Result<Vec<SalesGoal>> {
    read_batch(reader, "goals", &GOAL_COLUMNS, |row| {
        let branch = row.upper("Sucursal");
        if branch.is_empty() {
            return Err(row.invalid("Sucursal"));
        }
        let year = row.integer("Año")? as i32;
        let month = goal_month(row.raw("Mes"), config).ok_or_else(|| row.invalid("Mes"))?;
        let goal_amount = row.number("Objetivo de ventas")?;
        let actual_amount = row.number("Venta final con impuestos").unwrap_or(0.0);

        SalesGoal::with_amounts(&branch, year, month, goal_amount, actual_amount).map_err(|e| {
            match e {
                AnalyticsError::InvalidMonth(_) => row.invalid("Mes"),
                AnalyticsError::InvalidGoal(_) if !(2000..=2100).contains(&year) => {
                    row.invalid("Año")
                }
                _ => row.invalid("Objetivo de ventas"),
            }
        })
    })
}

fn goal_month(raw: &str, config: &EngineConfig) -> Option<u32> {
    let trimmed = raw.trim();
    if let Some(number) = parse_es_ar_number(trimmed) {
        let month = number.trunc();
        return (1.0..=12.0).contains(&month).then_some(month as u32);
    }
    let lower = trimmed.to_lowercase();
    config
        .month_names
        .iter()
        .position(|name| name.to_lowercase() == lower)
        .map(|idx| idx as u32 + 1)
}
