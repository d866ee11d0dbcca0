use crate::periods::PeriodKey;
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a document was declared to the tax authority.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum FiscalType {
    #[schemars(description = "Declared ('blanco') document")]
    Declared,

    #[schemars(description = "Undeclared ('negro') document")]
    Undeclared,
}

impl FiscalType {
    /// "blanco" (any case) is declared; every other value is undeclared.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("blanco") {
            Self::Declared
        } else {
            Self::Undeclared
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Declared => "Blanco",
            Self::Undeclared => "Negro",
        }
    }
}

/// Anything that belongs to a calendar month.
pub trait Dated {
    fn date(&self) -> NaiveDate;

    fn period(&self) -> PeriodKey {
        PeriodKey::from_date(self.date())
    }

    fn year(&self) -> i32 {
        self.date().year()
    }

    fn month(&self) -> u32 {
        self.date().month()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SaleRecord {
    #[schemars(description = "Branch ('sucursal') that issued the document, upper-cased")]
    pub branch: String,

    #[schemars(
        description = "Document type as exported ('Tipo Comp.'). Classified into sale, credit note or debit note."
    )]
    pub document_type: String,

    pub quantity: i64,

    pub date: NaiveDate,

    #[schemars(
        description = "Document total as exported. Its sign is not trusted; the document type decides the contribution."
    )]
    pub total: f64,

    pub client: String,

    pub salesperson_id: u64,

    pub salesperson: String,

    pub fiscal_type: FiscalType,
}

impl Dated for SaleRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurchaseRecord {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub modality: FiscalType,
    pub provider: String,

    #[schemars(description = "Amount before taxes ('Sin Impuestos')")]
    pub net_amount: f64,

    #[schemars(description = "Other levies ('Otros Tributos')")]
    pub other_taxes: f64,

    #[schemars(description = "Value added tax ('IVA')")]
    pub vat: f64,

    #[schemars(
        description = "Amount with taxes ('Con Impuestos'). Roughly net + other taxes + VAT, never re-derived."
    )]
    pub gross_amount: f64,
}

impl PurchaseRecord {
    pub fn new(
        date: NaiveDate,
        modality: FiscalType,
        provider: impl Into<String>,
        net_amount: f64,
        other_taxes: f64,
        vat: f64,
        gross_amount: f64,
    ) -> Self {
        Self {
            date,
            year: date.year(),
            month: date.month(),
            modality,
            provider: provider.into(),
            net_amount,
            other_taxes,
            vat,
            gross_amount,
        }
    }
}

impl Dated for PurchaseRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn year(&self) -> i32 {
        self.year
    }

    fn month(&self) -> u32 {
        self.month
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseRecord {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub category: String,
    pub subcategory: String,

    #[schemars(description = "Concept or detail line of the expense")]
    pub detail: String,

    pub amount: f64,
}

impl ExpenseRecord {
    pub fn new(
        date: NaiveDate,
        category: impl Into<String>,
        subcategory: impl Into<String>,
        detail: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            date,
            year: date.year(),
            month: date.month(),
            category: category.into(),
            subcategory: subcategory.into(),
            detail: detail.into(),
            amount,
        }
    }
}

impl Dated for ExpenseRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn year(&self) -> i32 {
        self.year
    }

    fn month(&self) -> u32 {
        self.month
    }
}

/// One HR event (absence, overtime, training, ...) carrying the employee's roster data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HrRecord {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,

    #[schemars(description = "Employee identifier (file number or full name)")]
    pub employee: String,

    pub area: String,
    pub activity: String,

    #[schemars(description = "Event type ('Tipo')")]
    pub kind: String,

    pub entry_date: NaiveDate,
    pub birth_date: NaiveDate,
    pub termination_date: Option<NaiveDate>,
}

impl Dated for HrRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn year(&self) -> i32 {
        self.year
    }

    fn month(&self) -> u32 {
        self.month
    }
}

/// Monthly inventory snapshot for one branch and product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockRecord {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub branch: String,

    #[schemars(description = "Product category ('rubro')")]
    pub rubro: String,

    #[schemars(description = "Cost without taxes in pesos")]
    pub cost: f64,

    #[schemars(description = "USD exchange rate used by the internal system")]
    pub system_rate: f64,

    #[schemars(description = "Official USD exchange rate")]
    pub official_rate: f64,

    pub valued_usd_system: f64,
    pub valued_usd_official: f64,

    #[schemars(description = "Valuation in pesos at the official rate")]
    pub valued_ars_official: f64,
}

impl Dated for StockRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn year(&self) -> i32 {
        self.year
    }

    fn month(&self) -> u32 {
        self.month
    }
}
