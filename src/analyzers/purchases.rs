use crate::aggregate::{AggregateEntry, Aggregation, ShareEntry};
use crate::config::EngineConfig;
use crate::periods::{
    month_over_month_change, monthly_series, pivot_year_over_year, MonthlyPoint, PeriodKey,
    YearOverYear,
};
use crate::schema::{Dated, FiscalType, PurchaseRecord, SaleRecord};
use crate::sign::SignNormalizer;
use crate::utils::ratio;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurchasesKpis {
    pub total_gross: f64,
    pub total_net: f64,
    pub total_vat: f64,
    pub total_other_taxes: f64,
    /// Month-over-month % change of gross purchases.
    pub gross_change: f64,
    pub provider_count: usize,
    pub declared_gross: f64,
    pub undeclared_gross: f64,
    /// Gross purchases over net sales of the same year-months. Zero without sales.
    pub purchases_to_sales_ratio: f64,
}

/// Purchases of one year-month next to the net sales of that same year-month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurchasePoint {
    pub period: PeriodKey,
    pub label: String,
    pub gross: f64,
    pub net: f64,
    pub sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurchasesAnalysis {
    pub kpis: PurchasesKpis,
    pub purchases_over_time: Vec<PurchasePoint>,
    pub by_provider: Aggregation,
    pub top_providers: Vec<AggregateEntry>,
    /// Top providers plus an "other" slice.
    pub provider_distribution: Vec<ShareEntry>,
    pub modality_shares: Vec<ShareEntry>,
    /// Net, other taxes and VAT as shares of their sum.
    pub tax_composition: Vec<ShareEntry>,
    pub yearly_comparison: YearOverYear,
}

/// Analyzes the filtered purchases, overlaying the net sales of every period
/// that appears in them. `None` when nothing passed the filters.
pub fn analyze_purchases(
    filtered: &[PurchaseRecord],
    all_sales: &[SaleRecord],
    normalizer: &SignNormalizer,
    config: &EngineConfig,
) -> Option<PurchasesAnalysis> {
    if filtered.is_empty() {
        return None;
    }

    debug!(
        "Analyzing {} purchase records against {} sales records",
        filtered.len(),
        all_sales.len()
    );

    let gross_series = monthly_series(filtered, |r| r.gross_amount, config);
    let net_by_period: BTreeMap<PeriodKey, f64> = monthly_series(filtered, |r| r.net_amount, config)
        .into_iter()
        .map(|p| (p.period, p.value))
        .collect();

    let sales_by_period = sales_index(all_sales, normalizer);

    let purchases_over_time: Vec<PurchasePoint> = gross_series
        .iter()
        .map(|point| PurchasePoint {
            period: point.period,
            label: point.label.clone(),
            gross: point.value,
            net: net_by_period.get(&point.period).copied().unwrap_or(0.0),
            sales: sales_by_period.get(&point.period).copied().unwrap_or(0.0),
        })
        .collect();

    let kpis = purchases_kpis(filtered, &gross_series, &purchases_over_time);

    let by_provider = Aggregation::group_sum(
        filtered,
        |r| config.label_or_missing(&r.provider),
        |r| r.gross_amount,
    );
    let by_modality = Aggregation::group_sum(
        filtered,
        |r| r.modality.label().to_string(),
        |r| r.gross_amount,
    );

    Some(PurchasesAnalysis {
        top_providers: by_provider.top(config.top_n),
        provider_distribution: by_provider
            .top_shares_with_other(config.pie_slices, &config.other_label),
        modality_shares: by_modality.shares(),
        tax_composition: tax_composition(&kpis),
        yearly_comparison: pivot_year_over_year(&gross_series, config),
        purchases_over_time,
        by_provider,
        kpis,
    })
}

/// Net sales per year-month, built once so the overlay is a keyed lookup.
fn sales_index(sales: &[SaleRecord], normalizer: &SignNormalizer) -> HashMap<PeriodKey, f64> {
    let mut index: HashMap<PeriodKey, f64> = HashMap::new();
    for record in sales {
        *index.entry(record.period()).or_insert(0.0) += normalizer.signed_total(record);
    }
    index
}

fn purchases_kpis(
    filtered: &[PurchaseRecord],
    gross_series: &[MonthlyPoint],
    overlay: &[PurchasePoint],
) -> PurchasesKpis {
    let mut total_gross = 0.0;
    let mut total_net = 0.0;
    let mut total_vat = 0.0;
    let mut total_other_taxes = 0.0;
    let mut declared_gross = 0.0;
    let mut undeclared_gross = 0.0;

    for record in filtered {
        total_gross += record.gross_amount;
        total_net += record.net_amount;
        total_vat += record.vat;
        total_other_taxes += record.other_taxes;
        match record.modality {
            FiscalType::Declared => declared_gross += record.gross_amount,
            FiscalType::Undeclared => undeclared_gross += record.gross_amount,
        }
    }

    let providers: HashSet<&str> = filtered.iter().map(|r| r.provider.as_str()).collect();
    let overlay_sales: f64 = overlay.iter().map(|p| p.sales).sum();

    PurchasesKpis {
        total_gross,
        total_net,
        total_vat,
        total_other_taxes,
        gross_change: month_over_month_change(gross_series),
        provider_count: providers.len(),
        declared_gross,
        undeclared_gross,
        purchases_to_sales_ratio: if overlay_sales > 0.0 {
            ratio(total_gross, overlay_sales)
        } else {
            0.0
        },
    }
}

fn tax_composition(kpis: &PurchasesKpis) -> Vec<ShareEntry> {
    let parts = [
        ("Neto", kpis.total_net),
        ("Otros Tributos", kpis.total_other_taxes),
        ("IVA", kpis.total_vat),
    ];
    let total: f64 = parts.iter().map(|(_, v)| v).sum();
    if total == 0.0 {
        return Vec::new();
    }

    parts
        .iter()
        .map(|(name, value)| ShareEntry {
            name: name.to_string(),
            value: *value,
            percentage: value / total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn purchase(date: NaiveDate, provider: &str, modality: FiscalType, net: f64) -> PurchaseRecord {
        let other = net * 0.02;
        let vat = net * 0.21;
        PurchaseRecord::new(date, modality, provider, net, other, vat, net + other + vat)
    }

    fn sale(date: NaiveDate, doc: &str, total: f64) -> SaleRecord {
        SaleRecord {
            branch: "A".to_string(),
            document_type: doc.to_string(),
            quantity: 1,
            date,
            total,
            client: "C".to_string(),
            salesperson_id: 1,
            salesperson: "ANA".to_string(),
            fiscal_type: FiscalType::Declared,
        }
    }

    #[test]
    fn test_empty_filtered_set_has_no_analysis() {
        let analysis = analyze_purchases(
            &[],
            &[],
            &SignNormalizer::default(),
            &EngineConfig::default(),
        );
        assert!(analysis.is_none());
    }

    #[test]
    fn test_kpis_use_the_recorded_amounts() {
        let mut odd = purchase(d(2024, 1, 10), "ACME", FiscalType::Declared, 100.0);
        odd.gross_amount = 130.0;
        let records = vec![
            odd,
            purchase(d(2024, 2, 10), "BETA", FiscalType::Undeclared, 200.0),
        ];

        let analysis = analyze_purchases(
            &records,
            &[],
            &SignNormalizer::default(),
            &EngineConfig::default(),
        )
        .unwrap();

        assert!((analysis.kpis.total_gross - (130.0 + 246.0)).abs() < 1e-6);
        assert!((analysis.kpis.total_net - 300.0).abs() < 1e-6);
        assert!((analysis.kpis.declared_gross - 130.0).abs() < 1e-6);
        assert_eq!(analysis.kpis.provider_count, 2);
        assert_eq!(analysis.kpis.purchases_to_sales_ratio, 0.0);
        assert_eq!(analysis.top_providers[0].name, "BETA");

        let composition: f64 = analysis.tax_composition.iter().map(|s| s.percentage).sum();
        assert!((composition - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sales_overlay_joins_by_period() {
        let records = vec![
            purchase(d(2024, 1, 10), "ACME", FiscalType::Declared, 100.0),
            purchase(d(2024, 3, 10), "ACME", FiscalType::Declared, 100.0),
        ];
        let sales = vec![
            sale(d(2024, 1, 2), "FACTURA", 500.0),
            sale(d(2024, 1, 3), "NC", 100.0),
            sale(d(2024, 2, 3), "FACTURA", 999.0),
            sale(d(2024, 3, 3), "ND", 50.0),
        ];

        let analysis = analyze_purchases(
            &records,
            &sales,
            &SignNormalizer::default(),
            &EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(analysis.purchases_over_time.len(), 2);
        assert_eq!(analysis.purchases_over_time[0].sales, 400.0);
        assert_eq!(analysis.purchases_over_time[1].sales, 0.0);
        assert!((analysis.kpis.purchases_to_sales_ratio - 246.0 / 400.0).abs() < 1e-9);
    }
}
