use anyhow::Result;
use business_analytics_engine::*;
use chrono::NaiveDate;

const SALES_CSV: &str = "\
Suc;Tipo;Tipo Comp.;Cant;Fecha;Total;Cliente;ID VENDEDOR;Vendedor
Centro;Blanco;FACTURA A;2;05/02/2024;1.000,00;Cliente Uno;1;Ana
Centro;Negro;FACTURA B;1;20/03/2024;500,00;Cliente Dos;2;Luis
Centro;Blanco;NC A;1;21/03/2024;100,00;Cliente Dos;2;Luis
Norte;Blanco;FACTURA A;3;10/03/2024;2.000,00;Cliente Uno;1;Ana
Norte;Blanco;ND A;1;11/03/2024;50,00;Cliente Uno;1;Ana
Centro;Blanco;FACTURA A;1;15/03/2023;400,00;Cliente Uno;1;Ana
";

const GOALS_CSV: &str = "\
Sucursal;Año;Mes;Objetivo de ventas;Venta final con impuestos
Centro;2024;Marzo;500;0
Norte;2024;3;1.500;0
";

const PURCHASES_CSV: &str = "\
Fecha;Modalidad;Proveedor;Sin Impuestos;Otros Tributos;IVA;Con Impuestos
01/03/2024;Blanco;Acme;1.000,00;20,00;210,00;1.230,00
";

const EXPENSES_CSV: &str = "\
Fecha;Categoría;Subcategoría;Detalle;Monto
10/01/2024;Servicios;Luz;Edenor;1.000,50
15/01/2024;Servicios;Agua;Aysa;500
20/02/2024;Tributos y Tasas;Municipal;ABL;300
25/02/2024;Servicios;Luz;Edenor;1.200
";

const HR_CSV: &str = "\
Fecha;Legajo;Area;Actividad;Tipo;Fecha Ingreso;Fecha de Nacimiento;Fecha Baja
10/03/2024;100;Ventas;Vendedor;Ausencia;01/02/2020;15/06/1990;
12/03/2024;200;Deposito;Operario;Capacitacion;01/03/2024;01/01/2000;
";

const STOCK_CSV: &str = "\
Fecha;Rubro productos;Costo sin imp en $;Suc;Cotizacion Dolar Sistema;Cotizacion Dolar Oficial;Valorizado en USD SISTEMA;Valorizado en USD OFICIAL;Valorizado en $ a dolar oficial
31/03/2024;Bebidas;10.000,00;Centro;1.000,00;900,00;10,00;11,25;10.000,00
";

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn loaded_workspace(engine: &AnalyticsEngine) -> Result<Workspace> {
    let mut workspace = Workspace::new();
    workspace.apply_sales_upload(read_sales(SALES_CSV.as_bytes()), engine.normalizer())?;
    workspace.apply_purchases_upload(read_purchases(PURCHASES_CSV.as_bytes()))?;
    workspace.apply_expenses_upload(read_expenses(EXPENSES_CSV.as_bytes()))?;
    workspace.apply_hr_upload(read_hr(HR_CSV.as_bytes()))?;
    workspace.apply_stock_upload(read_stock(STOCK_CSV.as_bytes()))?;

    let goals = read_goals(GOALS_CSV.as_bytes(), engine.config())?;
    workspace.import_goals(goals, engine.normalizer());
    Ok(workspace)
}

fn dashboard_filters(workspace: &Workspace) -> DashboardFilters {
    DashboardFilters {
        expenses: workspace.default_expense_filters().unwrap_or_default(),
        hr: workspace.default_hr_filters().unwrap_or_default(),
        stock: workspace.default_stock_filters().unwrap_or_default(),
        ..DashboardFilters::default()
    }
}

#[test]
fn test_full_dashboard_from_csv_exports() -> Result<()> {
    let engine = AnalyticsEngine::new(EngineConfig::default())?;
    let workspace = loaded_workspace(&engine)?;
    let results = engine.analyze_workspace(&workspace, &dashboard_filters(&workspace));

    let sales = results.sales.as_ref().expect("sales analysis");
    // Credit note subtracts, debit note is ignored.
    assert!(approx(sales.kpis.total_revenue, 3800.0));
    assert_eq!(sales.kpis.credit_note_count, 1);
    assert_eq!(sales.kpis.debit_note_count, 1);
    assert!(approx(sales.by_branch.total_for("NORTE"), 2000.0));
    assert_eq!(sales.yearly_comparison.value(2023, 3), Some(400.0));
    assert_eq!(sales.yearly_comparison.value(2024, 3), Some(2400.0));

    let purchases = results.purchases.as_ref().expect("purchases analysis");
    assert!(approx(purchases.kpis.total_gross, 1230.0));
    assert!(approx(purchases.purchases_over_time[0].sales, 2400.0));
    assert!(approx(purchases.kpis.purchases_to_sales_ratio, 1230.0 / 2400.0));

    // Expenses default to the latest period (February 2024).
    let expenses = results.expenses.as_ref().expect("expenses analysis");
    assert!(approx(expenses.kpis.total_expenses, 1500.0));
    assert!(approx(expenses.kpis.tax_total, 300.0));
    assert!(approx(expenses.kpis.opex_total, 1200.0));
    assert_eq!(expenses.yearly_comparison.value(2024, 1), Some(1500.5));

    let hr = results.hr.as_ref().expect("hr analysis");
    assert!(hr.has_activity);
    assert_eq!(hr.roster.active_employees, 2);
    assert_eq!(hr.roster.hires_in_period, 1);
    assert_eq!(hr.activity.event_count, 2);

    let stock = results.stock.as_ref().expect("stock analysis");
    let stock_kpis = stock.kpis.as_ref().expect("stock kpis");
    assert_eq!(stock_kpis.period, PeriodKey::new(2024, 3)?);
    assert!(approx(stock_kpis.total_cost, 10_000.0));
    assert_eq!(stock.period_context[0].headcount, 2);
    assert!(approx(stock.period_context[0].sales, 2400.0));

    Ok(())
}

#[test]
fn test_goal_workflow() -> Result<()> {
    let engine = AnalyticsEngine::default();
    let mut workspace = loaded_workspace(&engine)?;

    let centro = workspace.goals().get("CENTRO-2024-3").expect("imported goal");
    assert!(approx(centro.actual_amount, 400.0));
    assert!(approx(centro.achievement(), 80.0));

    let mut filters = DashboardFilters::default();
    filters.sales.branches = Selection::only(["CENTRO".to_string()]);
    // Salesperson selection does not narrow goals.
    filters.sales.salespeople = Selection::only(["ANA".to_string()]);

    let results = engine.analyze_workspace(&workspace, &filters);
    let summary = results.goals.expect("goal summary");
    assert!(approx(summary.total_goal, 500.0));
    assert!(approx(summary.difference, -100.0));
    assert_eq!(results.goal_report.rows.len(), 1);
    assert_eq!(results.goal_report.rows[0].status, ComplianceStatus::OnTrack);

    assert!(workspace.add_goal("Centro", 2024, 3, 900.0).is_err());
    workspace.update_goal_target("CENTRO-2024-3", 400.0)?;
    workspace.add_goal("Norte", 2024, 4, 100.0)?;

    let report = engine.goal_report(
        workspace.goals().goals(),
        workspace.sales.records(),
        &SalesFilters::default(),
    );
    assert_eq!(report.rows.len(), 3);
    assert!(report
        .rows
        .iter()
        .filter(|r| r.branch == "CENTRO")
        .all(|r| r.status == ComplianceStatus::Achieved));

    workspace.remove_goal("NORTE-2024-4")?;
    assert_eq!(workspace.goals().len(), 2);
    Ok(())
}

#[test]
fn test_rejected_upload_keeps_previous_data() -> Result<()> {
    let engine = AnalyticsEngine::default();
    let mut workspace = loaded_workspace(&engine)?;
    let generations = workspace.generations();

    let missing_column = "Fecha;Categoría;Detalle;Monto\n01/01/2024;A;B;1\n";
    let err = workspace
        .apply_expenses_upload(read_expenses(missing_column.as_bytes()))
        .unwrap_err();
    assert!(matches!(err, AnalyticsError::MissingColumns { .. }));

    let bad_total = SALES_CSV.replace("2.000,00", "dos mil");
    let err = workspace
        .apply_sales_upload(read_sales(bad_total.as_bytes()), engine.normalizer())
        .unwrap_err();
    match err {
        AnalyticsError::InvalidValue { row, column, .. } => {
            assert_eq!(row, 5);
            assert_eq!(column, "Total");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(workspace.expenses.len(), 4);
    assert_eq!(workspace.sales.len(), 6);
    assert_eq!(workspace.generations(), generations);
    Ok(())
}

#[test]
fn test_expense_drill_down() -> Result<()> {
    let engine = AnalyticsEngine::default();
    let records = read_expenses(EXPENSES_CSV.as_bytes())?;
    let analysis = engine
        .analyze_expenses(&records, &ExpenseFilters::default())
        .expect("expenses analysis");

    let mut path = DrillPath::root();
    path.toggle_category("Servicios");
    let view = analysis.drill_down(&path, engine.config());
    assert!(approx(view.kpis.total_expenses, 2700.5));
    assert_eq!(view.distribution.len(), 2);

    path.toggle_subcategory("Luz");
    let view = analysis.drill_down(&path, engine.config());
    assert!(approx(view.details.total_for("Edenor"), 2200.5));
    assert_eq!(view.subcategories.len(), 2);

    path.toggle_category("Servicios");
    assert!(path.is_root());
    let view = analysis.drill_down(&path, engine.config());
    assert!(approx(view.kpis.total_expenses, 3000.5));
    Ok(())
}

#[test]
fn test_workspace_persistence_and_options() -> Result<()> {
    let engine = AnalyticsEngine::default();
    let workspace = loaded_workspace(&engine)?;

    let options = workspace.filter_options();
    assert_eq!(options.sales.branches, vec!["CENTRO", "NORTE"]);
    assert_eq!(options.sales.years, vec![2024, 2023]);
    assert_eq!(options.expenses.categories, vec!["Servicios", "Tributos y Tasas"]);

    let restored = Workspace::from_json(&workspace.to_json()?)?;
    let filters = dashboard_filters(&restored);
    assert_eq!(
        engine.analyze_workspace(&restored, &filters),
        engine.analyze_workspace(&workspace, &filters)
    );
    assert_eq!(restored.colors.get("CENTRO"), workspace.colors.get("CENTRO"));
    Ok(())
}

#[test]
fn test_filters_from_json() -> Result<()> {
    let filters = DashboardFilters::from_json_str(
        r#"{"sales": {"years": [2024], "start_date": "2024-03-01"}, "unknown": true}"#,
    )?;
    let engine = AnalyticsEngine::default();
    let sales = read_sales(SALES_CSV.as_bytes())?;
    let analysis = engine
        .analyze_sales(&sales, &filters.sales)
        .expect("sales analysis");
    assert!(approx(analysis.kpis.total_revenue, 2400.0));
    assert_eq!(
        analysis.sales_over_time[0].period.representative_date(),
        NaiveDate::from_ymd_opt(2024, 3, 15)
    );
    Ok(())
}
