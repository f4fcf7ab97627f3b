//! Axum + Askama web UI for Mumbai Rent Compare.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use mrc_core::{Badge, RankedListing, REQUIRED_COLUMNS};
use mrc_pipeline::{
    apply_view, compare_areas, export_csv, format_rupees, format_rupees_opt, DatasetCache,
    LocalityTable, RankedTable, SortMode, ViewFilter, EXPORT_FILE_NAME,
};
use mrc_storage::{coerce_numeric, LoadError};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "mrc-web";

pub const DEFAULT_DATA_PATH: &str = "data/mmr_rent_data.csv";
pub const DEFAULT_FORM_URL: &str = "https://docs.google.com/forms/d/e/1FAIpQLSct8s0QCmkLDS73_S87vSHi4SihIef8Zxiy9QHCkl1PeXfxwg/viewform";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub workspace_root: PathBuf,
    pub data_path: PathBuf,
    pub port: u16,
    pub form_url: String,
}

impl WebConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            port: 8000,
            form_url: DEFAULT_FORM_URL.to_string(),
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::new(".");
        Self {
            data_path: std::env::var("MRC_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            port: std::env::var("MRC_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            form_url: std::env::var("MRC_FORM_URL").unwrap_or(defaults.form_url),
            workspace_root: defaults.workspace_root,
        }
    }

    /// Data path joined onto the workspace root unless already absolute.
    pub fn resolved_data_path(&self) -> PathBuf {
        self.workspace_root.join(&self.data_path)
    }
}

pub struct AppState {
    pub config: WebConfig,
    pub cache: DatasetCache,
}

impl AppState {
    pub fn new(config: WebConfig) -> Self {
        Self::with_localities(config, LocalityTable::builtin())
    }

    pub fn with_localities(config: WebConfig, localities: LocalityTable) -> Self {
        Self {
            config,
            cache: DatasetCache::new(localities),
        }
    }
}

/// Pages reachable through the `page` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Home,
    Form,
}

impl Route {
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("form") => Route::Form,
            _ => Route::Home,
        }
    }
}

/// Everything the dashboard reads from the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardQuery {
    pub route: Route,
    pub filter: ViewFilter,
    pub compare_a: Option<String>,
    pub compare_b: Option<String>,
}

impl DashboardQuery {
    /// Unknown keys and unparseable values are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut query = DashboardQuery::default();
        for (key, value) in pairs {
            let value = value.trim();
            match key.as_str() {
                "page" => query.route = Route::from_param(Some(value)),
                "zone" if !value.is_empty() => query.filter.zones.push(value.to_string()),
                "min_rent" => query.filter.min_rent = coerce_numeric(value),
                "max_rent" => query.filter.max_rent = coerce_numeric(value),
                "q" => query.filter.search = value.to_string(),
                "group_by_zone" => {
                    query.filter.group_by_zone = matches!(value, "1" | "true" | "on")
                }
                "sort" => {
                    if let Some(mode) = SortMode::from_param(value) {
                        query.filter.sort = mode;
                    }
                }
                "a" if !value.is_empty() => query.compare_a = Some(value.to_string()),
                "b" if !value.is_empty() => query.compare_b = Some(value.to_string()),
                _ => {}
            }
        }
        query
    }

    /// Filter state as form fields, so other forms on the page can carry it.
    fn filter_fields(&self) -> Vec<HiddenField> {
        let mut fields = self
            .filter
            .zones
            .iter()
            .map(|z| HiddenField::new("zone", z.clone()))
            .collect::<Vec<_>>();
        if let Some(v) = self.filter.min_rent {
            fields.push(HiddenField::new("min_rent", v.to_string()));
        }
        if let Some(v) = self.filter.max_rent {
            fields.push(HiddenField::new("max_rent", v.to_string()));
        }
        if !self.filter.search.is_empty() {
            fields.push(HiddenField::new("q", self.filter.search.clone()));
        }
        if self.filter.group_by_zone {
            fields.push(HiddenField::new("group_by_zone", "1".to_string()));
        }
        fields.push(HiddenField::new("sort", self.filter.sort.param().to_string()));
        fields
    }

    fn compare_fields(&self) -> Vec<HiddenField> {
        [("a", &self.compare_a), ("b", &self.compare_b)]
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| HiddenField::new(name, v.clone())))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct HiddenField {
    name: &'static str,
    value: String,
}

impl HiddenField {
    fn new(name: &'static str, value: String) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone)]
struct SelectOption {
    value: String,
    label: String,
    selected: bool,
}

#[derive(Debug, Clone)]
struct MetricCard {
    value: String,
    help: String,
}

impl MetricCard {
    fn for_listing(row: Option<&RankedListing>) -> Self {
        match row {
            Some(r) => Self {
                value: format_rupees_opt(r.rent_median_1bhk),
                help: format!("{} • {}", r.area, r.zone),
            },
            None => Self {
                value: "n/a".to_string(),
                help: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct TableRow {
    rank: String,
    badge: String,
    zone: String,
    area: String,
    region: String,
    median: String,
    low: String,
    high: String,
    deposit: String,
}

impl From<&RankedListing> for TableRow {
    fn from(r: &RankedListing) -> Self {
        Self {
            rank: r.global_rank.map(|v| v.to_string()).unwrap_or_default(),
            badge: r.badge.map(Badge::display).unwrap_or_default(),
            zone: r.zone.clone(),
            area: r.area.clone(),
            region: r.region.clone(),
            median: format_rupees_opt(r.rent_median_1bhk),
            low: format_rupees_opt(r.rent_min_1bhk),
            high: format_rupees_opt(r.rent_max_1bhk),
            deposit: r.deposit_ratio.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompareCard {
    title: String,
    rank: String,
    badge: String,
    zone: String,
    region: String,
    median: String,
    range: String,
    deposit: String,
}

impl From<&RankedListing> for CompareCard {
    fn from(r: &RankedListing) -> Self {
        let row = TableRow::from(r);
        Self {
            title: row.area,
            rank: row.rank,
            badge: row.badge,
            zone: row.zone,
            region: row.region,
            median: row.median,
            range: format!("{} – {}", row.low, row.high),
            deposit: row.deposit,
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    legend: Vec<String>,
    total_areas: usize,
    cheapest: MetricCard,
    highest: MetricCard,
    zone_options: Vec<SelectOption>,
    sort_options: Vec<SelectOption>,
    rent_floor: String,
    rent_ceiling: String,
    min_rent: String,
    max_rent: String,
    search: String,
    group_by_zone: bool,
    rows: Vec<TableRow>,
    area_options_a: Vec<SelectOption>,
    area_options_b: Vec<SelectOption>,
    compare_cards: Vec<CompareCard>,
    filter_fields: Vec<HiddenField>,
    compare_fields: Vec<HiddenField>,
}

#[derive(Template)]
#[template(path = "form.html")]
struct FormTemplate {
    form_url: String,
}

#[derive(Template)]
#[template(path = "load_error.html")]
struct LoadErrorTemplate {
    message: String,
    hint: String,
}

#[derive(Serialize)]
struct ListingsResponse<'a> {
    content_hash: &'a str,
    total: usize,
    rows: Vec<&'a RankedListing>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/export.csv", get(export_handler))
        .route("/api/listings", get(listings_json_handler))
        .route("/reload", post(reload_handler))
        .route("/assets/static/app.css", get(app_css_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: WebConfig, localities: LocalityTable) -> anyhow::Result<()> {
    let port = config.port;
    let state = AppState::with_localities(config, localities);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, data = %state.config.resolved_data_path().display(), "mrc web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(WebConfig::from_env(), LocalityTable::from_env()?).await
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = DashboardQuery::from_pairs(&pairs);
    if query.route == Route::Form {
        return render_html(FormTemplate {
            form_url: state.config.form_url.clone(),
        });
    }
    match load_table(&state).await {
        Ok(table) => render_html(home_template(&table, &query)),
        Err(err) => load_error(&state, err),
    }
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = DashboardQuery::from_pairs(&pairs);
    let table = match load_table(&state).await {
        Ok(table) => table,
        Err(err) => return load_error(&state, err),
    };
    let rows = apply_view(&table, &query.filter);
    match export_csv(&rows) {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
                ),
            ],
            body,
        )
            .into_response(),
        Err(err) => server_error(err),
    }
}

async fn listings_json_handler(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let query = DashboardQuery::from_pairs(&pairs);
    match load_table(&state).await {
        Ok(table) => {
            let rows = apply_view(&table, &query.filter);
            Json(ListingsResponse {
                content_hash: &table.content_hash,
                total: table.rows.len(),
                rows,
            })
            .into_response()
        }
        Err(err) => load_error(&state, err),
    }
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> Redirect {
    state.cache.invalidate().await;
    Redirect::to("/")
}

async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.config.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

async fn load_table(state: &AppState) -> Result<Arc<RankedTable>, LoadError> {
    state.cache.load(state.config.resolved_data_path()).await
}

fn home_template(table: &RankedTable, query: &DashboardQuery) -> HomeTemplate {
    let filter = &query.filter;
    let (floor, ceiling) = table.rent_bounds().unwrap_or((0.0, 0.0));
    let rows = apply_view(table, filter);

    let zone_options = table
        .zones()
        .into_iter()
        .map(|zone| SelectOption {
            selected: filter.zones.contains(&zone),
            label: zone.clone(),
            value: zone,
        })
        .collect();
    let sort_options = SortMode::ALL
        .into_iter()
        .map(|mode| SelectOption {
            value: mode.param().to_string(),
            label: mode.label().to_string(),
            selected: mode == filter.sort,
        })
        .collect();

    let comparison = compare_areas(table, query.compare_a.as_deref(), query.compare_b.as_deref());
    let areas = table.areas();
    let area_options = |chosen: Option<&RankedListing>| {
        areas
            .iter()
            .map(|area| SelectOption {
                value: area.clone(),
                label: area.clone(),
                selected: chosen.is_some_and(|c| c.area == *area),
            })
            .collect::<Vec<_>>()
    };
    let area_options_a = area_options(comparison.map(|c| c.left));
    let area_options_b = area_options(comparison.map(|c| c.right));
    let compare_cards = comparison
        .map(|c| vec![CompareCard::from(c.left), CompareCard::from(c.right)])
        .unwrap_or_default();

    HomeTemplate {
        legend: Badge::ALL.into_iter().map(Badge::display).collect(),
        total_areas: table.rows.len(),
        cheapest: MetricCard::for_listing(table.cheapest()),
        highest: MetricCard::for_listing(table.highest()),
        zone_options,
        sort_options,
        rent_floor: format!("{floor:.0}"),
        rent_ceiling: format!("{ceiling:.0}"),
        min_rent: format!("{:.0}", filter.min_rent.unwrap_or(floor)),
        max_rent: format!("{:.0}", filter.max_rent.unwrap_or(ceiling)),
        search: filter.search.clone(),
        group_by_zone: filter.group_by_zone,
        rows: rows.into_iter().map(TableRow::from).collect(),
        area_options_a,
        area_options_b,
        compare_cards,
        filter_fields: query.filter_fields(),
        compare_fields: query.compare_fields(),
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn load_error(state: &AppState, err: LoadError) -> Response {
    let path = state.config.resolved_data_path();
    warn!(path = %path.display(), error = %err, "dataset load failed");
    let tpl = LoadErrorTemplate {
        message: err.to_string(),
        hint: load_error_hint(&path),
    };
    match tpl.render() {
        Ok(html) => (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response(),
        Err(render_err) => server_error(anyhow::anyhow!(render_err.to_string())),
    }
}

fn load_error_hint(path: &Path) -> String {
    format!(
        "Ensure '{}' exists and has the columns: {}",
        path.display(),
        REQUIRED_COLUMNS.join(", ")
    )
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
