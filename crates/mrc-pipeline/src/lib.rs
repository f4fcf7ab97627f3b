//! Ranking pipeline for MRC: deposit normalization, proximity scoring, dense
//! ranking, view filtering, CSV export and the content-hash keyed dataset cache.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use mrc_core::{Badge, ListingRecord, RankedListing};
use mrc_storage::{DatasetFile, LoadError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const CRATE_NAME: &str = "mrc-pipeline";

pub const DEFAULT_DEPOSIT_MONTHS: f64 = 4.0;

pub const SOUTH_DEFAULT_SCORE: u32 = 0;
pub const WESTERN_DEFAULT_SCORE: u32 = 50;
pub const CENTRAL_DEFAULT_SCORE: u32 = 50;
pub const HARBOUR_DEFAULT_SCORE: u32 = 30;
pub const NAVI_DEFAULT_SCORE: u32 = 40;
pub const UNCLASSIFIED_SCORE: u32 = 60;

pub const EXPORT_FILE_NAME: &str = "mumbai_rent_compare_filtered.csv";
pub const EXPORT_COLUMNS: [&str; 9] = [
    "rank",
    "zone",
    "area",
    "region",
    "median_1bhk",
    "low",
    "high",
    "deposit_ratio",
    "rank_badge",
];

fn deposit_multiple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*x").expect("valid deposit multiple regex"))
}

fn bare_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"))
}

/// Months-of-rent equivalent of a free-text deposit descriptor.
///
/// `"3x"` wins over any other number in the string; otherwise the first number
/// is used; anything else falls back to [`DEFAULT_DEPOSIT_MONTHS`].
pub fn parse_deposit_ratio(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return DEFAULT_DEPOSIT_MONTHS;
    };
    let text = raw.trim().to_lowercase();

    if let Some(value) = deposit_multiple_re()
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return value;
    }
    bare_number_re()
        .find(&text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(DEFAULT_DEPOSIT_MONTHS)
}

/// Ordered locality lists used by the proximity scorer. Earlier names count
/// as closer within their group.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalityTable {
    pub south: Vec<String>,
    pub western: Vec<String>,
    pub central: Vec<String>,
    pub harbour: Vec<String>,
    pub navi: Vec<String>,
}

impl Default for LocalityTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl LocalityTable {
    pub fn builtin() -> Self {
        Self {
            south: owned(&[
                "Lower Parel",
                "Worli",
                "Prabhadevi",
                "Mahim",
                "Wadala",
                "Cuffe Parade",
                "Malabar Hill",
                "Colaba",
            ]),
            western: owned(&[
                "Bandra",
                "Khar",
                "Santacruz",
                "Andheri",
                "Jogeshwari",
                "Goregaon",
                "Malad",
                "Kandivali",
                "Borivali",
                "Dahisar",
                "Mira Road",
                "Bhayander",
                "Vasai",
                "Naigaon",
                "Nalasopara",
                "Virar",
            ]),
            central: owned(&[
                "Dadar",
                "Matunga",
                "Sion",
                "Kurla",
                "Ghatkopar",
                "Vikhroli",
                "Bhandup",
                "Mulund",
                "Thane",
                "Kalwa",
                "Mumbra",
                "Diva",
                "Dombivli",
                "Kalyan",
                "Ambernath",
                "Badlapur",
                "Vangani",
                "Titwala",
            ]),
            harbour: owned(&["Chembur", "Govandi", "Mankhurd"]),
            navi: owned(&[
                "Vashi",
                "Airoli",
                "Kopar Khairane",
                "Ghansoli",
                "Turbhe",
                "Sanpada",
                "Seawoods",
                "Nerul",
                "Belapur",
                "Kharghar",
                "Kamothe",
                "Ulwe",
                "New Panvel",
                "Panvel",
                "Taloja",
            ]),
        }
    }

    /// Keys missing from the document keep their built-in list.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing locality yaml")
    }

    pub fn from_yaml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Built-in lists unless `MRC_LOCALITIES` points at a YAML override.
    pub fn from_env() -> Result<Self> {
        match std::env::var("MRC_LOCALITIES") {
            Ok(path) if !path.trim().is_empty() => Self::from_yaml_path(Path::new(path.trim())),
            _ => Ok(Self::builtin()),
        }
    }

    /// Small integer closeness score; the first matching group wins.
    pub fn proximity_score(&self, area: &str, region: &str) -> u32 {
        let a = area.to_lowercase();
        let r = region.to_lowercase();

        let idx = first_match(&a, &self.south);
        if r.contains("south") || idx.is_some() {
            return idx.unwrap_or(SOUTH_DEFAULT_SCORE);
        }
        let idx = first_match(&a, &self.western);
        if r.contains("western") || idx.is_some() {
            return idx.unwrap_or(WESTERN_DEFAULT_SCORE);
        }
        let idx = first_match(&a, &self.central);
        if r.contains("central") || idx.is_some() {
            return idx.unwrap_or(CENTRAL_DEFAULT_SCORE);
        }
        if r.contains("harbour") || a.contains("chembur") {
            return first_match(&a, &self.harbour).unwrap_or(HARBOUR_DEFAULT_SCORE);
        }
        let idx = first_match(&a, &self.navi);
        if r.contains("navi") || idx.is_some() {
            return idx.unwrap_or(NAVI_DEFAULT_SCORE);
        }
        UNCLASSIFIED_SCORE
    }
}

fn first_match(area_lower: &str, names: &[String]) -> Option<u32> {
    names
        .iter()
        .position(|name| area_lower.contains(&name.to_lowercase()))
        .map(|i| i as u32)
}

fn cmp_nulls_last<T>(a: Option<T>, b: Option<T>, cmp: impl FnOnce(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn median_asc(a: &RankedListing, b: &RankedListing) -> Ordering {
    cmp_nulls_last(a.rent_median_1bhk, b.rent_median_1bhk, |x, y| x.total_cmp(&y))
}

fn median_desc(a: &RankedListing, b: &RankedListing) -> Ordering {
    cmp_nulls_last(a.rent_median_1bhk, b.rent_median_1bhk, |x, y| y.total_cmp(&x))
}

fn rank_asc(a: &RankedListing, b: &RankedListing) -> Ordering {
    cmp_nulls_last(a.global_rank, b.global_rank, |x, y| x.cmp(&y))
}

/// Blank zones group after every named zone.
fn zone_key(row: &RankedListing) -> Option<&str> {
    Some(row.zone.as_str()).filter(|z| !z.is_empty())
}

/// `(median, deposit months, proximity, area)`, all ascending.
fn ranking_order(a: &RankedListing, b: &RankedListing) -> Ordering {
    median_asc(a, b)
        .then_with(|| a.deposit_months_min.total_cmp(&b.deposit_months_min))
        .then_with(|| a.proximity_score.cmp(&b.proximity_score))
        .then_with(|| a.area.cmp(&b.area))
}

fn normalize(record: ListingRecord, localities: &LocalityTable) -> RankedListing {
    let deposit_months_min = parse_deposit_ratio(record.deposit_ratio.as_deref());
    let proximity_score = localities.proximity_score(&record.area, &record.region);
    RankedListing {
        zone: record.zone,
        area: record.area,
        region: record.region,
        rent_median_1bhk: record.rent_median_1bhk,
        rent_min_1bhk: record.rent_min_1bhk,
        rent_max_1bhk: record.rent_max_1bhk,
        deposit_ratio: record.deposit_ratio,
        deposit_months_min,
        proximity_score,
        global_rank: None,
        badge: None,
    }
}

/// Normalize, score, sort and rank. Output is in ranking order; `global_rank`
/// is a dense rank over median rent alone.
pub fn rank_listings(records: Vec<ListingRecord>, localities: &LocalityTable) -> Vec<RankedListing> {
    let mut rows = records
        .into_iter()
        .map(|r| normalize(r, localities))
        .collect::<Vec<_>>();
    rows.sort_by(ranking_order);

    let mut rank = 0u32;
    let mut previous: Option<f64> = None;
    for row in &mut rows {
        let Some(median) = row.rent_median_1bhk else {
            continue;
        };
        if previous != Some(median) {
            rank += 1;
            previous = Some(median);
        }
        row.global_rank = Some(rank);
        row.badge = Badge::from_rank(row.global_rank);
    }
    rows
}

/// Frozen, fully derived snapshot of one dataset file.
#[derive(Debug, Clone)]
pub struct RankedTable {
    pub source_path: PathBuf,
    pub content_hash: String,
    pub rows: Vec<RankedListing>,
}

impl RankedTable {
    pub fn from_records(
        source_path: impl Into<PathBuf>,
        content_hash: impl Into<String>,
        records: Vec<ListingRecord>,
        localities: &LocalityTable,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            content_hash: content_hash.into(),
            rows: rank_listings(records, localities),
        }
    }

    pub fn zones(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| !r.zone.is_empty())
            .map(|r| r.zone.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn areas(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| !r.area.is_empty())
            .map(|r| r.area.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Lowest and highest median rent in the dataset.
    pub fn rent_bounds(&self) -> Option<(f64, f64)> {
        let mut medians = self.rows.iter().filter_map(|r| r.rent_median_1bhk);
        let first = medians.next()?;
        Some(medians.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    pub fn cheapest(&self) -> Option<&RankedListing> {
        self.rows.iter().find(|r| r.rent_median_1bhk.is_some())
    }

    pub fn highest(&self) -> Option<&RankedListing> {
        self.rows.iter().rev().find(|r| r.rent_median_1bhk.is_some())
    }

    /// First row carrying `area`, in ranking order.
    pub fn find_area(&self, area: &str) -> Option<&RankedListing> {
        self.rows.iter().find(|r| r.area == area)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    GlobalRank,
    MedianAsc,
    MedianDesc,
    AreaAlphabetical,
}

impl SortMode {
    pub const ALL: [SortMode; 4] = [
        SortMode::GlobalRank,
        SortMode::MedianAsc,
        SortMode::MedianDesc,
        SortMode::AreaAlphabetical,
    ];

    pub fn param(self) -> &'static str {
        match self {
            SortMode::GlobalRank => "rank",
            SortMode::MedianAsc => "median_asc",
            SortMode::MedianDesc => "median_desc",
            SortMode::AreaAlphabetical => "area",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortMode::GlobalRank => "Global Rank (asc)",
            SortMode::MedianAsc => "Median 1BHK (asc)",
            SortMode::MedianDesc => "Median 1BHK (desc)",
            SortMode::AreaAlphabetical => "Area (A→Z)",
        }
    }

    pub fn from_param(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.param() == value.trim())
    }
}

/// User-chosen filter and sort state for one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewFilter {
    pub zones: Vec<String>,
    pub min_rent: Option<f64>,
    pub max_rent: Option<f64>,
    pub search: String,
    pub group_by_zone: bool,
    pub sort: SortMode,
}

impl ViewFilter {
    /// Rows without a median rent never fall inside a rent range.
    pub fn matches(&self, row: &RankedListing) -> bool {
        let Some(median) = row.rent_median_1bhk else {
            return false;
        };
        if self.min_rent.is_some_and(|lo| median < lo) || self.max_rent.is_some_and(|hi| median > hi) {
            return false;
        }
        if !self.zones.is_empty() && !self.zones.iter().any(|z| *z == row.zone) {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty() || row.area.to_lowercase().contains(&needle)
    }

    fn order(&self, a: &RankedListing, b: &RankedListing) -> Ordering {
        if self.group_by_zone {
            return cmp_nulls_last(zone_key(a), zone_key(b), |x, y| x.cmp(y))
                .then_with(|| ranking_order(a, b));
        }
        match self.sort {
            SortMode::GlobalRank => rank_asc(a, b).then_with(|| a.area.cmp(&b.area)),
            SortMode::MedianAsc => median_asc(a, b).then_with(|| a.area.cmp(&b.area)),
            SortMode::MedianDesc => median_desc(a, b).then_with(|| a.area.cmp(&b.area)),
            SortMode::AreaAlphabetical => a.area.cmp(&b.area),
        }
    }
}

/// Filtered and sorted view over the table; stored rows are never touched.
pub fn apply_view<'a>(table: &'a RankedTable, filter: &ViewFilter) -> Vec<&'a RankedListing> {
    let mut rows = table
        .rows
        .iter()
        .filter(|r| filter.matches(r))
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| filter.order(a, b));
    rows
}

#[derive(Debug, Clone, Copy)]
pub struct Comparison<'a> {
    pub left: &'a RankedListing,
    pub right: &'a RankedListing,
}

/// Look up two areas side by side. Unknown or absent names fall back to the
/// first and second entries of the alphabetical area list.
pub fn compare_areas<'a>(
    table: &'a RankedTable,
    a: Option<&str>,
    b: Option<&str>,
) -> Option<Comparison<'a>> {
    let areas = table.areas();
    let default_a = areas.first()?;
    let default_b = areas.get(1).unwrap_or(default_a);

    let pick = |wanted: Option<&str>, fallback: &str| {
        wanted
            .and_then(|name| table.find_area(name))
            .or_else(|| table.find_area(fallback))
    };
    Some(Comparison {
        left: pick(a, default_a.as_str())?,
        right: pick(b, default_b.as_str())?,
    })
}

/// One line of the downloadable CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub rank: Option<u32>,
    pub zone: String,
    pub area: String,
    pub region: String,
    pub median_1bhk: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub deposit_ratio: Option<String>,
    pub rank_badge: String,
}

impl From<&RankedListing> for ExportRow {
    fn from(row: &RankedListing) -> Self {
        Self {
            rank: row.global_rank,
            zone: row.zone.clone(),
            area: row.area.clone(),
            region: row.region.clone(),
            median_1bhk: row.rent_median_1bhk,
            low: row.rent_min_1bhk,
            high: row.rent_max_1bhk,
            deposit_ratio: row.deposit_ratio.clone(),
            rank_badge: row.badge_label().to_string(),
        }
    }
}

pub fn write_export<W: Write>(rows: &[&RankedListing], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer
        .write_record(EXPORT_COLUMNS)
        .context("writing export header")?;
    for row in rows {
        csv_writer
            .serialize(ExportRow::from(*row))
            .with_context(|| format!("writing export row for {}", row.area))?;
    }
    csv_writer.flush().context("flushing export")?;
    Ok(())
}

pub fn export_csv(rows: &[&RankedListing]) -> Result<String> {
    let mut buf = Vec::new();
    write_export(rows, &mut buf)?;
    String::from_utf8(buf).context("export is not utf-8")
}

pub fn read_export(bytes: &[u8]) -> Result<Vec<ExportRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<ExportRow>, _>>()
        .context("parsing export csv")
}

/// `₹20,000` style rendering of the integer part.
pub fn format_rupees(value: f64) -> String {
    let whole = value.trunc() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-₹{grouped}")
    } else {
        format!("₹{grouped}")
    }
}

pub fn format_rupees_opt(value: Option<f64>) -> String {
    value.map(format_rupees).unwrap_or_default()
}

/// Derived tables keyed by data path; an entry is reused only while the file's
/// content hash is unchanged.
#[derive(Debug)]
pub struct DatasetCache {
    localities: LocalityTable,
    entries: Mutex<HashMap<PathBuf, Arc<RankedTable>>>,
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self::new(LocalityTable::builtin())
    }
}

impl DatasetCache {
    pub fn new(localities: LocalityTable) -> Self {
        Self {
            localities,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn localities(&self) -> &LocalityTable {
        &self.localities
    }

    pub async fn load(&self, path: impl AsRef<Path>) -> std::result::Result<Arc<RankedTable>, LoadError> {
        let file = DatasetFile::read(path.as_ref()).await?;
        let mut entries = self.entries.lock().await;

        if let Some(table) = entries.get(&file.path) {
            if table.content_hash == file.content_hash {
                debug!(path = %file.path.display(), hash = %file.content_hash, "dataset cache hit");
                return Ok(Arc::clone(table));
            }
        }

        let records = file.parse()?;
        let table = Arc::new(RankedTable::from_records(
            file.path.clone(),
            file.content_hash.clone(),
            records,
            &self.localities,
        ));
        info!(
            path = %file.path.display(),
            hash = %file.content_hash,
            rows = table.rows.len(),
            "dataset derived"
        );
        entries.insert(file.path, Arc::clone(&table));
        Ok(table)
    }

    pub async fn invalidate(&self) {
        let mut entries = self.entries.lock().await;
        let dropped = entries.len();
        entries.clear();
        info!(dropped, "dataset cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(zone: &str, area: &str, region: &str, median: Option<f64>, deposit: Option<&str>) -> ListingRecord {
        ListingRecord {
            zone: zone.into(),
            area: area.into(),
            region: region.into(),
            rent_median_1bhk: median,
            rent_min_1bhk: median.map(|m| m - 5000.0),
            rent_max_1bhk: median.map(|m| m + 5000.0),
            deposit_ratio: deposit.map(String::from),
        }
    }

    fn table(records: Vec<ListingRecord>) -> RankedTable {
        RankedTable::from_records("data.csv", "hash", records, &LocalityTable::builtin())
    }

    fn sample_table() -> RankedTable {
        table(vec![
            record("Western", "Bandra West", "Western Suburbs", Some(65000.0), Some("3x")),
            record("Western", "Malad West", "Western Suburbs", Some(28000.0), Some("2 months")),
            record("Central", "Thane West", "Central Line", Some(22000.0), Some("3x")),
            record("Central", "Dombivli East", "Central Line", Some(14000.0), None),
            record("Navi Mumbai", "Vashi", "Navi Mumbai", Some(28000.0), Some("3x")),
            record("South", "Worli", "South Mumbai", Some(90000.0), Some("4x")),
            record("Harbour", "Chembur", "Harbour Line", None, Some("3x")),
        ])
    }

    #[test]
    fn deposit_parser_examples() {
        assert_eq!(parse_deposit_ratio(Some("3x")), 3.0);
        assert_eq!(parse_deposit_ratio(Some("3X")), 3.0);
        assert_eq!(parse_deposit_ratio(Some("2.5x rent")), 2.5);
        assert_eq!(parse_deposit_ratio(Some("3 x")), 3.0);
        assert_eq!(parse_deposit_ratio(Some("2.5 months")), 2.5);
        assert_eq!(parse_deposit_ratio(Some("1 to 2x")), 2.0);
        assert_eq!(parse_deposit_ratio(Some("three months")), 4.0);
        assert_eq!(parse_deposit_ratio(Some("")), 4.0);
        assert_eq!(parse_deposit_ratio(None), 4.0);
    }

    #[test]
    fn proximity_follows_group_precedence() {
        let localities = LocalityTable::builtin();
        assert_eq!(localities.proximity_score("Bandra West", "Western Suburbs"), 0);
        assert_eq!(localities.proximity_score("Worli", ""), 1);
        assert_eq!(localities.proximity_score("Nariman Point", "South Mumbai"), 0);
        assert_eq!(localities.proximity_score("Goregaon East", ""), 5);
        assert_eq!(localities.proximity_score("Oshiwara", "Western Suburbs"), 50);
        assert_eq!(localities.proximity_score("Thane West", "Central Line"), 8);
        assert_eq!(localities.proximity_score("Powai", "Central Suburbs"), 50);
        assert_eq!(localities.proximity_score("Chembur East", ""), 0);
        assert_eq!(localities.proximity_score("Trombay", "Harbour Line"), 30);
        assert_eq!(localities.proximity_score("Nerul", ""), 7);
        assert_eq!(localities.proximity_score("Dronagiri", "Navi Mumbai"), 40);
        assert_eq!(localities.proximity_score("Lonavala", "Pune Road"), 60);
    }

    #[test]
    fn south_match_beats_region_label() {
        let localities = LocalityTable::builtin();
        assert_eq!(localities.proximity_score("Mahim West", "Western Suburbs"), 3);
    }

    #[test]
    fn locality_yaml_overrides_only_named_groups() {
        let localities = LocalityTable::from_yaml_str("harbour:\n  - Mankhurd\n  - Chembur\n").unwrap();
        assert_eq!(localities.harbour, vec!["Mankhurd", "Chembur"]);
        assert_eq!(localities.western, LocalityTable::builtin().western);
        assert_eq!(localities.proximity_score("Chembur", "Harbour Line"), 1);
    }

    #[test]
    fn locality_yaml_reads_from_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("localities.yaml");
        std::fs::write(&path, "navi:\n  - Ulwe\n").expect("write");
        let localities = LocalityTable::from_yaml_path(&path).unwrap();
        assert_eq!(localities.proximity_score("Ulwe Node", ""), 0);
        assert!(LocalityTable::from_yaml_path(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn dense_rank_example() {
        let t = table(vec![
            record("A", "Area One", "", Some(20000.0), None),
            record("A", "Area Two", "", Some(20000.0), None),
            record("A", "Area Three", "", Some(25000.0), None),
        ]);
        let ranks = t.rows.iter().map(|r| r.global_rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![Some(1), Some(1), Some(2)]);
        assert_eq!(t.rows[0].badge, Some(Badge::Budget));
        assert_eq!(t.rows[1].badge, Some(Badge::Budget));
    }

    #[test]
    fn ranking_order_uses_deposit_then_proximity_then_area() {
        let t = sample_table();
        let areas = t.rows.iter().map(|r| r.area.as_str()).collect::<Vec<_>>();
        assert_eq!(
            areas,
            vec![
                "Dombivli East",
                "Thane West",
                "Malad West",
                "Vashi",
                "Bandra West",
                "Worli",
                "Chembur"
            ]
        );
        let malad = t.find_area("Malad West").unwrap();
        let vashi = t.find_area("Vashi").unwrap();
        assert_eq!(malad.global_rank, vashi.global_rank);
        assert_eq!(malad.deposit_months_min, 2.0);
    }

    #[test]
    fn dense_rank_has_no_gaps_and_badge_tracks_rank() {
        let records = (0..60)
            .map(|i| record("Z", &format!("Area {i:02}"), "", Some(10000.0 + (i / 2) as f64 * 500.0), None))
            .collect::<Vec<_>>();
        let t = table(records);
        let mut last = 0;
        for row in &t.rows {
            let rank = row.global_rank.unwrap();
            assert!(rank == last || rank == last + 1, "gap after {last}");
            last = rank;
            assert_eq!(row.badge, Some(Badge::for_rank(rank)));
        }
        assert_eq!(last, 30);
    }

    #[test]
    fn unranked_rows_sort_last_without_badge() {
        let t = sample_table();
        let chembur = t.rows.last().unwrap();
        assert_eq!(chembur.area, "Chembur");
        assert_eq!(chembur.global_rank, None);
        assert_eq!(chembur.badge_label(), "");
        for row in &t.rows {
            assert_eq!(row.badge.is_some(), row.global_rank.is_some());
        }
    }

    #[test]
    fn table_summaries() {
        let t = sample_table();
        assert_eq!(t.zones(), vec!["Central", "Harbour", "Navi Mumbai", "South", "Western"]);
        assert_eq!(t.rent_bounds(), Some((14000.0, 90000.0)));
        assert_eq!(t.cheapest().unwrap().area, "Dombivli East");
        assert_eq!(t.highest().unwrap().area, "Worli");
    }

    #[test]
    fn rent_range_is_inclusive_and_intersects_other_filters() {
        let t = sample_table();
        let filter = ViewFilter {
            min_rent: Some(22000.0),
            max_rent: Some(65000.0),
            ..Default::default()
        };
        let rows = apply_view(&t, &filter);
        let mut areas = rows.iter().map(|r| r.area.as_str()).collect::<Vec<_>>();
        areas.sort();
        assert_eq!(areas, vec!["Bandra West", "Malad West", "Thane West", "Vashi"]);

        let filter = ViewFilter {
            zones: vec!["Western".into()],
            search: "  MALAD ".into(),
            ..filter
        };
        let rows = apply_view(&t, &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].area, "Malad West");
    }

    #[test]
    fn empty_filter_drops_only_rows_without_median() {
        let t = sample_table();
        let rows = apply_view(&t, &ViewFilter::default());
        assert_eq!(rows.len(), t.rows.len() - 1);
    }

    #[test]
    fn sort_modes() {
        let t = sample_table();
        let areas = |filter: ViewFilter| {
            apply_view(&t, &filter)
                .iter()
                .map(|r| r.area.clone())
                .collect::<Vec<_>>()
        };

        let by_rank = areas(ViewFilter::default());
        assert_eq!(&by_rank[2..4], &["Malad West".to_string(), "Vashi".to_string()]);

        let desc = areas(ViewFilter {
            sort: SortMode::MedianDesc,
            ..Default::default()
        });
        assert_eq!(desc.first().map(String::as_str), Some("Worli"));
        assert_eq!(&desc[2..4], &["Malad West".to_string(), "Vashi".to_string()]);

        let alpha = areas(ViewFilter {
            sort: SortMode::AreaAlphabetical,
            ..Default::default()
        });
        assert_eq!(alpha.first().map(String::as_str), Some("Bandra West"));
        assert_eq!(alpha.last().map(String::as_str), Some("Worli"));
    }

    #[test]
    fn zone_grouping_overrides_sort_mode() {
        let t = sample_table();
        let rows = apply_view(
            &t,
            &ViewFilter {
                group_by_zone: true,
                sort: SortMode::MedianDesc,
                ..Default::default()
            },
        );
        let pairs = rows
            .iter()
            .map(|r| (r.zone.as_str(), r.area.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("Central", "Dombivli East"),
                ("Central", "Thane West"),
                ("Navi Mumbai", "Vashi"),
                ("South", "Worli"),
                ("Western", "Malad West"),
                ("Western", "Bandra West"),
            ]
        );
    }

    #[test]
    fn zone_grouping_puts_blank_zone_last() {
        let t = table(vec![
            record("", "Lonavala", "", Some(12000.0), None),
            record("Western", "Virar", "Western Suburbs", Some(11000.0), Some("2x")),
            record("Central", "Kalyan", "Central Line", Some(15000.0), Some("2x")),
        ]);
        let rows = apply_view(
            &t,
            &ViewFilter {
                group_by_zone: true,
                ..Default::default()
            },
        );
        let areas = rows.iter().map(|r| r.area.as_str()).collect::<Vec<_>>();
        assert_eq!(areas, vec!["Kalyan", "Virar", "Lonavala"]);
    }

    #[test]
    fn short_rows_fall_back_to_default_deposit() {
        let csv = "zone,area,region,rent_median_1bhk,rent_min_1bhk,rent_max_1bhk,deposit_ratio\n\
Western,Khar,Western Suburbs,55000,45000,70000,3x\n\
Harbour,Govandi,Harbour Line,22000,17000,28000\n";
        let records = mrc_storage::parse_listings_csv(csv.as_bytes()).unwrap();
        let t = table(records);
        let govandi = t.find_area("Govandi").unwrap();
        assert_eq!(govandi.deposit_ratio, None);
        assert_eq!(govandi.deposit_months_min, DEFAULT_DEPOSIT_MONTHS);
        assert_eq!(govandi.global_rank, Some(1));
    }

    #[test]
    fn sort_mode_params_round_trip() {
        for mode in SortMode::ALL {
            assert_eq!(SortMode::from_param(mode.param()), Some(mode));
        }
        assert_eq!(SortMode::from_param("price"), None);
    }

    #[test]
    fn comparison_defaults_and_lookup() {
        let t = sample_table();
        let cmp = compare_areas(&t, None, None).unwrap();
        assert_eq!(cmp.left.area, "Bandra West");
        assert_eq!(cmp.right.area, "Chembur");

        let cmp = compare_areas(&t, Some("Vashi"), Some("Vashi")).unwrap();
        assert_eq!(cmp.left.area, "Vashi");
        assert_eq!(cmp.right.area, "Vashi");

        let cmp = compare_areas(&t, Some("Atlantis"), Some("Worli")).unwrap();
        assert_eq!(cmp.left.area, "Bandra West");
        assert_eq!(cmp.right.area, "Worli");
    }

    #[test]
    fn comparison_with_single_area_uses_it_twice() {
        let t = table(vec![record("A", "Kurla", "", Some(20000.0), None)]);
        let cmp = compare_areas(&t, None, None).unwrap();
        assert_eq!(cmp.left.area, "Kurla");
        assert_eq!(cmp.right.area, "Kurla");
    }

    #[test]
    fn export_has_fixed_header_even_when_empty() {
        let csv = export_csv(&[]).unwrap();
        assert_eq!(csv.trim_end(), EXPORT_COLUMNS.join(","));
    }

    #[test]
    fn export_writes_plain_badge_and_blank_nulls() {
        let t = sample_table();
        let rows = t.rows.iter().collect::<Vec<_>>();
        let csv = export_csv(&rows).unwrap();
        let chembur_line = csv.lines().find(|l| l.contains("Chembur")).unwrap();
        assert_eq!(chembur_line, ",Harbour,Chembur,Harbour Line,,,,3x,");
        assert!(csv.contains(",Budget\n"));
    }

    #[test]
    fn rupee_formatting() {
        assert_eq!(format_rupees(20000.0), "₹20,000");
        assert_eq!(format_rupees(1250000.9), "₹1,250,000");
        assert_eq!(format_rupees(950.0), "₹950");
        assert_eq!(format_rupees_opt(None), "");
    }

    #[tokio::test]
    async fn cache_reuses_until_content_changes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("mmr_rent_data.csv");
        let header = "zone,area,region,rent_median_1bhk,rent_min_1bhk,rent_max_1bhk,deposit_ratio\n";
        std::fs::write(&path, format!("{header}Western,Khar,Western Suburbs,55000,45000,70000,3x\n")).unwrap();

        let cache = DatasetCache::default();
        let first = cache.load(&path).await.unwrap();
        let second = cache.load(&path).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        std::fs::write(
            &path,
            format!("{header}Western,Khar,Western Suburbs,56000,45000,70000,3x\n"),
        )
        .unwrap();
        let third = cache.load(&path).await.unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_ne!(second.content_hash, third.content_hash);
        assert_eq!(third.rows[0].rent_median_1bhk, Some(56000.0));

        cache.invalidate().await;
        let fourth = cache.load(&path).await.unwrap();
        assert!(!Arc::ptr_eq(&third, &fourth));
        assert_eq!(third.content_hash, fourth.content_hash);
    }

    #[tokio::test]
    async fn cache_surfaces_load_errors() {
        let dir = tempdir().expect("tempdir");
        let cache = DatasetCache::default();
        let err = cache.load(dir.path().join("absent.csv")).await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
