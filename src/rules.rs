//! Qiraat rule resolution.
//!
//! A recitation rule (basmala policy, madd length, ...) is stored at one of
//! three levels of generality:
//!
//! 1. transmitter: `(category, reader, transmitter)`
//! 2. reader: `(category, reader, NULL)`
//! 3. universal: `(category, NULL, NULL)`
//!
//! [`resolve`] returns the most specific row that exists and names the
//! level it came from. A rule absent at all three levels is reported as
//! [`Resolution::NotDefined`]; there is no further default.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use crate::models::{parse_reader_pair, PersonError, Reader, Transmitter};

/// The fixed set of rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Fatiha,
    BeginningOfSurah,
    BetweenSurahs,
    AnfalTawbah,
    MaddMuttasil,
    MaddMunfasil,
    MaddLazim,
    MaddBadal,
    SilahMimJam,
    IdghamKabir,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 10] = [
        RuleCategory::Fatiha,
        RuleCategory::BeginningOfSurah,
        RuleCategory::BetweenSurahs,
        RuleCategory::AnfalTawbah,
        RuleCategory::MaddMuttasil,
        RuleCategory::MaddMunfasil,
        RuleCategory::MaddLazim,
        RuleCategory::MaddBadal,
        RuleCategory::SilahMimJam,
        RuleCategory::IdghamKabir,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleCategory::Fatiha => "fatiha",
            RuleCategory::BeginningOfSurah => "beginning_of_surah",
            RuleCategory::BetweenSurahs => "between_surahs",
            RuleCategory::AnfalTawbah => "anfal_tawbah",
            RuleCategory::MaddMuttasil => "madd_muttasil",
            RuleCategory::MaddMunfasil => "madd_munfasil",
            RuleCategory::MaddLazim => "madd_lazim",
            RuleCategory::MaddBadal => "madd_badal",
            RuleCategory::SilahMimJam => "silah_mim_jam",
            RuleCategory::IdghamKabir => "idgham_kabir",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RuleCategory::Fatiha => "Basmala in al-Fatiha",
            RuleCategory::BeginningOfSurah => "Basmala when starting a surah",
            RuleCategory::BetweenSurahs => "Basmala between two surahs",
            RuleCategory::AnfalTawbah => "Joining al-Anfal to al-Tawbah",
            RuleCategory::MaddMuttasil => "Connected obligatory madd",
            RuleCategory::MaddMunfasil => "Separated permissible madd",
            RuleCategory::MaddLazim => "Necessary madd",
            RuleCategory::MaddBadal => "Substitute madd",
            RuleCategory::SilahMimJam => "Linking the plural mim",
            RuleCategory::IdghamKabir => "Major assimilation",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleCategory {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        RuleCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RuleError::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("unknown rule category: '{0}'")]
    UnknownCategory(String),
    #[error(transparent)]
    Person(#[from] PersonError),
    #[error("malformed rule row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl RuleError {
    /// True for errors caused by the caller's input rather than the store.
    pub fn is_input_error(&self) -> bool {
        matches!(self, RuleError::UnknownCategory(_) | RuleError::Person(_))
    }
}

/// A stored rule row.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: i64,
    pub category: RuleCategory,
    pub reader: Option<Reader>,
    pub transmitter: Option<Transmitter>,
    /// Policy token (`required`, `three_options`, ...) or harakat count/range.
    pub value: String,
    pub methods: Vec<String>,
    pub description: Option<String>,
}

/// Which level of the fallback chain produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleLevel {
    Transmitter,
    Reader,
    Universal,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found { rule: Rule, level: RuleLevel },
    NotDefined,
}

/// Pick the most specific applicable row from `rows`.
///
/// `rows` may contain rows for other readers or transmitters; they are
/// ignored. Rows are assumed to share one category.
pub fn pick<'a>(
    rows: &'a [Rule],
    reader: Reader,
    transmitter: Option<Transmitter>,
) -> Option<(&'a Rule, RuleLevel)> {
    if let Some(t) = transmitter {
        if let Some(rule) = rows
            .iter()
            .find(|r| r.reader == Some(reader) && r.transmitter == Some(t))
        {
            return Some((rule, RuleLevel::Transmitter));
        }
    }
    if let Some(rule) = rows
        .iter()
        .find(|r| r.reader == Some(reader) && r.transmitter.is_none())
    {
        return Some((rule, RuleLevel::Reader));
    }
    rows.iter()
        .find(|r| r.reader.is_none() && r.transmitter.is_none())
        .map(|rule| (rule, RuleLevel::Universal))
}

/// Parse the raw `category`/`reader`/`transmitter` inputs of a request.
pub fn parse_request(
    category: &str,
    reader: &str,
    transmitter: Option<&str>,
) -> Result<(RuleCategory, Reader, Option<Transmitter>), RuleError> {
    let category: RuleCategory = category.parse()?;
    let (reader, transmitter) = parse_reader_pair(reader, transmitter)?;
    Ok((category, reader, transmitter))
}

/// Resolve one rule for a reader (and optionally one of its transmitters).
pub async fn resolve(
    pool: &SqlitePool,
    category: RuleCategory,
    reader: Reader,
    transmitter: Option<Transmitter>,
) -> Result<Resolution, RuleError> {
    let rows = load_candidates(pool, Some(category), reader, transmitter).await?;
    Ok(match pick(&rows, reader, transmitter) {
        Some((rule, level)) => Resolution::Found {
            rule: rule.clone(),
            level,
        },
        None => Resolution::NotDefined,
    })
}

/// Resolve every category for a reader, in category order.
pub async fn resolve_all(
    pool: &SqlitePool,
    reader: Reader,
    transmitter: Option<Transmitter>,
) -> Result<Vec<RuleAnswer>, RuleError> {
    let rows = load_candidates(pool, None, reader, transmitter).await?;

    let answers = RuleCategory::ALL
        .iter()
        .map(|&category| {
            let in_category: Vec<Rule> = rows
                .iter()
                .filter(|r| r.category == category)
                .cloned()
                .collect();
            let resolution = match pick(&in_category, reader, transmitter) {
                Some((rule, level)) => Resolution::Found {
                    rule: rule.clone(),
                    level,
                },
                None => Resolution::NotDefined,
            };
            RuleAnswer::new(category, reader, transmitter, resolution)
        })
        .collect();

    Ok(answers)
}

/// Rows at any of the three levels that could apply to `reader`/`transmitter`.
async fn load_candidates(
    pool: &SqlitePool,
    category: Option<RuleCategory>,
    reader: Reader,
    transmitter: Option<Transmitter>,
) -> Result<Vec<Rule>, RuleError> {
    let rows = sqlx::query(
        r#"
        SELECT id, category, qari_id, rawi_id, value, methods_json, description
        FROM qiraat_rules
        WHERE (?1 IS NULL OR category = ?1)
          AND (qari_id IS NULL OR qari_id = ?2)
          AND (rawi_id IS NULL OR rawi_id = ?3)
        "#,
    )
    .bind(category.map(|c| c.as_str()))
    .bind(reader.id())
    .bind(transmitter.map(|t| t.id()))
    .fetch_all(pool)
    .await?;

    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let corrupt = |reason: String| RuleError::CorruptRow { id, reason };

        let category: String = row.get("category");
        let category: RuleCategory = category
            .parse()
            .map_err(|_| corrupt(format!("unknown category '{}'", category)))?;
        let reader = match row.get::<Option<i64>, _>("qari_id") {
            Some(qid) => Some(
                Reader::from_id(qid).ok_or_else(|| corrupt(format!("unknown qari_id {}", qid)))?,
            ),
            None => None,
        };
        let transmitter = match row.get::<Option<i64>, _>("rawi_id") {
            Some(rid) => Some(
                Transmitter::from_id(rid)
                    .ok_or_else(|| corrupt(format!("unknown rawi_id {}", rid)))?,
            ),
            None => None,
        };
        let methods_json: String = row.get("methods_json");
        let methods: Vec<String> = serde_json::from_str(&methods_json)
            .map_err(|e| corrupt(format!("methods_json: {}", e)))?;

        rules.push(Rule {
            id,
            category,
            reader,
            transmitter,
            value: row.get("value"),
            methods,
            description: row.get("description"),
        });
    }
    Ok(rules)
}

/// Response shape for a resolved (or undefined) rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleAnswer {
    pub category: RuleCategory,
    pub reader: Reader,
    pub transmitter: Option<Transmitter>,
    pub defined: bool,
    pub level: Option<RuleLevel>,
    pub rule: Option<Rule>,
}

impl RuleAnswer {
    pub fn new(
        category: RuleCategory,
        reader: Reader,
        transmitter: Option<Transmitter>,
        resolution: Resolution,
    ) -> Self {
        let (defined, level, rule) = match resolution {
            Resolution::Found { rule, level } => (true, Some(level), Some(rule)),
            Resolution::NotDefined => (false, None, None),
        };
        Self {
            category,
            reader,
            transmitter,
            defined,
            level,
            rule,
        }
    }
}
