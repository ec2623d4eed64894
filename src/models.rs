//! Core data models shared by every lookup module.
//!
//! [`VerseKey`] is the canonical `"{surah}:{ayah}"` address used by the
//! HTTP API, the CLI and the vector store payloads. [`Reader`] and
//! [`Transmitter`] are the fixed enumeration of the ten canonical qurra and
//! their twenty ruwat; their numeric ids are the primary keys of the
//! `qurra` and `ruwat` tables.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of surahs in the mushaf.
pub const SURAH_COUNT: u16 = 114;

/// Address of a single verse, written `"{surah}:{ayah}"` (e.g. `"2:255"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerseKey {
    pub surah: u16,
    pub ayah: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerseKeyError {
    #[error("invalid verse key '{0}': expected surah:ayah, e.g. 2:255")]
    Malformed(String),
    #[error("invalid verse key '{0}': surah must be between 1 and 114")]
    SurahOutOfRange(String),
    #[error("invalid verse key '{0}': ayah must be at least 1")]
    AyahOutOfRange(String),
}

impl VerseKey {
    pub fn new(surah: u16, ayah: u16) -> Result<Self, VerseKeyError> {
        let key = format!("{}:{}", surah, ayah);
        if surah == 0 || surah > SURAH_COUNT {
            return Err(VerseKeyError::SurahOutOfRange(key));
        }
        if ayah == 0 {
            return Err(VerseKeyError::AyahOutOfRange(key));
        }
        Ok(Self { surah, ayah })
    }
}

impl FromStr for VerseKey {
    type Err = VerseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (surah, ayah) = trimmed
            .split_once(':')
            .ok_or_else(|| VerseKeyError::Malformed(trimmed.to_string()))?;
        let surah: u16 = surah
            .parse()
            .map_err(|_| VerseKeyError::Malformed(trimmed.to_string()))?;
        let ayah: u16 = ayah
            .parse()
            .map_err(|_| VerseKeyError::Malformed(trimmed.to_string()))?;
        Self::new(surah, ayah)
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.surah, self.ayah)
    }
}

impl Serialize for VerseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Validate a surah number taken from a path or query parameter.
pub fn check_surah(id: i64) -> Result<u16, String> {
    if (1..=SURAH_COUNT as i64).contains(&id) {
        Ok(id as u16)
    } else {
        Err(format!("surah must be between 1 and 114, got {}", id))
    }
}

// ============ Readers and transmitters ============

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersonError {
    #[error("unknown reader: '{0}'")]
    UnknownReader(String),
    #[error("unknown transmitter: '{0}'")]
    UnknownTransmitter(String),
    #[error("transmitter '{transmitter}' does not transmit from reader '{reader}'")]
    Mismatch { reader: String, transmitter: String },
}

/// One of the ten canonical readers (qurra), in their traditional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reader {
    Nafi,
    IbnKathir,
    AbuAmr,
    IbnAmir,
    Asim,
    Hamza,
    Kisai,
    AbuJafar,
    Yaqub,
    KhalafAshir,
}

impl Reader {
    pub const ALL: [Reader; 10] = [
        Reader::Nafi,
        Reader::IbnKathir,
        Reader::AbuAmr,
        Reader::IbnAmir,
        Reader::Asim,
        Reader::Hamza,
        Reader::Kisai,
        Reader::AbuJafar,
        Reader::Yaqub,
        Reader::KhalafAshir,
    ];

    /// Database id, which is also the reader's rank (1..=10).
    pub fn id(self) -> i64 {
        self as i64 + 1
    }

    pub fn from_id(id: i64) -> Option<Reader> {
        if id < 1 {
            return None;
        }
        Self::ALL.get((id - 1) as usize).copied()
    }

    pub fn slug(self) -> &'static str {
        match self {
            Reader::Nafi => "nafi",
            Reader::IbnKathir => "ibn_kathir",
            Reader::AbuAmr => "abu_amr",
            Reader::IbnAmir => "ibn_amir",
            Reader::Asim => "asim",
            Reader::Hamza => "hamza",
            Reader::Kisai => "kisai",
            Reader::AbuJafar => "abu_jafar",
            Reader::Yaqub => "yaqub",
            Reader::KhalafAshir => "khalaf_ashir",
        }
    }

    pub fn name_ar(self) -> &'static str {
        match self {
            Reader::Nafi => "نافع المدني",
            Reader::IbnKathir => "ابن كثير المكي",
            Reader::AbuAmr => "أبو عمرو البصري",
            Reader::IbnAmir => "ابن عامر الشامي",
            Reader::Asim => "عاصم الكوفي",
            Reader::Hamza => "حمزة الكوفي",
            Reader::Kisai => "الكسائي الكوفي",
            Reader::AbuJafar => "أبو جعفر المدني",
            Reader::Yaqub => "يعقوب الحضرمي",
            Reader::KhalafAshir => "خلف العاشر",
        }
    }

    pub fn name_en(self) -> &'static str {
        match self {
            Reader::Nafi => "Nafi' al-Madani",
            Reader::IbnKathir => "Ibn Kathir al-Makki",
            Reader::AbuAmr => "Abu 'Amr al-Basri",
            Reader::IbnAmir => "Ibn 'Amir al-Shami",
            Reader::Asim => "'Asim al-Kufi",
            Reader::Hamza => "Hamzah al-Kufi",
            Reader::Kisai => "al-Kisa'i al-Kufi",
            Reader::AbuJafar => "Abu Ja'far al-Madani",
            Reader::Yaqub => "Ya'qub al-Hadrami",
            Reader::KhalafAshir => "Khalaf al-'Ashir",
        }
    }

    pub fn death_year_ah(self) -> i64 {
        match self {
            Reader::Nafi => 169,
            Reader::IbnKathir => 120,
            Reader::AbuAmr => 154,
            Reader::IbnAmir => 118,
            Reader::Asim => 127,
            Reader::Hamza => 156,
            Reader::Kisai => 189,
            Reader::AbuJafar => 130,
            Reader::Yaqub => 205,
            Reader::KhalafAshir => 229,
        }
    }

    pub fn city(self) -> &'static str {
        match self {
            Reader::Nafi | Reader::AbuJafar => "Madinah",
            Reader::IbnKathir => "Makkah",
            Reader::AbuAmr | Reader::Yaqub => "Basra",
            Reader::IbnAmir => "Damascus",
            Reader::Asim | Reader::Hamza | Reader::Kisai => "Kufa",
            Reader::KhalafAshir => "Baghdad",
        }
    }

    /// The two transmitters of this reader, primary first.
    pub fn transmitters(self) -> [Transmitter; 2] {
        let first = (self.id() - 1) * 2 + 1;
        [
            Transmitter::ALL[(first - 1) as usize],
            Transmitter::ALL[first as usize],
        ]
    }
}

impl fmt::Display for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Reader {
    type Err = PersonError;

    /// Accepts the slug (`hamza`) or the numeric id (`6`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Reader::from_id(id).ok_or_else(|| PersonError::UnknownReader(s.to_string()));
        }
        Reader::ALL
            .iter()
            .copied()
            .find(|r| r.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| PersonError::UnknownReader(s.to_string()))
    }
}

/// One of the twenty transmitters (ruwat), two per reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transmitter {
    Qaloon,
    Warsh,
    Bazzi,
    Qunbul,
    DooriAbuAmr,
    Soosi,
    Hisham,
    IbnDhakwan,
    Shuba,
    Hafs,
    Khalaf,
    Khallad,
    AbuAlHarith,
    DooriKisai,
    IbnWardan,
    IbnJammaz,
    Ruways,
    Rawh,
    Ishaq,
    Idris,
}

impl Transmitter {
    pub const ALL: [Transmitter; 20] = [
        Transmitter::Qaloon,
        Transmitter::Warsh,
        Transmitter::Bazzi,
        Transmitter::Qunbul,
        Transmitter::DooriAbuAmr,
        Transmitter::Soosi,
        Transmitter::Hisham,
        Transmitter::IbnDhakwan,
        Transmitter::Shuba,
        Transmitter::Hafs,
        Transmitter::Khalaf,
        Transmitter::Khallad,
        Transmitter::AbuAlHarith,
        Transmitter::DooriKisai,
        Transmitter::IbnWardan,
        Transmitter::IbnJammaz,
        Transmitter::Ruways,
        Transmitter::Rawh,
        Transmitter::Ishaq,
        Transmitter::Idris,
    ];

    pub fn id(self) -> i64 {
        self as i64 + 1
    }

    pub fn from_id(id: i64) -> Option<Transmitter> {
        if id < 1 {
            return None;
        }
        Self::ALL.get((id - 1) as usize).copied()
    }

    pub fn reader(self) -> Reader {
        Reader::ALL[((self.id() - 1) / 2) as usize]
    }

    /// The first-listed transmitter of each reader.
    pub fn is_primary(self) -> bool {
        self.id() % 2 == 1
    }

    pub fn slug(self) -> &'static str {
        match self {
            Transmitter::Qaloon => "qaloon",
            Transmitter::Warsh => "warsh",
            Transmitter::Bazzi => "bazzi",
            Transmitter::Qunbul => "qunbul",
            Transmitter::DooriAbuAmr => "doori_abu_amr",
            Transmitter::Soosi => "soosi",
            Transmitter::Hisham => "hisham",
            Transmitter::IbnDhakwan => "ibn_dhakwan",
            Transmitter::Shuba => "shuba",
            Transmitter::Hafs => "hafs",
            Transmitter::Khalaf => "khalaf",
            Transmitter::Khallad => "khallad",
            Transmitter::AbuAlHarith => "abu_al_harith",
            Transmitter::DooriKisai => "doori_kisai",
            Transmitter::IbnWardan => "ibn_wardan",
            Transmitter::IbnJammaz => "ibn_jammaz",
            Transmitter::Ruways => "ruways",
            Transmitter::Rawh => "rawh",
            Transmitter::Ishaq => "ishaq",
            Transmitter::Idris => "idris",
        }
    }

    pub fn name_ar(self) -> &'static str {
        match self {
            Transmitter::Qaloon => "قالون",
            Transmitter::Warsh => "ورش",
            Transmitter::Bazzi => "البزي",
            Transmitter::Qunbul => "قنبل",
            Transmitter::DooriAbuAmr => "الدوري عن أبي عمرو",
            Transmitter::Soosi => "السوسي",
            Transmitter::Hisham => "هشام",
            Transmitter::IbnDhakwan => "ابن ذكوان",
            Transmitter::Shuba => "شعبة",
            Transmitter::Hafs => "حفص",
            Transmitter::Khalaf => "خلف عن حمزة",
            Transmitter::Khallad => "خلاد",
            Transmitter::AbuAlHarith => "أبو الحارث",
            Transmitter::DooriKisai => "الدوري عن الكسائي",
            Transmitter::IbnWardan => "ابن وردان",
            Transmitter::IbnJammaz => "ابن جماز",
            Transmitter::Ruways => "رويس",
            Transmitter::Rawh => "روح",
            Transmitter::Ishaq => "إسحاق الوراق",
            Transmitter::Idris => "إدريس الحداد",
        }
    }

    pub fn name_en(self) -> &'static str {
        match self {
            Transmitter::Qaloon => "Qalun",
            Transmitter::Warsh => "Warsh",
            Transmitter::Bazzi => "al-Bazzi",
            Transmitter::Qunbul => "Qunbul",
            Transmitter::DooriAbuAmr => "al-Duri (Abu 'Amr)",
            Transmitter::Soosi => "al-Susi",
            Transmitter::Hisham => "Hisham",
            Transmitter::IbnDhakwan => "Ibn Dhakwan",
            Transmitter::Shuba => "Shu'bah",
            Transmitter::Hafs => "Hafs",
            Transmitter::Khalaf => "Khalaf (Hamzah)",
            Transmitter::Khallad => "Khallad",
            Transmitter::AbuAlHarith => "Abu al-Harith",
            Transmitter::DooriKisai => "al-Duri (al-Kisa'i)",
            Transmitter::IbnWardan => "Ibn Wardan",
            Transmitter::IbnJammaz => "Ibn Jammaz",
            Transmitter::Ruways => "Ruways",
            Transmitter::Rawh => "Rawh",
            Transmitter::Ishaq => "Ishaq al-Warraq",
            Transmitter::Idris => "Idris al-Haddad",
        }
    }
}

impl fmt::Display for Transmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Transmitter {
    type Err = PersonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Transmitter::from_id(id)
                .ok_or_else(|| PersonError::UnknownTransmitter(s.to_string()));
        }
        Transmitter::ALL
            .iter()
            .copied()
            .find(|t| t.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| PersonError::UnknownTransmitter(s.to_string()))
    }
}

/// Parse a reader and an optional transmitter, rejecting a transmitter that
/// belongs to a different reader.
pub fn parse_reader_pair(
    reader: &str,
    transmitter: Option<&str>,
) -> Result<(Reader, Option<Transmitter>), PersonError> {
    let reader: Reader = reader.parse()?;
    let transmitter = match transmitter.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => {
            let t: Transmitter = t.parse()?;
            if t.reader() != reader {
                return Err(PersonError::Mismatch {
                    reader: reader.slug().to_string(),
                    transmitter: t.slug().to_string(),
                });
            }
            Some(t)
        }
        None => None,
    };
    Ok((reader, transmitter))
}

// ============ Shared rows ============

/// A surah header row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Surah {
    pub id: i64,
    pub name_ar: String,
    pub name_en: String,
    pub name_transliterated: String,
    pub revelation_type: String,
    pub revelation_order: Option<i64>,
    pub ayah_count: i64,
}

/// A verse row. `verse_key` always equals `"{surah_id}:{ayah_number}"`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Verse {
    pub id: i64,
    pub surah_id: i64,
    pub ayah_number: i64,
    pub verse_key: String,
    pub text_uthmani: String,
    pub text_simple: Option<String>,
    pub page: Option<i64>,
    pub juz: Option<i64>,
}
