//! Fixed reference data written by `uloom init`.
//!
//! Readers and transmitters come straight from the [`Reader`] and
//! [`Transmitter`] enums. Rules, tafsir sources, riwayat, asbab sources and
//! the default reciters are tables in this file. All writes are upserts and
//! run in one transaction.

use anyhow::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::models::{Reader, Transmitter};
use crate::qiraat::DEFAULT_RECITERS;
use crate::rules::RuleCategory;

const BASMALA_ONLY: &[&str] = &["basmala"];
const THREE_OPTIONS: &[&str] = &["basmala", "sakt", "wasl"];
const WASL_ONLY: &[&str] = &["wasl"];
const TAWBAH_JOINS: &[&str] = &["waqf", "sakt", "wasl"];
const NONE: &[&str] = &[];

struct SeedRule {
    category: RuleCategory,
    reader: Option<Reader>,
    transmitter: Option<Transmitter>,
    value: &'static str,
    methods: &'static [&'static str],
    description: &'static str,
}

const fn universal(
    category: RuleCategory,
    value: &'static str,
    methods: &'static [&'static str],
    description: &'static str,
) -> SeedRule {
    SeedRule {
        category,
        reader: None,
        transmitter: None,
        value,
        methods,
        description,
    }
}

const fn by_reader(
    category: RuleCategory,
    reader: Reader,
    value: &'static str,
    methods: &'static [&'static str],
    description: &'static str,
) -> SeedRule {
    SeedRule {
        category,
        reader: Some(reader),
        transmitter: None,
        value,
        methods,
        description,
    }
}

/// The reader is derived from the transmitter when the row is written.
const fn by_transmitter(
    category: RuleCategory,
    transmitter: Transmitter,
    value: &'static str,
    methods: &'static [&'static str],
    description: &'static str,
) -> SeedRule {
    SeedRule {
        category,
        reader: None,
        transmitter: Some(transmitter),
        value,
        methods,
        description,
    }
}

use RuleCategory::*;

const RULES: &[SeedRule] = &[
    // Basmala
    universal(Fatiha, "required", BASMALA_ONLY, "The basmala is recited as the first ayah of al-Fatiha by all readers."),
    universal(BeginningOfSurah, "required", BASMALA_ONLY, "The basmala is recited when starting any surah other than al-Tawbah."),
    universal(AnfalTawbah, "prohibited", TAWBAH_JOINS, "No basmala between al-Anfal and al-Tawbah; the reader stops, pauses briefly or joins."),
    by_transmitter(AnfalTawbah, Transmitter::Khalaf, "prohibited", TAWBAH_JOINS, "Khalaf joins surahs without basmala; al-Anfal to al-Tawbah likewise has none."),
    by_transmitter(AnfalTawbah, Transmitter::Khallad, "prohibited", TAWBAH_JOINS, "Khallad joins surahs without basmala; al-Anfal to al-Tawbah likewise has none."),
    by_transmitter(BetweenSurahs, Transmitter::Qaloon, "required", BASMALA_ONLY, "Qalun separates every two surahs with the basmala."),
    by_transmitter(BetweenSurahs, Transmitter::Warsh, "three_options", THREE_OPTIONS, "Warsh may separate with the basmala, pause briefly, or join."),
    by_reader(BetweenSurahs, Reader::IbnKathir, "required", BASMALA_ONLY, "Ibn Kathir separates every two surahs with the basmala."),
    by_reader(BetweenSurahs, Reader::AbuAmr, "three_options", THREE_OPTIONS, "Abu 'Amr may separate with the basmala, pause briefly, or join."),
    by_reader(BetweenSurahs, Reader::IbnAmir, "three_options", THREE_OPTIONS, "Ibn 'Amir may separate with the basmala, pause briefly, or join."),
    by_reader(BetweenSurahs, Reader::Asim, "required", BASMALA_ONLY, "'Asim separates every two surahs with the basmala."),
    by_reader(BetweenSurahs, Reader::Hamza, "wasl_only", WASL_ONLY, "Hamzah joins the end of a surah to the start of the next without basmala."),
    by_reader(BetweenSurahs, Reader::Kisai, "required", BASMALA_ONLY, "al-Kisa'i separates every two surahs with the basmala."),
    by_reader(BetweenSurahs, Reader::AbuJafar, "required", BASMALA_ONLY, "Abu Ja'far separates every two surahs with the basmala."),
    by_reader(BetweenSurahs, Reader::Yaqub, "three_options", THREE_OPTIONS, "Ya'qub may separate with the basmala, pause briefly, or join."),
    by_reader(BetweenSurahs, Reader::KhalafAshir, "wasl_only", WASL_ONLY, "Khalaf al-'Ashir joins surahs without basmala."),
    // Madd lengths, in harakat
    universal(MaddMuttasil, "4", NONE, "Connected madd at four harakat (tawassut)."),
    by_reader(MaddMuttasil, Reader::Hamza, "6", NONE, "Hamzah lengthens connected madd to six harakat."),
    by_reader(MaddMuttasil, Reader::Asim, "4-5", NONE, "'Asim reads connected madd at four to five harakat."),
    by_transmitter(MaddMuttasil, Transmitter::Warsh, "6", NONE, "Warsh lengthens connected madd to six harakat."),
    by_transmitter(MaddMunfasil, Transmitter::Warsh, "6", NONE, "Warsh lengthens separated madd to six harakat."),
    by_transmitter(MaddMunfasil, Transmitter::Qaloon, "2-4", NONE, "Qalun reads separated madd short or at four harakat (khilaf)."),
    by_reader(MaddMunfasil, Reader::IbnKathir, "2", NONE, "Ibn Kathir shortens separated madd (qasr)."),
    by_transmitter(MaddMunfasil, Transmitter::DooriAbuAmr, "2-4", NONE, "al-Duri reads separated madd short or at four harakat (khilaf)."),
    by_transmitter(MaddMunfasil, Transmitter::Soosi, "2", NONE, "al-Susi shortens separated madd (qasr)."),
    by_reader(MaddMunfasil, Reader::IbnAmir, "4", NONE, "Ibn 'Amir reads separated madd at four harakat."),
    by_reader(MaddMunfasil, Reader::Asim, "5", NONE, "'Asim reads separated madd at five harakat."),
    by_transmitter(MaddMunfasil, Transmitter::Hafs, "4", NONE, "Hafs reads separated madd at four harakat."),
    by_reader(MaddMunfasil, Reader::Hamza, "6", NONE, "Hamzah lengthens separated madd to six harakat."),
    by_reader(MaddMunfasil, Reader::Kisai, "4", NONE, "al-Kisa'i reads separated madd at four harakat."),
    by_reader(MaddMunfasil, Reader::AbuJafar, "2", NONE, "Abu Ja'far shortens separated madd (qasr)."),
    by_reader(MaddMunfasil, Reader::Yaqub, "2", NONE, "Ya'qub shortens separated madd (qasr)."),
    by_reader(MaddMunfasil, Reader::KhalafAshir, "4", NONE, "Khalaf al-'Ashir reads separated madd at four harakat."),
    universal(MaddLazim, "6", NONE, "Necessary madd is six harakat for all readers."),
    universal(MaddBadal, "2", NONE, "Substitute madd is two harakat."),
    by_transmitter(MaddBadal, Transmitter::Warsh, "2-6", &["qasr", "tawassut", "tul"], "Warsh reads substitute madd short, medium or long."),
    // Other usul
    universal(SilahMimJam, "sukun", NONE, "The plural mim is read with sukun."),
    by_reader(SilahMimJam, Reader::IbnKathir, "silah", NONE, "Ibn Kathir links the plural mim with a waw before a moving letter."),
    by_reader(SilahMimJam, Reader::AbuJafar, "silah", NONE, "Abu Ja'far links the plural mim with a waw before a moving letter."),
    by_transmitter(SilahMimJam, Transmitter::Qaloon, "optional", &["silah", "sukun"], "Qalun may link or silence the plural mim (khilaf)."),
    by_transmitter(SilahMimJam, Transmitter::Warsh, "before_hamzat_qat", NONE, "Warsh links the plural mim only before a hamzat qat'."),
    universal(IdghamKabir, "izhar", NONE, "Two moving like letters across words are pronounced separately."),
    by_transmitter(IdghamKabir, Transmitter::Soosi, "idgham", NONE, "al-Susi assimilates two moving like or close letters (major idgham)."),
];

struct SeedTafsir {
    id: i64,
    slug: &'static str,
    name_ar: &'static str,
    name_en: &'static str,
    author_ar: &'static str,
    author_en: &'static str,
    death_year_ah: i64,
    methodology: &'static str,
    priority_rank: i64,
}

const TAFSIR_BOOKS: &[SeedTafsir] = &[
    SeedTafsir { id: 1, slug: "tabari", name_ar: "جامع البيان عن تأويل آي القرآن", name_en: "Jami' al-Bayan", author_ar: "ابن جرير الطبري", author_en: "Ibn Jarir al-Tabari", death_year_ah: 310, methodology: "bil_mathur", priority_rank: 1 },
    SeedTafsir { id: 2, slug: "ibn_kathir", name_ar: "تفسير القرآن العظيم", name_en: "Tafsir al-Qur'an al-'Azim", author_ar: "ابن كثير", author_en: "Ibn Kathir", death_year_ah: 774, methodology: "bil_mathur", priority_rank: 4 },
    SeedTafsir { id: 3, slug: "baghawi", name_ar: "معالم التنزيل", name_en: "Ma'alim al-Tanzil", author_ar: "البغوي", author_en: "al-Baghawi", death_year_ah: 516, methodology: "bil_mathur", priority_rank: 2 },
    SeedTafsir { id: 4, slug: "qurtubi", name_ar: "الجامع لأحكام القرآن", name_en: "al-Jami' li-Ahkam al-Qur'an", author_ar: "القرطبي", author_en: "al-Qurtubi", death_year_ah: 671, methodology: "fiqhi", priority_rank: 3 },
    SeedTafsir { id: 5, slug: "saadi", name_ar: "تيسير الكريم الرحمن", name_en: "Taysir al-Karim al-Rahman", author_ar: "عبد الرحمن السعدي", author_en: "al-Sa'di", death_year_ah: 1376, methodology: "mukhtasar", priority_rank: 5 },
    SeedTafsir { id: 6, slug: "ibn_ashur", name_ar: "التحرير والتنوير", name_en: "al-Tahrir wa al-Tanwir", author_ar: "ابن عاشور", author_en: "Ibn 'Ashur", death_year_ah: 1393, methodology: "bil_ray", priority_rank: 6 },
    SeedTafsir { id: 7, slug: "wasit", name_ar: "التفسير الوسيط", name_en: "al-Tafsir al-Wasit", author_ar: "محمد سيد طنطاوي", author_en: "Muhammad Sayyid Tantawi", death_year_ah: 1431, methodology: "bil_ray", priority_rank: 7 },
];

/// `(id, code, name_ar, name_en, transmitter)`; the reader follows from the transmitter.
const RIWAYAT: &[(i64, &str, &str, &str, Transmitter)] = &[
    (1, "hafs", "حفص عن عاصم", "Hafs 'an 'Asim", Transmitter::Hafs),
    (2, "warsh", "ورش عن نافع", "Warsh 'an Nafi'", Transmitter::Warsh),
    (3, "qaloon", "قالون عن نافع", "Qalun 'an Nafi'", Transmitter::Qaloon),
    (4, "shouba", "شعبة عن عاصم", "Shu'bah 'an 'Asim", Transmitter::Shuba),
    (5, "doori", "الدوري عن أبي عمرو", "al-Duri 'an Abi 'Amr", Transmitter::DooriAbuAmr),
    (6, "soosi", "السوسي عن أبي عمرو", "al-Susi 'an Abi 'Amr", Transmitter::Soosi),
    (7, "bazzi", "البزي عن ابن كثير", "al-Bazzi 'an Ibn Kathir", Transmitter::Bazzi),
    (8, "qumbul", "قنبل عن ابن كثير", "Qunbul 'an Ibn Kathir", Transmitter::Qunbul),
];

/// `(id, name_ar, name_en, author_ar, author_en, death_year_ah)`
const ASBAB_SOURCES: &[(i64, &str, &str, &str, &str, i64)] = &[
    (1, "أسباب النزول", "Asbab al-Nuzul", "الواحدي", "al-Wahidi", 468),
    (2, "لباب النقول في أسباب النزول", "Lubab al-Nuqul", "السيوطي", "al-Suyuti", 911),
];

/// Write all reference data. Safe to call repeatedly.
pub async fn seed_reference_data(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;

    seed_people(&mut tx).await?;
    seed_rules(&mut tx).await?;
    seed_tafsir_books(&mut tx).await?;
    seed_riwayat(&mut tx).await?;
    seed_asbab_sources(&mut tx).await?;
    seed_reciters(&mut tx).await?;

    tx.commit().await?;

    tracing::info!(
        readers = Reader::ALL.len(),
        transmitters = Transmitter::ALL.len(),
        rules = RULES.len(),
        tafsir_books = TAFSIR_BOOKS.len(),
        "reference data seeded"
    );
    Ok(())
}

async fn seed_people(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    for reader in Reader::ALL {
        sqlx::query(
            r#"
            INSERT INTO qurra (id, slug, name_ar, name_en, death_year_ah, city, rank)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                name_ar = excluded.name_ar,
                name_en = excluded.name_en,
                death_year_ah = excluded.death_year_ah,
                city = excluded.city,
                rank = excluded.rank
            "#,
        )
        .bind(reader.id())
        .bind(reader.slug())
        .bind(reader.name_ar())
        .bind(reader.name_en())
        .bind(reader.death_year_ah())
        .bind(reader.city())
        .bind(reader.id())
        .execute(&mut **tx)
        .await?;
    }

    for t in Transmitter::ALL {
        sqlx::query(
            r#"
            INSERT INTO ruwat (id, slug, qari_id, name_ar, name_en, is_primary)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                qari_id = excluded.qari_id,
                name_ar = excluded.name_ar,
                name_en = excluded.name_en,
                is_primary = excluded.is_primary
            "#,
        )
        .bind(t.id())
        .bind(t.slug())
        .bind(t.reader().id())
        .bind(t.name_ar())
        .bind(t.name_en())
        .bind(t.is_primary())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_rules(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    for rule in RULES {
        let reader = rule.transmitter.map(|t| t.reader()).or(rule.reader);
        let methods = serde_json::to_string(rule.methods)?;
        // REPLACE resolves conflicts on the (category, reader, transmitter) index.
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO qiraat_rules (category, qari_id, rawi_id, value, methods_json, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(rule.category.as_str())
        .bind(reader.map(|r| r.id()))
        .bind(rule.transmitter.map(|t| t.id()))
        .bind(rule.value)
        .bind(methods)
        .bind(rule.description)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_tafsir_books(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    for book in TAFSIR_BOOKS {
        sqlx::query(
            r#"
            INSERT INTO tafsir_books (id, slug, name_ar, name_en, author_ar, author_en, death_year_ah, methodology, priority_rank)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                name_ar = excluded.name_ar,
                name_en = excluded.name_en,
                author_ar = excluded.author_ar,
                author_en = excluded.author_en,
                death_year_ah = excluded.death_year_ah,
                methodology = excluded.methodology,
                priority_rank = excluded.priority_rank
            "#,
        )
        .bind(book.id)
        .bind(book.slug)
        .bind(book.name_ar)
        .bind(book.name_en)
        .bind(book.author_ar)
        .bind(book.author_en)
        .bind(book.death_year_ah)
        .bind(book.methodology)
        .bind(book.priority_rank)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_riwayat(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    for (id, code, name_ar, name_en, transmitter) in RIWAYAT {
        sqlx::query(
            r#"
            INSERT INTO riwayat (id, code, name_ar, name_en, qari_id, rawi_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                name_ar = excluded.name_ar,
                name_en = excluded.name_en,
                qari_id = excluded.qari_id,
                rawi_id = excluded.rawi_id
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(name_ar)
        .bind(name_en)
        .bind(transmitter.reader().id())
        .bind(transmitter.id())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_asbab_sources(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    for (id, name_ar, name_en, author_ar, author_en, death) in ASBAB_SOURCES {
        sqlx::query(
            r#"
            INSERT INTO asbab_sources (id, name_ar, name_en, author_ar, author_en, death_year_ah)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name_ar = excluded.name_ar,
                name_en = excluded.name_en,
                author_ar = excluded.author_ar,
                author_en = excluded.author_en,
                death_year_ah = excluded.death_year_ah
            "#,
        )
        .bind(id)
        .bind(name_ar)
        .bind(name_en)
        .bind(author_ar)
        .bind(author_en)
        .bind(death)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn seed_reciters(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    for r in DEFAULT_RECITERS {
        sqlx::query(
            r#"
            INSERT INTO audio_reciters (slug, riwaya_code, name_ar, name_en, base_url, path, has_verse_audio)
            VALUES (?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(slug) DO UPDATE SET
                riwaya_code = excluded.riwaya_code,
                name_ar = excluded.name_ar,
                name_en = excluded.name_en,
                base_url = excluded.base_url,
                path = excluded.path
            "#,
        )
        .bind(r.slug)
        .bind(r.riwaya_code)
        .bind(r.name_ar)
        .bind(r.name_en)
        .bind(r.base_url)
        .bind(r.path)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rule_table_has_no_duplicate_scopes() {
        let mut seen = HashSet::new();
        for rule in RULES {
            let reader = rule.transmitter.map(|t| t.reader()).or(rule.reader);
            let key = (rule.category, reader, rule.transmitter);
            assert!(seen.insert(key), "duplicate rule scope {:?}", key);
        }
    }

    #[test]
    fn tafsir_ranks_and_slugs_are_unique() {
        let ranks: HashSet<i64> = TAFSIR_BOOKS.iter().map(|b| b.priority_rank).collect();
        let slugs: HashSet<&str> = TAFSIR_BOOKS.iter().map(|b| b.slug).collect();
        assert_eq!(ranks.len(), TAFSIR_BOOKS.len());
        assert_eq!(slugs.len(), TAFSIR_BOOKS.len());
    }

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let pool = crate::migrate::test_pool().await;
        seed_reference_data(&pool).await.unwrap();

        let rules: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qiraat_rules")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rules, RULES.len() as i64);

        let ruwat: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ruwat")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(ruwat, 20);
    }

    #[tokio::test]
    async fn duplicate_rule_scope_is_rejected_by_the_index() {
        let pool = crate::migrate::test_pool().await;
        let result = sqlx::query(
            "INSERT INTO qiraat_rules (category, qari_id, rawi_id, value) VALUES ('madd_lazim', NULL, NULL, '4')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
