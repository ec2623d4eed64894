//! Retrieval, prompt assembly and the AI-facing operations.
//!
//! A question is embedded once and searched against the verse, tafsir and
//! (optionally) qiraat collections. The hits become both the citations
//! returned to the caller and the Arabic context block placed in the
//! prompt:
//!
//! ```text
//! الآيات ذات الصلة:
//! - البقرة (2:255): ٱللَّهُ لَآ إِلَـٰهَ إِلَّا هُوَ ...
//!
//! التفاسير:
//! - تفسير الطبري (2:255):
//! <first 500 characters>...
//! ```
//!
//! The combined context is cut to `rag.max_context_length` characters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio::sync::mpsc;

use super::vector::CollectionInfo;
use super::{AiError, AiResult, AiServices, ChatMessage, FieldMatch, ScoredPoint, StreamOutcome, Usage};
use crate::models::{check_surah, VerseKey};
use crate::quran;

pub const DISCLAIMER: &str = "\n\n---\n**تنبيه هام:** هذه النسخة التجريبية (Beta). والله أعلم، واستشر شيخاً وعالماً للتأكد من المعلومات الشرعية.";

pub const NO_CONTEXT: &str = "لا يوجد سياق متاح";
const NO_TAFSIR: &str = "لا توجد تفاسير متاحة";
const NO_QIRAAT: &str = "لا توجد معلومات متاحة";

const TAFSIR_EXCERPT_CHARS: usize = 500;
pub const MIN_QUESTION_CHARS: usize = 3;
pub const MIN_SEARCH_CHARS: usize = 2;
pub const MAX_SEARCH_LIMIT: usize = 50;

const QA_PROMPT: &str = "أنت مساعد ذكي متخصص في علوم القرآن الكريم.

مهمتك:
- الإجابة على الأسئلة المتعلقة بالقرآن الكريم بدقة علمية
- الاستشهاد بالآيات والتفاسير والمصادر الموثوقة
- التمييز بين المسائل المتفق عليها والمسائل الخلافية
- استخدام لغة محترمة ومناسبة للموضوعات الدينية

قواعد مهمة:
1. لا تختلق آيات أو أحاديث غير موجودة
2. اذكر المصادر والمراجع عند الاستشهاد
3. إذا لم تكن متأكداً، اعترف بذلك بدلاً من الاختراع
4. احترم اختلاف العلماء في المسائل الفقهية

السياق المسترجع من قاعدة البيانات:
{context}

السؤال: {question}

الإجابة:";

const EXPLAIN_PROMPT: &str = "أنت مفسر متخصص في شرح آيات القرآن الكريم.

مهمتك شرح الآية التالية بشكل شامل يتضمن:
1. المعنى الإجمالي للآية
2. معاني المفردات الغريبة
3. سبب النزول (إن وجد)
4. الأحكام المستنبطة (إن وجدت)
5. الفوائد والعبر

السياق من التفاسير:
{context}

الآية: {verse}
السورة: {surah} - الآية رقم: {ayah}

الشرح:";

const COMPARE_PROMPT: &str = "أنت باحث متخصص في مقارنة التفاسير القرآنية.

مهمتك مقارنة أقوال المفسرين في الآية التالية وتوضيح:
1. نقاط الاتفاق بين المفسرين
2. نقاط الاختلاف ومنشأها
3. الراجح من الأقوال مع التعليل
4. المنهج التفسيري لكل مفسر

التفاسير المختلفة:
{context}

الآية: {verse}

المقارنة:";

const QIRAAT_PROMPT: &str = "أنت متخصص في علم القراءات القرآنية.

مهمتك تحليل الفروق بين القراءات المختلفة للآية وتوضيح:
1. الفرق في اللفظ بين القراءات
2. الأثر في المعنى (إن وجد)
3. التوجيه النحوي لكل قراءة
4. أقوال العلماء في ذلك

القراءات المختلفة:
{context}

الآية: {verse}

التحليل:";

const CHAT_PROMPT: &str = "أنت مساعد ذكي متخصص في علوم القرآن الكريم.
استخدم السياق التالي للإجابة على أسئلة المستخدم:

{context}

قواعد:
- استشهد بالآيات والتفاسير عند الإجابة
- لا تختلق معلومات غير موجودة في السياق
- إذا لم تعرف الإجابة، اعترف بذلك";

/// Substitute `{name}` placeholders in one pass, so substituted text is
/// never scanned for further placeholders. Unknown placeholders are kept.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let hit = values.iter().find(|(key, _)| {
            tail[1..].starts_with(*key) && tail[1 + key.len()..].starts_with('}')
        });
        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Cut to `max_chars` characters, marking the cut with `...`.
pub fn truncate_context(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut = excerpt(&text, max_chars);
    cut.push_str("...");
    cut
}

// ============ Citations and context ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Verse,
    Tafsir,
    Qiraat,
    Asbab,
}

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verse_key: Option<String>,
    pub score: f32,
}

fn verse_citation(kind: SourceKind, hit: &ScoredPoint) -> Citation {
    Citation {
        kind,
        reference: hit.text("verse_key").to_string(),
        verse_key: None,
        score: hit.score,
    }
}

fn tafsir_citation(hit: &ScoredPoint) -> Citation {
    Citation {
        kind: SourceKind::Tafsir,
        reference: hit.text("tafsir_name").to_string(),
        verse_key: hit.verse_key().map(str::to_string),
        score: hit.score,
    }
}

pub fn format_verses(hits: &[ScoredPoint]) -> String {
    let mut lines = vec!["الآيات ذات الصلة:".to_string()];
    for hit in hits {
        lines.push(format!(
            "- {} ({}): {}",
            hit.text("surah_name_ar"),
            hit.text("verse_key"),
            hit.text("text_ar")
        ));
    }
    lines.join("\n")
}

pub fn format_tafsir(hits: &[ScoredPoint]) -> String {
    let mut lines = vec!["التفاسير:".to_string()];
    for hit in hits {
        lines.push(format!(
            "- {} ({}):\n{}...",
            hit.text("tafsir_name"),
            hit.text("verse_key"),
            excerpt(hit.text("text"), TAFSIR_EXCERPT_CHARS)
        ));
    }
    lines.join("\n")
}

pub fn format_qiraat(hits: &[ScoredPoint]) -> String {
    let mut lines = vec!["فروق القراءات:".to_string()];
    for hit in hits {
        lines.push(format!(
            "- {} ({}): {}",
            hit.text("verse_key"),
            hit.text("reader_name"),
            hit.text("text")
        ));
    }
    lines.join("\n")
}

/// Hits retrieved for one question.
#[derive(Debug, Default, Clone)]
pub struct Retrieved {
    pub verses: Vec<ScoredPoint>,
    pub tafsir: Vec<ScoredPoint>,
    pub qiraat: Vec<ScoredPoint>,
}

impl Retrieved {
    pub fn is_empty(&self) -> bool {
        self.verses.is_empty() && self.tafsir.is_empty() && self.qiraat.is_empty()
    }

    /// Citations in retrieval order: verses, then tafsir, then qiraat.
    pub fn citations(&self) -> Vec<Citation> {
        self.verses
            .iter()
            .map(|h| verse_citation(SourceKind::Verse, h))
            .chain(self.tafsir.iter().map(tafsir_citation))
            .chain(self.qiraat.iter().map(|h| verse_citation(SourceKind::Qiraat, h)))
            .collect()
    }

    pub fn context(&self, max_chars: usize) -> String {
        let mut blocks = Vec::new();
        if !self.verses.is_empty() {
            blocks.push(format_verses(&self.verses));
        }
        if !self.tafsir.is_empty() {
            blocks.push(format_tafsir(&self.tafsir));
        }
        if !self.qiraat.is_empty() {
            blocks.push(format_qiraat(&self.qiraat));
        }
        if blocks.is_empty() {
            return NO_CONTEXT.to_string();
        }
        truncate_context(blocks.join("\n\n"), max_chars)
    }
}

fn with_disclaimer(ai: &AiServices, mut text: String) -> String {
    if ai.rag.include_disclaimer {
        text.push_str(DISCLAIMER);
    }
    text
}

// ============ Question answering ============

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default = "default_true")]
    pub include_verses: bool,
    #[serde(default = "default_true")]
    pub include_tafsir: bool,
    #[serde(default)]
    pub include_qiraat: bool,
    #[serde(default, alias = "surah_filter")]
    pub surah: Option<i64>,
}

impl AskRequest {
    pub fn validate(&self) -> AiResult<()> {
        if self.question.trim().chars().count() < MIN_QUESTION_CHARS {
            return Err(AiError::InvalidInput(format!(
                "question must be at least {} characters",
                MIN_QUESTION_CHARS
            )));
        }
        if let Some(surah) = self.surah {
            check_surah(surah).map_err(AiError::InvalidInput)?;
        }
        Ok(())
    }
}

pub async fn retrieve(ai: &AiServices, request: &AskRequest) -> AiResult<Retrieved> {
    let vector = ai.embeddings()?.embed(&request.question).await?;
    let store = ai.vectors()?;
    let surah_filter: Vec<FieldMatch> = request
        .surah
        .map(|s| vec![FieldMatch::new("surah_id", s)])
        .unwrap_or_default();

    let mut retrieved = Retrieved::default();
    if request.include_verses {
        retrieved.verses = store
            .search(&ai.collections.verses, &vector, ai.rag.top_k_verses, &surah_filter)
            .await?;
    }
    if request.include_tafsir {
        retrieved.tafsir = store
            .search(&ai.collections.tafsir, &vector, ai.rag.top_k_tafsir, &[])
            .await?;
    }
    if request.include_qiraat {
        retrieved.qiraat = store
            .search(&ai.collections.qiraat, &vector, ai.rag.top_k_qiraat, &surah_filter)
            .await?;
    }

    tracing::debug!(
        verses = retrieved.verses.len(),
        tafsir = retrieved.tafsir.len(),
        qiraat = retrieved.qiraat.len(),
        "context retrieved"
    );
    Ok(retrieved)
}

fn qa_messages(ai: &AiServices, question: &str, retrieved: &Retrieved) -> Vec<ChatMessage> {
    let context = retrieved.context(ai.rag.max_context_length);
    vec![ChatMessage::system(fill(
        QA_PROMPT,
        &[("context", &context), ("question", question.trim())],
    ))]
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Citation>,
    pub context_used: bool,
    pub usage: Usage,
}

pub async fn ask(ai: &AiServices, request: &AskRequest) -> AiResult<Answer> {
    request.validate()?;
    let chat = ai.chat()?;
    let retrieved = retrieve(ai, request).await?;
    let completion = chat
        .complete(&qa_messages(ai, &request.question, &retrieved))
        .await?;

    Ok(Answer {
        question: request.question.trim().to_string(),
        answer: with_disclaimer(ai, completion.content),
        sources: retrieved.citations(),
        context_used: !retrieved.is_empty(),
        usage: completion.usage,
    })
}

/// One server-sent frame of a streamed answer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Sources { sources: Vec<Citation> },
    Content { content: String },
    Done,
    Error { error: String },
}

/// Stream an answer as frames: sources, content deltas, the disclaimer,
/// then done. A failure at any point sends one error frame and stops.
pub async fn ask_stream(ai: &AiServices, request: AskRequest, frames: mpsc::Sender<StreamFrame>) {
    if let Err(e) = run_stream(ai, &request, &frames).await {
        tracing::warn!(error = %e, "answer stream failed");
        let _ = frames
            .send(StreamFrame::Error {
                error: e.to_string(),
            })
            .await;
    }
}

async fn run_stream(
    ai: &AiServices,
    request: &AskRequest,
    frames: &mpsc::Sender<StreamFrame>,
) -> AiResult<()> {
    request.validate()?;
    let chat = ai.chat()?;
    let retrieved = retrieve(ai, request).await?;

    let sources = StreamFrame::Sources {
        sources: retrieved.citations(),
    };
    if frames.send(sources).await.is_err() {
        return Ok(());
    }

    let messages = qa_messages(ai, &request.question, &retrieved);
    let outcome = chat
        .stream(&messages, frames, |content| StreamFrame::Content { content })
        .await?;
    if outcome == StreamOutcome::Cancelled {
        return Ok(());
    }

    if ai.rag.include_disclaimer {
        let disclaimer = StreamFrame::Content {
            content: DISCLAIMER.to_string(),
        };
        if frames.send(disclaimer).await.is_err() {
            return Ok(());
        }
    }
    let _ = frames.send(StreamFrame::Done).await;
    Ok(())
}

// ============ Verse-grounded prompts ============

#[derive(Debug, Clone, Deserialize)]
pub struct VerseRequest {
    pub surah_id: u16,
    pub ayah_id: u16,
    #[serde(default)]
    pub verse_text: Option<String>,
    #[serde(default)]
    pub tafsir_id: Option<i64>,
}

impl VerseRequest {
    pub fn key(&self) -> AiResult<VerseKey> {
        VerseKey::new(self.surah_id, self.ayah_id).map_err(|e| AiError::InvalidInput(e.to_string()))
    }
}

/// The caller's verse text, else the stored text, else nothing.
async fn verse_text(pool: &SqlitePool, request: &VerseRequest, key: VerseKey) -> AiResult<Option<String>> {
    if let Some(text) = request.verse_text.as_deref().map(str::trim) {
        if !text.is_empty() {
            return Ok(Some(text.to_string()));
        }
    }
    Ok(quran::find_verse(pool, key).await?.map(|v| v.text_uthmani))
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub verse_key: String,
    pub verse_text: Option<String>,
    pub explanation: String,
    pub sources: Vec<Citation>,
    pub usage: Usage,
}

pub async fn explain_verse(
    ai: &AiServices,
    pool: &SqlitePool,
    request: &VerseRequest,
) -> AiResult<Explanation> {
    let key = request.key()?;
    let chat = ai.chat()?;
    let store = ai.vectors()?;
    let text = verse_text(pool, request, key).await?;
    let query = text.clone().unwrap_or_else(|| format!("تفسير الآية {}", key));
    let vector = ai.embeddings()?.embed(&query).await?;

    let tafsir = store
        .search(
            &ai.collections.tafsir,
            &vector,
            5,
            &[FieldMatch::new("verse_key", key.to_string())],
        )
        .await?;
    let asbab = store.search(&ai.collections.asbab, &vector, 2, &[]).await?;

    let mut blocks = Vec::new();
    let mut sources: Vec<Citation> = tafsir.iter().map(tafsir_citation).collect();
    if !tafsir.is_empty() {
        blocks.push(format_tafsir(&tafsir));
    }
    if !asbab.is_empty() {
        let texts: Vec<&str> = asbab.iter().map(|a| a.text("text")).collect();
        blocks.push(format!("أسباب النزول:\n{}", texts.join("\n")));
        sources.extend(asbab.iter().map(|h| verse_citation(SourceKind::Asbab, h)));
    }
    let context = truncate_context(blocks.join("\n\n"), ai.rag.max_context_length);

    let key_text = key.to_string();
    let surah = key.surah.to_string();
    let ayah = key.ayah.to_string();
    let prompt = fill(
        EXPLAIN_PROMPT,
        &[
            ("context", &context),
            ("verse", text.as_deref().unwrap_or(&key_text)),
            ("surah", &surah),
            ("ayah", &ayah),
        ],
    );
    let completion = chat.complete(&[ChatMessage::system(prompt)]).await?;

    Ok(Explanation {
        verse_key: key_text,
        verse_text: text,
        explanation: with_disclaimer(ai, completion.content),
        sources,
        usage: completion.usage,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TafsirComparison {
    pub verse_key: String,
    pub verse_text: Option<String>,
    pub comparison: String,
    pub tafsir_count: usize,
    pub sources: Vec<Citation>,
    pub usage: Usage,
}

pub async fn compare_tafsir(
    ai: &AiServices,
    pool: &SqlitePool,
    request: &VerseRequest,
) -> AiResult<TafsirComparison> {
    let key = request.key()?;
    let chat = ai.chat()?;
    let store = ai.vectors()?;
    let text = verse_text(pool, request, key).await?;
    let query = text.clone().unwrap_or_else(|| format!("تفسير الآية {}", key));
    let vector = ai.embeddings()?.embed(&query).await?;

    let mut filter = vec![FieldMatch::new("verse_key", key.to_string())];
    if let Some(id) = request.tafsir_id {
        filter.push(FieldMatch::new("tafsir_id", id));
    }
    let tafsir = store
        .search(&ai.collections.tafsir, &vector, 10, &filter)
        .await?;

    let context = if tafsir.is_empty() {
        NO_TAFSIR.to_string()
    } else {
        truncate_context(format_tafsir(&tafsir), ai.rag.max_context_length)
    };
    let key_text = key.to_string();
    let prompt = fill(
        COMPARE_PROMPT,
        &[
            ("context", &context),
            ("verse", text.as_deref().unwrap_or(&key_text)),
        ],
    );
    let completion = chat.complete(&[ChatMessage::system(prompt)]).await?;

    Ok(TafsirComparison {
        verse_key: key_text,
        verse_text: text,
        comparison: with_disclaimer(ai, completion.content),
        tafsir_count: tafsir.len(),
        sources: tafsir.iter().map(tafsir_citation).collect(),
        usage: completion.usage,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct QiraatAnalysis {
    pub verse_key: String,
    pub verse_text: Option<String>,
    pub analysis: String,
    pub qiraat_found: usize,
    pub sources: Vec<Citation>,
    pub usage: Usage,
}

pub async fn analyze_qiraat(
    ai: &AiServices,
    pool: &SqlitePool,
    request: &VerseRequest,
) -> AiResult<QiraatAnalysis> {
    let key = request.key()?;
    let chat = ai.chat()?;
    let store = ai.vectors()?;
    let text = verse_text(pool, request, key).await?;
    let query = text
        .clone()
        .unwrap_or_else(|| format!("القراءات المختلفة للآية {}", key));
    let vector = ai.embeddings()?.embed(&query).await?;

    let qiraat = store
        .search(
            &ai.collections.qiraat,
            &vector,
            10,
            &[FieldMatch::new("verse_key", key.to_string())],
        )
        .await?;

    let context = if qiraat.is_empty() {
        NO_QIRAAT.to_string()
    } else {
        truncate_context(format_qiraat(&qiraat), ai.rag.max_context_length)
    };
    let key_text = key.to_string();
    let prompt = fill(
        QIRAAT_PROMPT,
        &[
            ("context", &context),
            ("verse", text.as_deref().unwrap_or(&key_text)),
        ],
    );
    let completion = chat.complete(&[ChatMessage::system(prompt)]).await?;

    Ok(QiraatAnalysis {
        verse_key: key_text,
        verse_text: text,
        analysis: with_disclaimer(ai, completion.content),
        qiraat_found: qiraat.len(),
        sources: qiraat
            .iter()
            .map(|h| verse_citation(SourceKind::Qiraat, h))
            .collect(),
        usage: completion.usage,
    })
}

// ============ Multi-turn chat ============

const CHAT_VERSES: usize = 3;
const CHAT_TAFSIR: usize = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default = "default_true")]
    pub include_context: bool,
}

impl ChatRequest {
    /// Turns as chat messages. Only `user` and `assistant` turns are
    /// accepted, and none may be empty.
    pub fn history(&self) -> AiResult<Vec<ChatMessage>> {
        if self.messages.is_empty() {
            return Err(AiError::InvalidInput(
                "messages must not be empty".to_string(),
            ));
        }
        self.messages
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                if turn.content.trim().is_empty() {
                    return Err(AiError::InvalidInput(format!(
                        "messages[{}] has empty content",
                        i
                    )));
                }
                match turn.role.trim() {
                    "user" => Ok(ChatMessage::user(turn.content.trim())),
                    "assistant" => Ok(ChatMessage::assistant(turn.content.trim())),
                    other => Err(AiError::InvalidInput(format!(
                        "messages[{}] has role '{}' (expected user or assistant)",
                        i, other
                    ))),
                }
            })
            .collect()
    }

    /// The most recent user turn, which drives retrieval.
    pub fn last_user_turn(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role.trim() == "user")
            .map(|m| m.content.trim())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub sources: Vec<Citation>,
    pub context_used: bool,
    pub usage: Usage,
}

pub async fn chat(ai: &AiServices, request: &ChatRequest) -> AiResult<ChatReply> {
    let mut messages = request.history()?;
    let chat = ai.chat()?;

    let mut retrieved = Retrieved::default();
    if request.include_context {
        if let Some(question) = request.last_user_turn() {
            let store = ai.vectors()?;
            let vector = ai.embeddings()?.embed(question).await?;
            retrieved.verses = store
                .search(&ai.collections.verses, &vector, CHAT_VERSES, &[])
                .await?;
            retrieved.tafsir = store
                .search(&ai.collections.tafsir, &vector, CHAT_TAFSIR, &[])
                .await?;
        }
    }

    if !retrieved.is_empty() {
        let context = retrieved.context(ai.rag.max_context_length);
        messages.insert(
            0,
            ChatMessage::system(fill(CHAT_PROMPT, &[("context", &context)])),
        );
    }
    tracing::debug!(turns = request.messages.len(), context = !retrieved.is_empty(), "chat");

    let completion = chat.complete(&messages).await?;
    Ok(ChatReply {
        response: with_disclaimer(ai, completion.content),
        sources: retrieved.citations(),
        context_used: !retrieved.is_empty(),
        usage: completion.usage,
    })
}

// ============ Semantic search ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Verses,
    Tafsir,
    Qiraat,
    #[default]
    All,
}

impl SearchType {
    fn covers(self, kind: SearchType) -> bool {
        self == SearchType::All || self == kind
    }
}

impl FromStr for SearchType {
    type Err = AiError;

    fn from_str(s: &str) -> AiResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(SearchType::All),
            "verses" => Ok(SearchType::Verses),
            "tafsir" => Ok(SearchType::Tafsir),
            "qiraat" => Ok(SearchType::Qiraat),
            other => Err(AiError::InvalidInput(format!(
                "unknown search type '{}' (expected verses, tafsir, qiraat or all)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticQuery {
    #[serde(alias = "q")]
    pub query: String,
    #[serde(default, alias = "type")]
    pub search_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default, alias = "surah_filter")]
    pub surah: Option<i64>,
}

/// A vector hit with display text attached from the local store.
///
/// `text` is the stored Uthmani text of the hit's verse; it is `null` when
/// that verse is not in the local database.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub id: Value,
    pub score: f32,
    pub verse_key: Option<String>,
    pub surah_name_ar: Option<String>,
    pub text: Option<String>,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticResults {
    pub query: String,
    pub search_type: SearchType,
    pub total_results: usize,
    pub results: BTreeMap<&'static str, Vec<SemanticHit>>,
}

pub async fn hydrate(pool: &SqlitePool, hits: Vec<ScoredPoint>) -> AiResult<Vec<SemanticHit>> {
    let keys: Vec<String> = hits
        .iter()
        .filter_map(|h| h.verse_key().and_then(|k| k.parse::<VerseKey>().ok()))
        .map(|k| k.to_string())
        .collect();
    let texts = quran::verse_texts(pool, &keys).await?;

    Ok(hits
        .into_iter()
        .map(|hit| {
            let verse_key = hit
                .verse_key()
                .and_then(|k| k.parse::<VerseKey>().ok())
                .map(|k| k.to_string());
            let local = verse_key.as_ref().and_then(|k| texts.get(k));
            SemanticHit {
                id: hit.id,
                score: hit.score,
                surah_name_ar: local.map(|v| v.surah_name_ar.clone()),
                text: local.map(|v| v.text_uthmani.clone()),
                verse_key,
                payload: hit.payload,
            }
        })
        .collect())
}

pub async fn semantic_search(
    ai: &AiServices,
    pool: &SqlitePool,
    query: &SemanticQuery,
) -> AiResult<SemanticResults> {
    let text = query.query.trim();
    if text.chars().count() < MIN_SEARCH_CHARS {
        return Err(AiError::InvalidInput(format!(
            "query must be at least {} characters",
            MIN_SEARCH_CHARS
        )));
    }
    let search_type: SearchType = query.search_type.as_deref().unwrap_or("").parse()?;
    let limit = query
        .limit
        .unwrap_or(ai.default_limit)
        .clamp(1, MAX_SEARCH_LIMIT);
    if let Some(surah) = query.surah {
        check_surah(surah).map_err(AiError::InvalidInput)?;
    }

    let store = ai.vectors()?;
    let vector = ai.embeddings()?.embed(text).await?;
    let surah_filter: Vec<FieldMatch> = query
        .surah
        .map(|s| vec![FieldMatch::new("surah_id", s)])
        .unwrap_or_default();

    let mut results = BTreeMap::new();
    if search_type.covers(SearchType::Verses) {
        let hits = store
            .search(&ai.collections.verses, &vector, limit, &surah_filter)
            .await?;
        results.insert("verses", hydrate(pool, hits).await?);
    }
    if search_type.covers(SearchType::Tafsir) {
        let hits = store
            .search(&ai.collections.tafsir, &vector, limit, &[])
            .await?;
        results.insert("tafsir", hydrate(pool, hits).await?);
    }
    if search_type.covers(SearchType::Qiraat) {
        let hits = store
            .search(&ai.collections.qiraat, &vector, limit, &surah_filter)
            .await?;
        results.insert("qiraat", hydrate(pool, hits).await?);
    }

    Ok(SemanticResults {
        query: text.to_string(),
        search_type,
        total_results: results.values().map(Vec::len).sum(),
        results,
    })
}

// ============ Health and stats ============

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub chat: bool,
    pub qdrant: bool,
    pub qdrant_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qdrant_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiHealth {
    pub status: &'static str,
    pub services: ServiceHealth,
}

/// Never fails: problems are reported as `degraded`.
pub async fn health(ai: &AiServices) -> AiHealth {
    let mut services = ServiceHealth {
        chat: ai.chat().is_ok(),
        qdrant: false,
        qdrant_url: ai.qdrant_url.clone(),
        collections: None,
        qdrant_error: None,
    };

    match ai.vectors() {
        Ok(store) => match store.list_collections().await {
            Ok(names) => {
                services.qdrant = true;
                services.collections = Some(names);
            }
            Err(e) => services.qdrant_error = Some(e.to_string()),
        },
        Err(e) => services.qdrant_error = Some(e.to_string()),
    }

    AiHealth {
        status: if services.chat && services.qdrant {
            "healthy"
        } else {
            "degraded"
        },
        services,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CollectionStatus {
    Ready(CollectionInfo),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AiStats {
    pub total_vectors: u64,
    pub collections: BTreeMap<String, CollectionStatus>,
    pub embedding_model: Option<String>,
    pub chat_model: Option<String>,
    pub vector_dimensions: Option<usize>,
}

pub async fn stats(ai: &AiServices) -> AiResult<AiStats> {
    let store = ai.vectors()?;
    let names = [
        &ai.collections.verses,
        &ai.collections.tafsir,
        &ai.collections.qiraat,
        &ai.collections.asbab,
    ];

    let mut collections = BTreeMap::new();
    let mut total_vectors = 0;
    for name in names {
        let status = match store.collection_info(name).await {
            Ok(info) => {
                total_vectors += info.vectors();
                CollectionStatus::Ready(info)
            }
            Err(e) => CollectionStatus::Failed {
                error: e.to_string(),
            },
        };
        collections.insert(name.clone(), status);
    }

    Ok(AiStats {
        total_vectors,
        collections,
        embedding_model: ai.embeddings().ok().map(|e| e.model().to_string()),
        chat_model: ai.chat().ok().map(|c| c.model().to_string()),
        vector_dimensions: ai.embeddings().ok().map(|e| e.dims()),
    })
}
