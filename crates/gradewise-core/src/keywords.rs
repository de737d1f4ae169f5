//! Keyword extraction and keyword overlap scoring.
//!
//! Tokenization is pluggable through [`Tokenizer`] so the segmentation
//! backend can follow the deployment locale. The default [`JiebaTokenizer`]
//! handles Latin words and dictionary-segmented CJK runs in the same text.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::{Arc, OnceLock};

use jieba_rs::Jieba;

use crate::error::TokenizeError;

/// Splits text into lowercase terms.
pub trait Tokenizer: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError>;
}

/// Splits on every non-alphanumeric character.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "word"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError> {
        Ok(text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect())
    }
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF | 0xF900..=0xFAFF
    )
}

/// Lowercase Latin words in order, with each maximal CJK run handed to
/// `segment`.
fn split_scripts<F>(text: &str, mut segment: F) -> Vec<String>
where
    F: FnMut(&str, &mut Vec<String>),
{
    fn flush_word(word: &mut String, out: &mut Vec<String>) {
        if !word.is_empty() {
            out.push(word.to_lowercase());
            word.clear();
        }
    }

    let mut out = Vec::new();
    let mut cjk_run = String::new();
    let mut word = String::new();

    for c in text.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut out);
            cjk_run.push(c);
            continue;
        }
        if !cjk_run.is_empty() {
            segment(&cjk_run, &mut out);
            cjk_run.clear();
        }
        if c.is_alphanumeric() {
            word.push(c);
        } else {
            flush_word(&mut word, &mut out);
        }
    }
    if !cjk_run.is_empty() {
        segment(&cjk_run, &mut out);
    }
    flush_word(&mut word, &mut out);

    out
}

static DEFAULT_JIEBA: OnceLock<Arc<Jieba>> = OnceLock::new();

/// Latin words plus jieba dictionary segmentation for CJK runs.
///
/// The bundled dictionary is loaded once per process and shared by every
/// tokenizer built with [`JiebaTokenizer::new`].
#[derive(Clone)]
pub struct JiebaTokenizer {
    jieba: Arc<Jieba>,
}

impl std::fmt::Debug for JiebaTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiebaTokenizer").finish_non_exhaustive()
    }
}

impl Default for JiebaTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl JiebaTokenizer {
    pub fn new() -> Self {
        let jieba = DEFAULT_JIEBA.get_or_init(|| {
            tracing::debug!("loading jieba dictionary");
            Arc::new(Jieba::new())
        });
        Self {
            jieba: Arc::clone(jieba),
        }
    }

    /// The bundled dictionary extended with subject terms, one
    /// `word [freq] [tag]` entry per line.
    pub fn with_user_dict<R: BufRead>(dict: &mut R) -> Result<Self, TokenizeError> {
        let mut jieba = Jieba::new();
        jieba.load_dict(dict).map_err(|e| TokenizeError {
            backend: "jieba".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            jieba: Arc::new(jieba),
        })
    }
}

impl Tokenizer for JiebaTokenizer {
    fn name(&self) -> &str {
        "jieba"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError> {
        Ok(split_scripts(text, |run, out| {
            out.extend(
                self.jieba
                    .cut(run, true)
                    .into_iter()
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(str::to_string),
            );
        }))
    }
}

/// Latin words plus overlapping character bigrams for CJK runs.
///
/// Needs no dictionary, but bigrams spanning a word boundary become terms of
/// their own. A CJK run of one character is emitted as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct CjkBigramTokenizer;

impl Tokenizer for CjkBigramTokenizer {
    fn name(&self) -> &str {
        "cjk-bigram"
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError> {
        Ok(split_scripts(text, |run, out| {
            let chars: Vec<char> = run.chars().collect();
            if chars.len() == 1 {
                out.push(run.to_string());
            } else {
                out.extend(chars.windows(2).map(|w| w.iter().collect::<String>()));
            }
        }))
    }
}

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "between", "both", "but", "by", "can", "could",
    "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from", "further", "had",
    "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my", "no", "nor", "not",
    "of", "off", "on", "once", "only", "or", "other", "our", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your",
];

const CJK_STOP_CHARS: &[&str] = &[
    "的", "了", "是", "在", "和", "与", "或", "也", "就", "都", "而", "及", "着", "把", "被", "这",
    "那", "有", "个", "之", "为", "以", "于", "上", "中", "等", "我", "你", "他", "它", "们", "其",
    "很", "从", "对", "向", "给", "得", "地", "所", "吗", "呢", "吧", "啊", "并",
];

/// Outcome of matching a student answer against a keyword set.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    /// `|matched| / |keywords|`, 0 when there are no keywords.
    pub ratio: f64,
    /// Matched keywords in keyword order.
    pub matched: Vec<String>,
}

/// Extracts salient terms from reference answers.
#[derive(Clone)]
pub struct KeywordExtractor {
    tokenizer: Arc<dyn Tokenizer>,
    stop_words: HashSet<String>,
    corpus: Option<CorpusStats>,
}

/// Document frequencies for IDF weighting.
#[derive(Debug, Clone)]
struct CorpusStats {
    total_docs: usize,
    doc_freq: HashMap<String, usize>,
}

impl std::fmt::Debug for KeywordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordExtractor")
            .field("tokenizer", &self.tokenizer.name())
            .field("stop_words", &self.stop_words.len())
            .field("corpus_docs", &self.corpus.as_ref().map(|c| c.total_docs))
            .finish()
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(Arc::new(JiebaTokenizer::new()))
    }
}

impl KeywordExtractor {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        let stop_words = ENGLISH_STOP_WORDS
            .iter()
            .chain(CJK_STOP_CHARS)
            .map(|w| w.to_string())
            .collect();
        Self {
            tokenizer,
            stop_words,
            corpus: None,
        }
    }

    /// Add extra stop words.
    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_words
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }

    /// Weight terms by inverse document frequency over `documents`
    /// (e.g. every reference answer of an exam) instead of raw frequency.
    pub fn with_corpus<'a, I>(mut self, documents: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_docs = 0;
        for doc in documents {
            total_docs += 1;
            let unique: HashSet<String> = self.terms(doc).into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_default() += 1;
            }
        }
        self.corpus = Some(CorpusStats {
            total_docs,
            doc_freq,
        });
        self
    }

    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    fn is_stop_word(&self, term: &str) -> bool {
        if self.stop_words.contains(term) {
            return true;
        }
        let mut chars = term.chars();
        match (chars.next(), chars.next(), chars.next()) {
            // Latin single letters carry no meaning; single digits and CJK
            // characters may.
            (Some(c), None, _) => !is_cjk(c) && !c.is_numeric(),
            (Some(a), Some(b), None) if is_cjk(a) && is_cjk(b) => {
                self.stop_words.contains(a.to_string().as_str())
                    && self.stop_words.contains(b.to_string().as_str())
            }
            _ => false,
        }
    }

    /// Tokenize and drop stop words. Tokenizer failures yield no terms.
    fn terms(&self, text: &str) -> Vec<String> {
        match self.tokenizer.tokenize(text) {
            Ok(tokens) => tokens
                .into_iter()
                .filter(|t| !self.is_stop_word(t))
                .collect(),
            Err(e) => {
                tracing::warn!("keyword extraction degraded to empty: {e}");
                Vec::new()
            }
        }
    }

    /// Return at most `top_k` terms of `text`, most salient first.
    ///
    /// Ties are broken by first occurrence so the output is deterministic.
    pub fn extract(&self, text: &str, top_k: usize) -> Vec<String> {
        let terms = self.terms(text);
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
        for (pos, term) in terms.iter().enumerate() {
            stats.entry(term.as_str()).or_insert((0, pos)).0 += 1;
        }

        let len = terms.len() as f64;
        let mut weighted: Vec<(&str, f64, usize)> = stats
            .into_iter()
            .map(|(term, (count, first))| {
                let tf = count as f64 / len;
                (term, tf * self.idf(term), first)
            })
            .collect();

        weighted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });

        weighted
            .into_iter()
            .take(top_k)
            .map(|(term, _, _)| term.to_string())
            .collect()
    }

    fn idf(&self, term: &str) -> f64 {
        match &self.corpus {
            Some(corpus) if corpus.total_docs > 0 => {
                let df = *corpus.doc_freq.get(term).unwrap_or(&0) as f64;
                ((corpus.total_docs as f64 + 1.0) / (df + 1.0)).ln() + 1.0
            }
            _ => 1.0,
        }
    }

    /// Measure how many `keywords` the student answer covers.
    ///
    /// A keyword matches when it appears verbatim (case-insensitively) in the
    /// student text or among the student's own terms.
    pub fn match_keywords(&self, student_text: &str, keywords: &[String]) -> KeywordMatch {
        if keywords.is_empty() {
            return KeywordMatch {
                ratio: 0.0,
                matched: Vec::new(),
            };
        }

        let lowered = student_text.to_lowercase();
        let student_terms: HashSet<String> = self.terms(student_text).into_iter().collect();

        let matched: Vec<String> = keywords
            .iter()
            .filter(|k| {
                let k = k.to_lowercase();
                !k.is_empty() && (lowered.contains(&k) || student_terms.contains(&k))
            })
            .cloned()
            .collect();

        KeywordMatch {
            ratio: matched.len() as f64 / keywords.len() as f64,
            matched,
        }
    }
}
