//! Text Index - Trigram postings over metric names
//!
//! Every metric name is a document. A document is tokenized into
//! overlapping byte trigrams and listed under each of them, so a substring
//! query becomes an intersection of the trigram posting lists followed by a
//! regex filter over the surviving names.
//!
//! # Double buffering
//!
//! ```text
//!             ┌─────────── queries ───────────┐
//!             ▼                               │
//!   active: ArcSwap<TrigramPostings>          │
//!             ▲ swap                          │
//!   standby: Mutex<TrigramPostings> ◄── new documents
//!
//! 1. insert new documents into standby
//! 2. swap: standby becomes active, active becomes standby
//! 3. replay the same documents into the new standby
//! ```
//!
//! Document ids are assigned in insertion order, so both structures must
//! hand out identical ids during the replay. A divergence is an integrity
//! violation.

use crate::index::postings::intersect;
use crate::index::{
    GenerationInfo, IndexError, IndexId, IndexResult, IndexStats, MaterializeReport, Metric,
    QueryIndex,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Position of a document inside one postings structure
type DocId = u32;

/// Three consecutive bytes packed into the low 24 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trigram(pub u32);

impl Trigram {
    #[inline]
    pub fn new(bytes: [u8; 3]) -> Self {
        Self(u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]))
    }
}

/// Distinct trigrams of `text`, sorted
pub fn trigrams(text: &str) -> Vec<Trigram> {
    let mut out: Vec<Trigram> = text
        .as_bytes()
        .windows(3)
        .map(|w| Trigram::new([w[0], w[1], w[2]]))
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Trigrams every match of `pattern` must contain
///
/// Only literal runs outside of groups, classes and repetitions count.
/// Alternations and inline flags make every trigram optional, and escapes
/// such as `\x41` or `\p{L}` stand for characters that are not spelled out,
/// so these yield nothing and the caller falls back to scanning all
/// documents.
pub fn literal_trigrams(pattern: &str) -> Vec<Trigram> {
    if pattern.contains('|') || pattern.contains("(?") {
        return Vec::new();
    }

    let runs = match literal_runs(pattern) {
        Some(runs) => runs,
        None => return Vec::new(),
    };

    let mut out: Vec<Trigram> = runs.iter().flat_map(|run| trigrams(run)).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Escapes that match exactly the escaped character
fn is_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '#'
            | '&' | '-' | '~'
    )
}

/// Single-letter escapes: classes, assertions and control characters
const LETTER_ESCAPES: &str = "dDwWsSbBAzntrfva";

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn literal_runs(pattern: &str) -> Option<Vec<String>> {
    let mut runs: Vec<String> = Vec::new();
    let mut run = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next()?;
                if is_meta(escaped) {
                    run.push(escaped);
                } else if LETTER_ESCAPES.contains(escaped) {
                    runs.push(std::mem::take(&mut run));
                } else {
                    return None;
                }
            }
            '*' | '?' => {
                run.pop();
                runs.push(std::mem::take(&mut run));
            }
            '{' => {
                run.pop();
                runs.push(std::mem::take(&mut run));
                chars.by_ref().find(|c| *c == '}')?;
            }
            '[' => {
                runs.push(std::mem::take(&mut run));
                skip_class(&mut chars)?;
            }
            '(' => {
                runs.push(std::mem::take(&mut run));
                skip_group(&mut chars)?;
            }
            '.' | '^' | '$' | '+' | ')' | ']' | '}' => runs.push(std::mem::take(&mut run)),
            _ => run.push(c),
        }
    }
    runs.push(run);
    Some(runs)
}

/// Consume a bracketed class up to its closing `]`, nested classes included
fn skip_class(chars: &mut Chars<'_>) -> Option<()> {
    // A leading `^` negates; a `]` right after it is a literal member
    if chars.peek() == Some(&'^') {
        chars.next();
    }
    if chars.peek() == Some(&']') {
        chars.next();
    }

    loop {
        match chars.next()? {
            '\\' => {
                chars.next()?;
            }
            '[' => skip_class(chars)?,
            ']' => return Some(()),
            _ => {}
        }
    }
}

/// Consume a group up to its closing `)`
fn skip_group(chars: &mut Chars<'_>) -> Option<()> {
    loop {
        match chars.next()? {
            '\\' => {
                chars.next()?;
            }
            '[' => skip_class(chars)?,
            '(' => skip_group(chars)?,
            ')' => return Some(()),
            _ => {}
        }
    }
}

/// Keep the candidates matching every pattern
///
/// All patterns are compiled before any candidate is tested; one invalid
/// pattern fails the whole call. No patterns keeps every candidate.
pub fn filter<'a, I>(patterns: &[String], candidates: I) -> IndexResult<Vec<&'a str>>
where
    I: IntoIterator<Item = &'a str>,
{
    let regexes = compile(patterns)?;
    Ok(matching(&regexes, candidates))
}

fn matching<'a, I>(regexes: &[Regex], candidates: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter(|name| regexes.iter().all(|re| re.is_match(name)))
        .collect()
}

fn compile(patterns: &[String]) -> IndexResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| IndexError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// One complete trigram → document structure
#[derive(Debug, Clone, Default)]
struct TrigramPostings {
    postings: HashMap<Trigram, Vec<DocId>>,
    documents: Vec<Metric>,
    names: Vec<Arc<str>>,
    doc_of: HashMap<Metric, DocId>,
    info: GenerationInfo,
}

impl TrigramPostings {
    fn insert(&mut self, metric: Metric, name: &Arc<str>) -> DocId {
        let doc = self.documents.len() as DocId;
        self.documents.push(metric);
        self.names.push(Arc::clone(name));
        self.doc_of.insert(metric, doc);

        // Ids grow monotonically, so every posting list stays sorted
        for trigram in trigrams(name) {
            self.postings.entry(trigram).or_default().push(doc);
        }
        doc
    }

    fn lookup(&self, tokens: &[Trigram]) -> Vec<DocId> {
        let mut lists: Vec<&[DocId]> = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.postings.get(token) {
                Some(docs) => lists.push(docs.as_slice()),
                None => return Vec::new(),
            }
        }
        intersect(&lists)
    }

    fn metric(&self, doc: DocId) -> IndexResult<Metric> {
        self.documents.get(doc as usize).copied().ok_or_else(|| {
            IndexError::integrity(format!("text document {} has no metric", doc))
        })
    }

    fn name(&self, doc: DocId) -> IndexResult<&str> {
        self.names
            .get(doc as usize)
            .map(|name| name.as_ref())
            .ok_or_else(|| IndexError::integrity(format!("text document {} has no name", doc)))
    }
}

/// Double-buffered trigram index over metric names
pub struct TextIndex {
    id: IndexId,
    active: ArcSwap<TrigramPostings>,
    standby: Mutex<TrigramPostings>,
}

impl Default for TextIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TextIndex {
    pub fn new() -> Self {
        Self {
            id: IndexId::Text,
            active: ArcSwap::from_pointee(TrigramPostings::default()),
            standby: Mutex::new(TrigramPostings::default()),
        }
    }

    /// Index every name not seen before, then swap and catch up the standby
    ///
    /// Calls are serialized on the standby lock; queries keep reading the
    /// active structure throughout.
    pub fn materialize(&self, names: &[String]) -> IndexResult<MaterializeReport> {
        let mut standby = self.standby.lock();
        let started = Instant::now();

        let mut fresh: Vec<(Metric, Arc<str>, DocId)> = Vec::new();
        for name in names {
            let metric = Metric::hash(name);
            if standby.doc_of.contains_key(&metric) {
                continue;
            }
            let name: Arc<str> = Arc::from(name.as_str());
            let doc = standby.insert(metric, &name);
            fresh.push((metric, name, doc));
        }

        let info = self.active.load().info.next(started);
        standby.info = info;
        let keys = standby.postings.len();

        let promoted = std::mem::take(&mut *standby);
        let demoted = self.active.swap(Arc::new(promoted));

        // Readers may still hold the demoted generation
        let mut demoted = Arc::try_unwrap(demoted).unwrap_or_else(|shared| (*shared).clone());
        let mut divergence = None;
        for (metric, name, expected) in &fresh {
            let doc = demoted.insert(*metric, name);
            if doc != *expected && divergence.is_none() {
                divergence = Some((*expected, doc));
            }
        }
        demoted.info = info;
        *standby = demoted;

        if let Some((expected, doc)) = divergence {
            return Err(IndexError::integrity(format!(
                "text index replay assigned document {} where {} was expected",
                doc, expected
            )));
        }

        tracing::info!(
            index = %self.id,
            generation = info.generation,
            added = fresh.len(),
            trigrams = keys,
            elapsed_us = info.build_micros,
            "Materialized text index"
        );

        Ok(MaterializeReport {
            index: self.id.to_string(),
            generation: info.generation,
            keys,
            added: fresh.len(),
            build_micros: info.build_micros,
        })
    }

    /// Metrics whose names match every pattern
    ///
    /// Candidates come from the literal trigrams of the patterns; patterns
    /// without any start from every indexed document.
    pub fn search(&self, patterns: &[String]) -> IndexResult<Vec<Metric>> {
        // Fail on bad syntax before touching the index
        let regexes = compile(patterns)?;

        let mut tokens: Vec<Trigram> = patterns
            .iter()
            .flat_map(|pattern| literal_trigrams(pattern))
            .collect();
        tokens.sort_unstable();
        tokens.dedup();

        let snapshot = self.active.load();
        let docs: Vec<DocId> = if tokens.is_empty() {
            (0..snapshot.documents.len() as DocId).collect()
        } else {
            snapshot.lookup(&tokens)
        };

        let names = docs
            .iter()
            .map(|doc| snapshot.name(*doc))
            .collect::<IndexResult<Vec<&str>>>()?;

        let mut metrics: Vec<Metric> = matching(&regexes, names)
            .into_iter()
            .map(Metric::hash)
            .collect();
        metrics.sort_unstable();
        Ok(metrics)
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.active.load().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryIndex for TextIndex {
    type Term = Trigram;

    fn id(&self) -> &IndexId {
        &self.id
    }

    fn query(&self, tokens: &[Trigram]) -> IndexResult<Vec<Metric>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.active.load();
        let mut metrics = snapshot
            .lookup(tokens)
            .into_iter()
            .map(|doc| snapshot.metric(doc))
            .collect::<IndexResult<Vec<Metric>>>()?;
        metrics.sort_unstable();
        Ok(metrics)
    }

    fn generation(&self) -> u64 {
        self.active.load().info.generation
    }

    fn stats(&self) -> IndexStats {
        let snapshot = self.active.load();
        IndexStats {
            index: self.id.to_string(),
            kind: "text",
            generation: snapshot.info.generation,
            build_micros: snapshot.info.build_micros,
            built_at: snapshot.info.built_at,
            keys: snapshot.postings.len(),
            nodes: snapshot.documents.len(),
            postings: snapshot.postings.values().map(Vec::len).sum(),
        }
    }
}
