//! Issuer and year hints pulled out of a question.

use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;

use chrono::Datelike;

use crate::index::IndexSnapshot;
use crate::rag::search::SearchFilter;
use crate::rag::types::SearchHit;

/// Words dropped from company names before matching them in a question.
const COMPANY_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "corp", "corporation", "co", "company", "ltd", "limited", "plc",
    "holdings", "group", "the", "sa", "nv", "ag", "llc", "lp",
];

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid year regex"))
}

/// Tickers and filing years mentioned in a question.
///
/// Tickers restrict the search; years only reorder what was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHints {
    pub tickers: Vec<String>,
    /// Every year mentioned, in order of first mention.
    pub years: Vec<i32>,
}

impl QueryHints {
    /// Only issuers present in `snapshot` are recognized. Tickers must appear
    /// in upper case; company names match case-insensitively on whole words.
    pub fn detect(query: &str, snapshot: &IndexSnapshot) -> Self {
        let words: Vec<&str> = query
            .split(|c: char| !c.is_alphanumeric() && c != '.' && c != '-')
            .map(|w| w.trim_matches(|c| c == '.' || c == '-'))
            .filter(|w| !w.is_empty())
            .collect();
        let normalized = format!(" {} ", normalize(query));

        let mut tickers: Vec<String> = Vec::new();
        for document in snapshot.documents() {
            let ticker = &document.meta.ticker;
            if tickers.contains(ticker) {
                continue;
            }
            let by_ticker = words.iter().any(|w| w == ticker);
            let by_name = document
                .meta
                .company
                .as_deref()
                .map(company_alias)
                .filter(|alias| !alias.is_empty())
                .is_some_and(|alias| normalized.contains(&format!(" {} ", alias)));
            if by_ticker || by_name {
                tickers.push(ticker.clone());
            }
        }

        let mut years: Vec<i32> = Vec::new();
        for year in year_regex()
            .find_iter(query)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .filter(|y| (1990..2100).contains(y))
        {
            if !years.contains(&year) {
                years.push(year);
            }
        }

        Self { tickers, years }
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty() && self.years.is_empty()
    }

    /// Filter restricting the search to the mentioned issuers.
    pub fn issuer_filter(&self) -> SearchFilter {
        SearchFilter::new().with_tickers(&self.tickers)
    }

    /// Order `hits` (best first) for the prompt and keep `k` of them.
    ///
    /// Filings from a mentioned year move ahead of the rest, keeping score
    /// order inside each group. With two or more issuers the hits are drawn
    /// round-robin per issuer so each one is represented. Ranks are
    /// renumbered from 1.
    pub fn arrange(&self, hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
        let (mut ordered, others): (Vec<SearchHit>, Vec<SearchHit>) = hits
            .into_iter()
            .partition(|h| self.years.contains(&h.document.filing_date.year()));
        ordered.extend(others);

        let mut arranged = if self.tickers.len() >= 2 {
            self.interleave(ordered, k)
        } else {
            ordered.truncate(k);
            ordered
        };
        for (position, hit) in arranged.iter_mut().enumerate() {
            hit.rank = position + 1;
        }
        arranged
    }

    fn interleave(&self, hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
        let mut buckets: Vec<VecDeque<SearchHit>> = vec![VecDeque::new(); self.tickers.len() + 1];
        for hit in hits {
            let slot = self
                .tickers
                .iter()
                .position(|t| *t == hit.document.ticker)
                .unwrap_or(self.tickers.len());
            buckets[slot].push_back(hit);
        }

        let mut out = Vec::with_capacity(k);
        while out.len() < k && buckets.iter().any(|b| !b.is_empty()) {
            for bucket in buckets.iter_mut() {
                if out.len() == k {
                    break;
                }
                if let Some(hit) = bucket.pop_front() {
                    out.push(hit);
                }
            }
        }
        out
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"Apple Inc."` becomes `"apple"`.
fn company_alias(name: &str) -> String {
    normalize(name)
        .split(' ')
        .filter(|w| !COMPANY_SUFFIXES.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkingParams;
    use crate::embeddings::EmbeddingConfig;
    use crate::index::SnapshotBuilder;
    use crate::types::{DocumentMeta, DocumentRecord};
    use chrono::{NaiveDate, Utc};

    fn snapshot() -> IndexSnapshot {
        let mut builder = SnapshotBuilder::empty(
            0,
            EmbeddingConfig::default().identity(),
            ChunkingParams {
                chunk_size: 200,
                overlap: 30,
            },
        );
        for (ticker, company, id) in [
            ("AAPL", "Apple Inc.", "a1"),
            ("MSFT", "Microsoft Corporation", "m1"),
            ("A", "Agilent Technologies, Inc.", "g1"),
        ] {
            builder.upsert_document(DocumentRecord {
                meta: DocumentMeta::new(ticker, "10-K", NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), id)
                    .with_company(company),
                content_hash: id.into(),
                origin: "test".into(),
                ingested_at: Utc::now(),
                sections: Vec::new(),
            });
        }
        builder.finish()
    }

    #[test]
    fn test_detects_ticker_and_company() {
        let snapshot = snapshot();
        let hints = QueryHints::detect("How does Apple compare with MSFT?", &snapshot);
        assert_eq!(hints.tickers, vec!["AAPL", "MSFT"]);
        assert!(hints.years.is_empty());
    }

    #[test]
    fn test_lowercase_single_letter_is_not_a_ticker() {
        let hints = QueryHints::detect("what is a risk factor", &snapshot());
        assert!(hints.tickers.is_empty());
    }

    #[test]
    fn test_detects_year() {
        let hints = QueryHints::detect("Apple risk factors in 2022", &snapshot());
        assert_eq!(hints.years, vec![2022]);
        let filter = hints.issuer_filter();
        assert_eq!(filter.tickers, vec!["AAPL"]);
        assert_eq!(filter.filed_year, None);
    }

    #[test]
    fn test_detects_every_year() {
        let hints = QueryHints::detect("MSFT revenue 2022 vs 2023, and 2022 again", &snapshot());
        assert_eq!(hints.years, vec![2022, 2023]);
    }

    fn hit(ticker: &str, year: i32, seq: u64, score: f32) -> SearchHit {
        use crate::types::Chunk;

        SearchHit {
            rank: 0,
            score,
            seq,
            document: DocumentMeta::new(
                ticker,
                "10-K",
                NaiveDate::from_ymd_opt(year, 6, 1).unwrap(),
                format!("{}-{}", ticker, year),
            ),
            chunk: Chunk {
                id: format!("{}-{}:0:{}", ticker, year, seq),
                document_id: format!("{}-{}", ticker, year),
                section_label: "Full Text".to_string(),
                section_ordinal: 0,
                word_start: seq as usize,
                word_end: seq as usize + 1,
                page_start: 1,
                page_end: 1,
                text: "text".to_string(),
                content_hash: String::new(),
            },
        }
    }

    #[test]
    fn test_year_is_a_stable_preference() {
        let hints = QueryHints {
            tickers: vec!["AAPL".into()],
            years: vec![2021],
        };
        let hits = vec![
            hit("AAPL", 2023, 0, 0.9),
            hit("AAPL", 2021, 1, 0.5),
            hit("AAPL", 2023, 2, 0.4),
            hit("AAPL", 2021, 3, 0.3),
        ];

        let arranged = hints.arrange(hits, 3);

        let seqs: Vec<u64> = arranged.iter().map(|h| h.seq).collect();
        assert_eq!(seqs, vec![1, 3, 0]);
        let ranks: Vec<usize> = arranged.iter().map(|h| h.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_two_issuers_are_interleaved() {
        let hints = QueryHints {
            tickers: vec!["AAPL".into(), "MSFT".into()],
            years: Vec::new(),
        };
        let hits = vec![
            hit("MSFT", 2023, 0, 0.9),
            hit("MSFT", 2023, 1, 0.8),
            hit("MSFT", 2023, 2, 0.7),
            hit("AAPL", 2023, 3, 0.2),
            hit("AAPL", 2023, 4, 0.1),
        ];

        let arranged = hints.arrange(hits, 3);

        let tickers: Vec<&str> = arranged.iter().map(|h| h.document.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT", "AAPL"]);
        assert_eq!(arranged[0].seq, 3);
        assert_eq!(arranged[1].seq, 0);
    }

    #[test]
    fn test_out_of_range_year_ignored() {
        let hints = QueryHints::detect("events of 1929", &snapshot());
        assert!(hints.is_empty());
    }

    #[test]
    fn test_company_alias() {
        assert_eq!(company_alias("Apple Inc."), "apple");
        assert_eq!(company_alias("Microsoft Corporation"), "microsoft");
        assert_eq!(company_alias("The Coca-Cola Company"), "coca cola");
    }
}
