// ============================================================
// Layer 6 — NLG Metrics
// ============================================================
// Corpus-level scores comparing generated questions against the
// reference questions:
//
//   Bleu_1 .. Bleu_4  clipped n-gram precision with brevity penalty,
//                     accumulated over the whole corpus
//   METEOR            unigram F-mean (recall weighted) with a
//                     fragmentation penalty, averaged per sentence
//   ROUGE_L           longest-common-subsequence F-measure
//   CIDEr             TF-IDF weighted n-gram cosine similarity with a
//                     length penalty (the CIDEr-D variant), ×10
//   Distinct_1 .. 3   unique n-grams / total n-grams over all
//                     hypotheses (diversity of the generated text)
//
// All scores except CIDEr are in [0, 1].
//
// Reference: Papineni et al. (2002) BLEU
//            Banerjee & Lavie (2005) METEOR
//            Lin (2004) ROUGE
//            Vedantam et al. (2015) CIDEr

use std::collections::{HashMap, HashSet};

use crate::domain::generation::Scores;
use crate::domain::traits::MetricScorer;

const BLEU_ORDER:  usize = 4;
const CIDER_ORDER: usize = 4;
const CIDER_SIGMA: f64   = 6.0;
const ROUGE_BETA:  f64   = 1.2;
const METEOR_ALPHA: f64  = 0.9;
const METEOR_BETA:  f64  = 3.0;
const METEOR_GAMMA: f64  = 0.5;
const DISTINCT_ORDER: usize = 3;

/// Floor for a zero n-gram precision so the geometric mean stays defined.
const TINY: f64 = 1e-9;

type NgramCounts<'a> = HashMap<&'a [String], usize>;

/// Scorer for every metric the evaluation reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NlgEval;

impl NlgEval {
    pub fn new() -> Self { Self }
}

impl MetricScorer for NlgEval {
    fn compute_metrics(&self, references: &[Vec<String>], hypotheses: &[String]) -> Scores {
        let refs: Vec<Vec<Vec<String>>> = references
            .iter()
            .map(|rs| rs.iter().map(|r| tokenize(r)).collect())
            .collect();
        let hyps: Vec<Vec<String>> = hypotheses.iter().map(|h| tokenize(h)).collect();

        let mut scores = Scores::new();
        for (n, score) in bleu(&refs, &hyps).into_iter().enumerate() {
            scores.insert(format!("Bleu_{}", n + 1), score);
        }
        scores.insert("METEOR".to_string(),  mean(hyps.iter().zip(&refs).map(|(h, rs)| best_of(rs, |r| meteor(h, r)))));
        scores.insert("ROUGE_L".to_string(), mean(hyps.iter().zip(&refs).map(|(h, rs)| best_of(rs, |r| rouge_l(h, r)))));
        scores.insert("CIDEr".to_string(),   cider(&refs, &hyps));
        for n in 1..=DISTINCT_ORDER {
            scores.insert(format!("Distinct_{n}"), distinct(&hyps, n));
        }

        tracing::debug!("Scored {} hypotheses", hypotheses.len());
        scores
    }
}

/// Lower-case, drop punctuation, split on whitespace.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn ngrams(tokens: &[String], n: usize) -> NgramCounts<'_> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    counts
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn best_of(refs: &[Vec<String>], score: impl Fn(&[String]) -> f64) -> f64 {
    refs.iter().map(|r| score(r.as_slice())).fold(0.0, f64::max)
}

// ─── BLEU ─────────────────────────────────────────────────────────────────────
// Corpus BLEU: clipped matches and candidate counts are summed over all
// sentences before the precisions are formed. The effective reference
// length of each sentence is the reference closest in length to the
// hypothesis. An order for which the corpus contains no hypothesis
// n-grams at all carries no evidence and counts as precision 1.
fn bleu(refs: &[Vec<Vec<String>>], hyps: &[Vec<String>]) -> Vec<f64> {
    let mut correct = [0usize; BLEU_ORDER];
    let mut guess   = [0usize; BLEU_ORDER];
    let mut hyp_len = 0usize;
    let mut ref_len = 0usize;

    for (hyp, rs) in hyps.iter().zip(refs) {
        hyp_len += hyp.len();
        ref_len += rs
            .iter()
            .map(Vec::len)
            .min_by_key(|&l| (l.abs_diff(hyp.len()), l))
            .unwrap_or(0);

        for n in 1..=BLEU_ORDER {
            let hyp_counts = ngrams(hyp, n);
            let mut max_ref: NgramCounts = HashMap::new();
            for r in rs {
                for (gram, count) in ngrams(r, n) {
                    let slot = max_ref.entry(gram).or_insert(0);
                    *slot = (*slot).max(count);
                }
            }
            for (gram, count) in &hyp_counts {
                guess[n - 1]   += count;
                correct[n - 1] += (*count).min(max_ref.get(*gram).copied().unwrap_or(0));
            }
        }
    }

    let brevity = if hyp_len == 0 {
        0.0
    } else if hyp_len < ref_len {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    } else {
        1.0
    };

    let mut log_sum = 0.0;
    (0..BLEU_ORDER)
        .map(|k| {
            let precision = if guess[k] == 0 {
                1.0
            } else {
                (correct[k] as f64 / guess[k] as f64).max(TINY)
            };
            log_sum += precision.ln();
            brevity * (log_sum / (k + 1) as f64).exp()
        })
        .collect()
}

// ─── METEOR ───────────────────────────────────────────────────────────────────
// Exact-match unigram alignment. Each hypothesis word is aligned to the
// first unused identical reference word; chunks are maximal runs that
// are contiguous in both sentences.
fn meteor(hyp: &[String], reference: &[String]) -> f64 {
    if hyp.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let mut used = vec![false; reference.len()];
    let mut alignment: Vec<(usize, usize)> = Vec::new();
    for (i, word) in hyp.iter().enumerate() {
        if let Some(j) = (0..reference.len()).find(|&j| !used[j] && &reference[j] == word) {
            used[j] = true;
            alignment.push((i, j));
        }
    }
    let matches = alignment.len();
    if matches == 0 {
        return 0.0;
    }

    let chunks = 1 + alignment
        .windows(2)
        .filter(|w| !(w[1].0 == w[0].0 + 1 && w[1].1 == w[0].1 + 1))
        .count();

    let precision = matches as f64 / hyp.len() as f64;
    let recall    = matches as f64 / reference.len() as f64;
    let f_mean = precision * recall / (METEOR_ALPHA * precision + (1.0 - METEOR_ALPHA) * recall);
    let penalty = METEOR_GAMMA * (chunks as f64 / matches as f64).powf(METEOR_BETA);
    f_mean * (1.0 - penalty)
}

// ─── ROUGE-L ──────────────────────────────────────────────────────────────────
fn rouge_l(hyp: &[String], reference: &[String]) -> f64 {
    if hyp.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let lcs = lcs_len(hyp, reference);
    if lcs == 0 {
        return 0.0;
    }
    let precision = lcs as f64 / hyp.len() as f64;
    let recall    = lcs as f64 / reference.len() as f64;
    let beta2 = ROUGE_BETA * ROUGE_BETA;
    ((1.0 + beta2) * precision * recall) / (recall + beta2 * precision)
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y { prev[j] + 1 } else { curr[j].max(prev[j + 1]) };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ─── CIDEr-D ──────────────────────────────────────────────────────────────────
// Document frequencies come from the reference sets: an n-gram's df is
// the number of examples whose references contain it. With a single
// example every idf is zero, so the score is zero.
struct TfIdf<'a> {
    vecs:  Vec<HashMap<&'a [String], f64>>,
    norms: Vec<f64>,
    len:   usize,
}

fn tf_idf<'a>(
    tokens:     &'a [String],
    doc_freq:   &[HashMap<&[String], f64>],
    log_corpus: f64,
) -> TfIdf<'a> {
    let mut vecs  = Vec::with_capacity(CIDER_ORDER);
    let mut norms = Vec::with_capacity(CIDER_ORDER);
    for n in 1..=CIDER_ORDER {
        let counts = ngrams(tokens, n);
        let mut vec = HashMap::with_capacity(counts.len());
        let mut norm = 0.0;
        for (gram, tf) in counts {
            let df = doc_freq[n - 1].get(gram).copied().unwrap_or(0.0).max(1.0).ln();
            let w = tf as f64 * (log_corpus - df);
            norm += w * w;
            vec.insert(gram, w);
        }
        vecs.push(vec);
        norms.push(norm.sqrt());
    }
    TfIdf { vecs, norms, len: tokens.len() }
}

fn cider(refs: &[Vec<Vec<String>>], hyps: &[Vec<String>]) -> f64 {
    if hyps.is_empty() {
        return 0.0;
    }
    let mut doc_freq: Vec<HashMap<&[String], f64>> = vec![HashMap::new(); CIDER_ORDER];
    for rs in refs {
        for n in 1..=CIDER_ORDER {
            let seen: HashSet<&[String]> = rs.iter().flat_map(|r| ngrams(r, n).into_keys()).collect();
            for gram in seen {
                *doc_freq[n - 1].entry(gram).or_insert(0.0) += 1.0;
            }
        }
    }
    let log_corpus = (refs.len() as f64).ln();

    let per_example = hyps.iter().zip(refs).map(|(hyp, rs)| {
        if rs.is_empty() {
            return 0.0;
        }
        let h = tf_idf(hyp, &doc_freq, log_corpus);
        let total: f64 = rs
            .iter()
            .map(|r| {
                let r = tf_idf(r, &doc_freq, log_corpus);
                let delta = h.len as f64 - r.len as f64;
                let length_penalty = (-(delta * delta) / (2.0 * CIDER_SIGMA * CIDER_SIGMA)).exp();
                let sim: f64 = (0..CIDER_ORDER)
                    .map(|k| {
                        let dot: f64 = h.vecs[k]
                            .iter()
                            .map(|(gram, hw)| {
                                let rw = r.vecs[k].get(*gram).copied().unwrap_or(0.0);
                                hw.min(rw) * rw
                            })
                            .sum();
                        if h.norms[k] != 0.0 && r.norms[k] != 0.0 {
                            dot / (h.norms[k] * r.norms[k]) * length_penalty
                        } else {
                            0.0
                        }
                    })
                    .sum();
                sim / CIDER_ORDER as f64
            })
            .sum();
        total / rs.len() as f64 * 10.0
    });
    mean(per_example)
}

// ─── Distinct-n ───────────────────────────────────────────────────────────────
fn distinct(hyps: &[Vec<String>], n: usize) -> f64 {
    let mut unique: HashSet<&[String]> = HashSet::new();
    let mut total = 0usize;
    for hyp in hyps {
        for (gram, count) in ngrams(hyp, n) {
            unique.insert(gram);
            total += count;
        }
    }
    if total == 0 { 0.0 } else { unique.len() as f64 / total as f64 }
}
