//! End-to-end scenarios against the public engine surface, with
//! deterministic stub providers in place of a model.

use std::sync::Arc;

use distill_rs::prelude::*;
use distill_rs::provider::ProviderFuture;

/// Text section of a summarization prompt.
fn prompt_body(prompt: &str) -> &str {
    prompt.split("\n\n").nth(1).unwrap_or_default()
}

/// Always returns the same summary.
struct Constant(&'static str);

impl TextGenerator for Constant {
    fn generate<'a>(&'a self, _prompt: &'a str) -> ProviderFuture<'a, String> {
        let s = self.0.to_string();
        Box::pin(async move { Ok(s) })
    }
}

/// Returns its input: summarization never makes progress.
struct Echo;

impl TextGenerator for Echo {
    fn generate<'a>(&'a self, prompt: &'a str) -> ProviderFuture<'a, String> {
        let body = prompt_body(prompt).to_string();
        Box::pin(async move { Ok(body) })
    }
}

/// Keeps the first few words of its input.
struct Prefix(usize);

impl TextGenerator for Prefix {
    fn generate<'a>(&'a self, prompt: &'a str) -> ProviderFuture<'a, String> {
        let out = prompt_body(prompt)
            .split_whitespace()
            .take(self.0)
            .collect::<Vec<_>>()
            .join(" ");
        Box::pin(async move { Ok(out) })
    }
}

/// Labels cooking text and physics text with distinct summaries.
struct Topical;

impl TextGenerator for Topical {
    fn generate<'a>(&'a self, prompt: &'a str) -> ProviderFuture<'a, String> {
        let body = prompt_body(prompt);
        let summary = if body.contains("pasta") {
            "pasta recipe with tomato sauce"
        } else if body.contains("electron") {
            "physics lecture on electron orbitals"
        } else {
            "miscellaneous notes"
        };
        Box::pin(async move { Ok(summary.to_string()) })
    }
}

struct Unreachable;

impl TextGenerator for Unreachable {
    fn generate<'a>(&'a self, _prompt: &'a str) -> ProviderFuture<'a, String> {
        Box::pin(async { Err(ProviderError::Request("connection refused".into())) })
    }
}

fn engine_with(
    generator: impl TextGenerator + 'static,
    tokenizer: impl Tokenizer + 'static,
    config: EngineConfig,
) -> ContextEngine {
    let providers = Providers::new(
        Arc::new(generator),
        Arc::new(HashingEmbedder::new(384)),
        Arc::new(tokenizer),
    );
    ContextEngine::new(config, providers).unwrap()
}

const SENTENCE: &str = "Quantum vortex jumps: 7 bright zebras fly quickly!";

#[tokio::test]
async fn filler_is_summarized_and_dense_sentence_survives_verbatim() {
    let engine = engine_with(
        Constant("a long run of the letter a"),
        CharRatioTokenizer::default(),
        EngineConfig::default(),
    );
    let text = format!("{} {SENTENCE}", "a".repeat(10_000));
    let tokenizer = CharRatioTokenizer::default();
    assert!(tokenizer.count_tokens(&text) > 100);

    let out = engine.compress(&text, 100).await.unwrap();
    assert_eq!(out.outcome, CompressionOutcome::Summarized);
    assert!(tokenizer.count_tokens(&out.text) <= 100);
    assert!(out.text.contains(SENTENCE));
    assert!(out.text.contains("a long run of the letter a"));
    assert!(!out.text.contains(&"a".repeat(100)));
}

#[tokio::test]
async fn retrieval_prefers_the_matching_topic() {
    let mut config = EngineConfig::default();
    // Archive everything regardless of entropy.
    config.triage.entropy_threshold = 100.0;
    let mut engine = engine_with(Topical, WordTokenizer, config);

    let pasta = "Boil the pasta for ten minutes, then stir in the sauce.";
    let physics = "Each electron occupies an orbital with a distinct energy level.";
    engine.ingest(pasta).await.unwrap();
    engine.ingest(physics).await.unwrap();
    assert_eq!(engine.archive().len(), 2);

    let hits = engine
        .retrieve("how do I make tomato sauce for pasta", Some(1))
        .await
        .unwrap();
    assert_eq!(hits, vec![pasta.to_string()]);

    let scored = engine.search("electron orbitals", None).await.unwrap();
    assert_eq!(scored[0].original_text, physics);
    assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn non_shrinking_summaries_fall_back_to_truncation() {
    let engine = engine_with(Echo, WordTokenizer, EngineConfig::default());
    let text = format!("{SENTENCE} ").repeat(40);

    let out = engine.compress(&text, 25).await.unwrap();
    assert!(matches!(out.outcome, CompressionOutcome::Truncated(_)));
    assert!(WordTokenizer.count_tokens(&out.text) <= 25);
    assert!(!out.text.is_empty());
}

#[tokio::test]
async fn depth_cap_bounds_the_number_of_passes() {
    let mut config = EngineConfig::default();
    config.triage.entropy_threshold = 100.0;
    config.compression.max_depth = 1;
    let engine = engine_with(Prefix(10), WordTokenizer, config);

    let text = (0..2_000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let out = engine.compress(&text, 10).await.unwrap();
    assert_eq!(out.passes, 1);
    assert_eq!(
        out.outcome,
        CompressionOutcome::Truncated(TruncationReason::DepthLimit)
    );
    assert!(WordTokenizer.count_tokens(&out.text) <= 10);
}

#[tokio::test]
async fn output_always_fits_the_budget() {
    let engine = engine_with(Prefix(5), WordTokenizer, EngineConfig::default());
    let text = format!(
        "{} {} {}",
        "lorem ".repeat(300),
        format!("{SENTENCE} ").repeat(20),
        "ok ok ".repeat(300)
    );
    for budget in [0, 1, 5, 20, 100, 1_000, 10_000] {
        let out = engine.prepare_for_budget(&text, budget).await.unwrap();
        assert!(
            WordTokenizer.count_tokens(&out) <= budget,
            "budget {budget}: got {} tokens",
            WordTokenizer.count_tokens(&out)
        );
    }
}

#[tokio::test]
async fn text_within_budget_is_untouched() {
    let engine = engine_with(Unreachable, WordTokenizer, EngineConfig::default());
    let out = engine.prepare_for_budget(SENTENCE, 50).await.unwrap();
    assert_eq!(out, SENTENCE);
}

#[tokio::test]
async fn generator_failure_surfaces_as_provider_error() {
    let mut engine = engine_with(Unreachable, WordTokenizer, EngineConfig::default());
    let err = engine.ingest(&"na ".repeat(100)).await.unwrap_err();
    assert!(matches!(err, DistillError::Provider(_)));
    assert!(engine.retained().is_empty());
}

#[tokio::test]
async fn session_lifecycle() {
    let mut engine = engine_with(
        Constant("a run of one letter"),
        WordTokenizer,
        EngineConfig::default(),
    );

    let report = engine
        .ingest(&format!("{} {SENTENCE}", "a".repeat(600)))
        .await
        .unwrap();
    assert_eq!(report.archived, 1);
    assert_eq!(report.retained, 1);
    assert_eq!(engine.archive().len(), 1);
    assert_eq!(engine.recent_context(100), SENTENCE);

    // Same summary again: no second entry.
    engine.ingest(&"na ".repeat(50)).await.unwrap();
    assert_eq!(engine.archive().len(), 1);

    engine.reset();
    assert!(engine.archive().is_empty());
    assert_eq!(engine.recent_context(100), "");
    assert!(engine.retrieve("letter", None).await.unwrap().is_empty());
}
