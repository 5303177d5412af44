use std::collections::BTreeSet;

use cast_vault::{Backends, CastApi, GrepOptions, NucleoScorer, RegexSearcher, VaultConfig};

fn api() -> CastApi {
    CastApi::with_backends(VaultConfig::default(), Backends::default())
}

fn write_vault(root: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(root.join("projects"))?;
    std::fs::write(root.join("Project Plan.md"), "Timeline for the roadmap.\n")?;
    std::fs::write(root.join("project plan.md"), "lowercase twin\n")?;
    std::fs::write(root.join("projects/Project Planning.md"), "See the roadmap.\n")?;
    std::fs::write(root.join("Roadmap.md"), "Roadmap\nQ1 roadmap\nQ2\n")?;
    std::fs::write(root.join("Unrelated.md"), "nothing\n")?;
    Ok(())
}

#[tokio::test]
async fn fuzzy_titles_are_sorted_by_score_then_title() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_vault(temp.path())?;

    let env = api()
        .search_titles_fuzzy(temp.path(), "project plan", None, None)
        .await;
    assert!(env.ok, "{env:?}");
    let hits = env.data.as_array().unwrap();
    assert_eq!(env.meta["count"], hits.len());
    assert!(hits.len() >= 3);

    let scores: Vec<f64> = hits.iter().map(|h| h["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
    assert!(scores.iter().all(|s| *s >= 55.0));
    assert!(hits.iter().all(|h| h["reason"] == "title"));

    // Equal scores fall back to the lowercase title, then the path.
    assert_eq!(scores[0], 100.0);
    assert_eq!(scores[1], 100.0);
    assert!(hits[0]["path"].as_str() < hits[1]["path"].as_str());
    Ok(())
}

#[tokio::test]
async fn empty_title_query_has_no_hits() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_vault(temp.path())?;
    let env = api().search_titles_fuzzy(temp.path(), "   ", None, None).await;
    assert!(env.ok);
    assert_eq!(env.data, serde_json::json!([]));
    Ok(())
}

#[tokio::test]
async fn nucleo_scorer_finds_the_same_best_title() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_vault(temp.path())?;
    let backends = Backends {
        scorer: std::sync::Arc::new(NucleoScorer),
        content: std::sync::Arc::new(RegexSearcher),
    };
    let api = CastApi::with_backends(VaultConfig::default(), backends);

    let env = api
        .search_titles_fuzzy(temp.path(), "Roadmap", None, Some(90.0))
        .await;
    assert!(env.ok, "{env:?}");
    assert_eq!(env.data[0]["title"], "Roadmap");
    Ok(())
}

#[tokio::test]
async fn grep_reports_snippets_with_context() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_vault(temp.path())?;

    let mut opts = GrepOptions::literal("roadmap");
    opts.context_lines = 1;
    let env = api().grep(temp.path(), opts).await;
    assert!(env.ok, "{env:?}");
    let hits = env.data.as_array().unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0]["title"], "Roadmap");
    assert_eq!(hits[0]["score"], 44.0);

    let first = &hits[0]["snippets"][0];
    assert_eq!(first["line_no"], 1);
    assert_eq!(first["match_start"], 0);
    assert_eq!(first["match_end"], 7);
    assert_eq!(first["after"], serde_json::json!(["Q1 roadmap"]));

    // Smart case: an uppercase query only matches that casing.
    let env = api().grep(temp.path(), GrepOptions::literal("Roadmap")).await;
    let hits = env.data.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["snippets"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_pattern_is_an_invalid_input_envelope() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_vault(temp.path())?;
    let mut opts = GrepOptions::literal("(unclosed");
    opts.regex = true;
    let env = api().grep(temp.path(), opts).await;
    assert!(!env.ok);
    assert_eq!(env.kind(), Some("invalid_input"));
    assert!(env.error.unwrap().contains("invalid pattern"));
    Ok(())
}

#[tokio::test]
async fn hybrid_search_never_repeats_a_path() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write_vault(temp.path())?;

    let env = api().search_all(temp.path(), "roadmap", None).await;
    assert!(env.ok, "{env:?}");
    let hits = env.data.as_array().unwrap();
    let paths: BTreeSet<_> = hits.iter().map(|h| h["path"].as_str().unwrap()).collect();
    assert_eq!(paths.len(), hits.len());

    let top = &hits[0];
    assert_eq!(top["title"], "Roadmap");
    assert_eq!(top["reason"], "hybrid");
    assert_eq!(top["score"], 100.0);
    assert_eq!(top["snippets"].as_array().unwrap().len(), 2);
    assert!(hits.iter().skip(1).all(|h| h["reason"] == "content"));
    Ok(())
}

#[tokio::test]
async fn missing_vault_is_not_found() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let env = api()
        .search_all(temp.path().join("nope"), "x", None)
        .await;
    assert!(!env.ok);
    assert_eq!(env.kind(), Some("not_found"));
    Ok(())
}
