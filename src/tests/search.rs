//! Orchestrated search flows over stub collaborators.

use crate::errors::AppError;
use crate::index::cosine;
use crate::models::{ImageId, Paging, PagingParams, SearchCriteria};
use crate::search::{self, CombinedPriority, SearchBasis};
use crate::tests::support::{build_app, seed_record, seeded_vector, StubEmbedder};

fn paging() -> Paging {
    PagingParams::default().validated().unwrap()
}

fn criteria(positive: &[&str]) -> SearchCriteria {
    SearchCriteria {
        criteria: positive.iter().map(|s| s.to_string()).collect(),
        ..SearchCriteria::default()
    }
}

#[tokio::test]
async fn test_text_search_ranks_by_similarity() {
    let app = build_app(false);

    // one record sits exactly on the query vector, the other far away
    seed_record(
        &app.ctx,
        "match",
        Some(seeded_vector(b"vision:cat")),
        None,
    )
    .await;
    seed_record(
        &app.ctx,
        "other",
        Some(seeded_vector(b"something else entirely")),
        None,
    )
    .await;

    let outcome = search::text_search(&app.ctx, "cat", SearchBasis::Vision, paging())
        .await
        .unwrap();

    assert_eq!(outcome.hits.len(), 2);
    assert_eq!(*outcome.hits[0].img.id, "match");
    assert!((outcome.hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_result_count_never_exceeds_requested() {
    let app = build_app(false);
    for i in 0..5 {
        seed_record(
            &app.ctx,
            &format!("r{i}"),
            Some(seeded_vector(format!("record {i}").as_bytes())),
            None,
        )
        .await;
    }

    let window = Paging { count: 2, skip: 0 };
    let outcome = search::text_search(&app.ctx, "anything", SearchBasis::Vision, window)
        .await
        .unwrap();
    assert_eq!(outcome.hits.len(), 2);
}

#[tokio::test]
async fn test_disabled_ocr_gates_every_basis_accepting_operation() {
    let app = build_app(false);
    seed_record(&app.ctx, "a", Some(seeded_vector(b"a")), None).await;

    for basis in [SearchBasis::Ocr, SearchBasis::Combined] {
        assert!(matches!(
            search::text_search(&app.ctx, "prompt", basis, paging()).await,
            Err(AppError::Configuration(_))
        ));
        assert!(matches!(
            search::similar_search(&app.ctx, &ImageId::from("a"), basis, paging()).await,
            Err(AppError::Configuration(_))
        ));
        assert!(matches!(
            search::advanced_search(&app.ctx, &criteria(&["cat"]), basis, paging()).await,
            Err(AppError::Configuration(_))
        ));
    }
}

#[tokio::test]
async fn test_combined_basis_is_rejected_outside_advanced_search() {
    let app = build_app(true);
    seed_record(&app.ctx, "a", Some(seeded_vector(b"a")), None).await;

    assert!(matches!(
        search::text_search(&app.ctx, "prompt", SearchBasis::Combined, paging()).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        search::similar_search(&app.ctx, &ImageId::from("a"), SearchBasis::Combined, paging())
            .await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_similar_search_excludes_the_source() {
    let app = build_app(false);
    seed_record(&app.ctx, "src", Some(seeded_vector(b"src")), None).await;
    seed_record(&app.ctx, "near", Some(seeded_vector(b"near")), None).await;

    let outcome =
        search::similar_search(&app.ctx, &ImageId::from("src"), SearchBasis::Vision, paging())
            .await
            .unwrap();

    assert_eq!(outcome.hits.len(), 1);
    assert_eq!(*outcome.hits[0].img.id, "near");
}

#[tokio::test]
async fn test_advanced_search_requires_some_criteria() {
    let app = build_app(true);

    for basis in [SearchBasis::Vision, SearchBasis::Ocr] {
        assert!(matches!(
            search::advanced_search(&app.ctx, &SearchCriteria::default(), basis, paging()).await,
            Err(AppError::Validation(_))
        ));
    }

    // the empty-criteria check also applies under a combined basis with a
    // fully-populated combined section
    let empty_combined = SearchCriteria {
        combined_priority: Some(CombinedPriority::Vision),
        extra_prompt: Some("outdoor".to_string()),
        ..SearchCriteria::default()
    };
    assert!(matches!(
        search::advanced_search(&app.ctx, &empty_combined, SearchBasis::Combined, paging()).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_combined_search_requires_priority_and_extra_prompt() {
    let app = build_app(true);

    let mut incomplete = criteria(&["cat"]);
    incomplete.combined_priority = Some(CombinedPriority::Vision);
    assert!(matches!(
        search::advanced_search(&app.ctx, &incomplete, SearchBasis::Combined, paging()).await,
        Err(AppError::Validation(_))
    ));

    let mut incomplete = criteria(&["cat"]);
    incomplete.extra_prompt = Some("outdoor".to_string());
    assert!(matches!(
        search::advanced_search(&app.ctx, &incomplete, SearchBasis::Combined, paging()).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn test_compose_embeds_with_the_effective_basis_encoder() {
    let request = SearchCriteria {
        criteria: vec!["cat".to_string(), "dog".to_string()],
        negative_criteria: vec!["blurry".to_string()],
        combined_priority: Some(CombinedPriority::Ocr),
        extra_prompt: Some("outdoor".to_string()),
        ..SearchCriteria::default()
    };

    let composed = search::compose(&StubEmbedder, &request, SearchBasis::Combined)
        .await
        .unwrap();

    // effective basis is the priority (ocr), so every criterion goes
    // through the OCR-aligned encoder, in list order
    assert_eq!(composed.positive[0], seeded_vector(b"ocr:cat"));
    assert_eq!(composed.positive[1], seeded_vector(b"ocr:dog"));
    assert_eq!(composed.negative[0], seeded_vector(b"ocr:blurry"));

    let composed = search::compose(&StubEmbedder, &criteria(&["cat"]), SearchBasis::Vision)
        .await
        .unwrap();
    assert_eq!(composed.positive[0], seeded_vector(b"vision:cat"));
}

#[tokio::test]
async fn test_combined_search_rescoring_end_to_end() {
    let app = build_app(true);

    let records = [
        ("a", seeded_vector(b"record a")),
        ("b", seeded_vector(b"record b")),
        ("c", seeded_vector(b"record c")),
    ];
    for (id, vector) in &records {
        seed_record(&app.ctx, id, Some(vector.clone()), None).await;
    }

    let request = SearchCriteria {
        criteria: vec!["cat".to_string()],
        combined_priority: Some(CombinedPriority::Vision),
        extra_prompt: Some("outdoor".to_string()),
        ..SearchCriteria::default()
    };

    let outcome = search::advanced_search(&app.ctx, &request, SearchBasis::Combined, paging())
        .await
        .unwrap();
    assert_eq!(outcome.hits.len(), 3);

    // recompute independently: primary score against "cat" in the vision
    // space, multiplied by similarity to the extra prompt
    let positive = seeded_vector(b"vision:cat");
    let extra = seeded_vector(b"vision:outdoor");
    let mut expected: Vec<(&str, f32)> = records
        .iter()
        .map(|(id, vector)| {
            let primary = cosine(vector, &positive).unwrap();
            let similarity = cosine(vector, &extra).unwrap();
            (*id, primary * similarity)
        })
        .collect();
    expected.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    for (hit, (id, score)) in outcome.hits.iter().zip(&expected) {
        assert_eq!(*hit.img.id, *id);
        assert!((hit.score - score).abs() < 1e-5);
    }
}

#[tokio::test]
async fn test_random_search_returns_indexed_records() {
    let app = build_app(false);
    seed_record(&app.ctx, "a", Some(seeded_vector(b"a")), None).await;
    seed_record(&app.ctx, "b", Some(seeded_vector(b"b")), None).await;
    seed_record(&app.ctx, "no-vector", None, None).await;

    let outcome = search::random_search(&app.ctx, paging()).await.unwrap();

    // an approximate sample: every hit is a real record with a vision
    // embedding, the unembedded one never shows up
    assert_eq!(outcome.hits.len(), 2);
    assert!(outcome.hits.iter().all(|h| *h.img.id != "no-vector"));
}

#[tokio::test]
async fn test_recall_is_declared_but_unimplemented() {
    assert!(matches!(
        search::recall("01ARZ3NDEKTSV4RRFFQ69G5FAV"),
        Err(AppError::NotImplemented)
    ));
}

#[tokio::test]
async fn test_each_search_mints_a_fresh_query_id() {
    let app = build_app(false);
    seed_record(&app.ctx, "a", Some(seeded_vector(b"a")), None).await;

    let first = search::text_search(&app.ctx, "prompt", SearchBasis::Vision, paging())
        .await
        .unwrap();
    let second = search::text_search(&app.ctx, "prompt", SearchBasis::Vision, paging())
        .await
        .unwrap();

    assert_ne!(first.query_id.to_string(), second.query_id.to_string());
}
