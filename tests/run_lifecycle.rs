//! End-to-end tests of the run lifecycle of actor outputs.
//!
//! These tests drive outputs the way the engine does:
//! - store data per run, finalize runs, merge and retain
//! - address data through selectors and item names
//! - release data on close

use std::path::PathBuf;
use std::sync::Arc;

use actor_output::{
    ActorOutput, ActorOutputConfig, ConfigurationError, ContainerRegistry, DataItem, DataItemError, Image, ItemId,
    OutputDirectory, OutputError, StateError,
};

const N: usize = 16;

fn output(config: ActorOutputConfig) -> ActorOutput {
    ActorOutput::image(
        config,
        &ContainerRegistry::with_defaults(),
        Arc::new(OutputDirectory::new("/sim/output")),
    )
    .unwrap()
}

fn image_of(value: f64) -> Image {
    Image::from_vec(vec![value; N])
}

fn slot_values(out: &ActorOutput, which: &str) -> Vec<f64> {
    out.get_data(which, Some(&ItemId::from(0)))
        .unwrap()
        .into_image()
        .unwrap()
        .values()
        .to_vec()
}

#[test]
fn merge_across_runs_drops_merged_runs() {
    let mut out = output(
        ActorOutputConfig::new("edep", "dose")
            .auto_merge(true)
            .keep_data_per_run(false),
    );
    out.initialize().unwrap();

    out.store_data(0, image_of(1.0)).unwrap();
    out.end_of_run(0).unwrap();
    out.store_data(1, image_of(3.0)).unwrap();
    out.end_of_run(1).unwrap();

    assert_eq!(slot_values(&out, "merged"), vec![4.0; N]);
    assert!(out.data_per_run().is_empty());
    assert!(out.get_container(0).unwrap_err().is_state());
}

#[test]
fn retention_keeps_runs_without_merging() {
    let mut out = output(
        ActorOutputConfig::new("edep", "dose")
            .auto_merge(false)
            .keep_data_per_run(true),
    );
    out.initialize().unwrap();

    out.store_data(0, image_of(1.0)).unwrap();
    out.end_of_run(0).unwrap();
    out.store_data(1, image_of(3.0)).unwrap();
    out.end_of_run(1).unwrap();

    assert!(out.merged_data().is_none());
    assert_eq!(slot_values(&out, "0"), vec![1.0; N]);
    assert_eq!(slot_values(&out, "1"), vec![3.0; N]);
    assert!(matches!(
        out.get_container("merged"),
        Err(OutputError::State(StateError::NoMergedData { .. }))
    ));
}

#[test]
fn keep_and_merge_holds_both() {
    let mut out = output(ActorOutputConfig::new("edep", "dose").keep_data_per_run(true));
    for (run, value) in [(0, 1.0), (1, 2.0), (2, 3.0)] {
        out.store_data(run, image_of(value)).unwrap();
        out.end_of_run(run).unwrap();
    }
    assert_eq!(out.len(), 3);
    assert_eq!(slot_values(&out, "merged"), vec![6.0; N]);
    assert_eq!(out.collect_data("all").unwrap().len(), 4);
}

#[test]
fn discarding_runs_without_merge_loses_data() {
    let mut out = output(
        ActorOutputConfig::new("edep", "dose")
            .auto_merge(false)
            .keep_data_per_run(false),
    );
    out.store_data(0, image_of(1.0)).unwrap();
    out.end_of_run(0).unwrap();
    assert!(out.is_empty());
    assert!(out.merged_data().is_none());
}

#[test]
fn runs_are_finalized_once() {
    let mut out = output(ActorOutputConfig::new("edep", "dose"));
    out.store_data(0, image_of(1.0)).unwrap();
    out.end_of_run(0).unwrap();

    assert!(matches!(
        out.end_of_run(0),
        Err(OutputError::State(StateError::RunFinalized { run: 0, .. }))
    ));
    assert!(out.merge_into_run(0, image_of(1.0)).is_err());
    // The merged data is unaffected by the rejected calls.
    assert_eq!(slot_values(&out, "merged"), vec![1.0; N]);
}

#[test]
fn failed_merge_leaves_run_untouched() {
    let mut out = output(ActorOutputConfig::new("edep", "dose").keep_data_per_run(true));
    out.store_data(0, image_of(1.0)).unwrap();
    let err = out.merge_into_run(0, Image::from_vec(vec![1.0; N + 1])).unwrap_err();
    assert!(matches!(err, OutputError::DataItem(DataItemError::ShapeMismatch { .. })));
    assert_eq!(slot_values(&out, "0"), vec![1.0; N]);
}

#[test]
fn run_suffix_in_output_path() {
    let out = output(ActorOutputConfig::new("edep", "dose").output_filename("dose.mhd"));
    assert_eq!(
        out.get_output_path(3, None).unwrap(),
        PathBuf::from("/sim/output/dose_run0003.mhd")
    );
}

#[test]
fn output_path_is_idempotent() {
    let out = output(ActorOutputConfig::new("edep", "dose"));
    let first = out.get_output_path("merged", None).unwrap();
    let second = out.get_output_path("merged", None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, PathBuf::from("/sim/output/edep_from_Actor_dose.mhd"));
}

#[test]
fn quotient_item_and_zero_denominator() {
    let mut out = output(
        ActorOutputConfig::new("ratio", "dose")
            .data_container_class("QuotientImage")
            .keep_data_per_run(true),
    );
    out.store_data(0, DataItem::quotient_pair(Image::from_vec(vec![6.0]), Image::from_vec(vec![2.0])))
        .unwrap();
    out.store_data(1, vec![Image::from_vec(vec![1.0, 0.0]), Image::from_vec(vec![0.0, 0.0])])
        .unwrap();

    let q = out.get_data(0, Some(&"quotient".into())).unwrap().into_image().unwrap();
    assert_eq!(q.values(), &[3.0]);

    let q = out.get_data(1, Some(&"quotient".into())).unwrap().into_image().unwrap();
    assert_eq!(q.values()[0], f64::INFINITY);
    assert!(q.values()[1].is_nan());
}

#[test]
fn close_releases_data() {
    let mut out = output(
        ActorOutputConfig::new("edep", "dose")
            .keep_data_per_run(true)
            .keep_data_in_memory(false),
    );
    out.store_data(0, image_of(1.0)).unwrap();
    out.end_of_run(0).unwrap();

    out.close();
    assert!(out.is_released());
    assert!(out.data_per_run().is_empty());
    assert!(out.merged_data().is_none());

    for which in ["0", "merged"] {
        let err = out.get_data(which, None).unwrap_err();
        assert!(matches!(err, OutputError::State(StateError::DataReleased { .. })), "{which}");
    }
    assert!(out.collect_data("all").is_err());
    assert!(out.store_data(1, image_of(1.0)).is_err());
}

#[test]
fn bogus_selector_is_fatal_everywhere() {
    let mut out = output(ActorOutputConfig::new("edep", "dose"));

    let errors = [
        out.get_output_path("bogus", None).unwrap_err(),
        out.collect_data("bogus").unwrap_err(),
        out.store_data("bogus", image_of(1.0)).unwrap_err(),
    ];
    for err in errors {
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            OutputError::Configuration(ConfigurationError::UnknownSelector { ref token, .. }) if token == "bogus"
        ));
        let message = err.to_string();
        assert!(message.contains("edep") && message.contains("dose"), "{message}");
    }
    assert!(out.is_empty());
}

#[test]
fn store_rejects_collection_selectors() {
    let mut out = output(ActorOutputConfig::new("edep", "dose"));
    for which in ["all", "all_runs"] {
        let err = out.store_data(which, image_of(1.0)).unwrap_err();
        assert!(matches!(
            err,
            OutputError::Configuration(ConfigurationError::SelectorNotAllowed { .. })
        ));
    }
}

#[test]
fn variance_container_merges_sums() {
    let mut out = output(
        ActorOutputConfig::new("edep", "dose").data_container_class("SingleImageWithVariance"),
    );
    // Run 0 scores 1 and 3; run 1 scores 2.
    for (run, sum, squares, samples) in [(0, 4.0, 10.0, 2), (1, 2.0, 4.0, 1)] {
        let mut container = actor_output::DataItemContainer::from_images(
            actor_output::ContainerKind::SingleImageWithVariance,
            vec![Image::from_vec(vec![sum]), Image::from_vec(vec![squares])],
        )
        .unwrap();
        container.set_number_of_samples(samples);
        out.store_data(run, container).unwrap();
        out.end_of_run(run).unwrap();
    }

    let merged = out.get_container("merged").unwrap();
    assert_eq!(merged.number_of_samples(), 3);
    let mean = out.get_data("merged", Some(&"mean".into())).unwrap().into_image().unwrap();
    assert_eq!(mean.values(), &[2.0]);
    let variance = out
        .get_data("merged", Some(&"variance".into()))
        .unwrap()
        .into_image()
        .unwrap();
    // E[x^2] - E[x]^2 = 14/3 - 4
    assert!((variance.values()[0] - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn container_of_other_class_is_rejected() {
    let mut out = output(ActorOutputConfig::new("edep", "dose"));
    let foreign = actor_output::DataItemContainer::from_images(
        actor_output::ContainerKind::SingleMeanImage,
        vec![image_of(1.0)],
    )
    .unwrap();
    let err = out.store_data(0, foreign).unwrap_err();
    assert!(matches!(err, OutputError::DataItem(DataItemError::KindMismatch { .. })));
}

#[test]
fn root_merge_is_not_implemented() {
    let mut out = ActorOutput::root(
        ActorOutputConfig::new("phsp", "phase_space").keep_data_per_run(true),
        &ContainerRegistry::with_defaults(),
        Arc::new(OutputDirectory::default()),
    )
    .unwrap();
    out.store_data(0, image_of(1.0)).unwrap();
    let err = out.end_of_run(0).unwrap_err();
    assert!(err.is_not_implemented());
    assert!(err.is_fatal());

    let err = out.merge_data_from_runs().unwrap_err();
    assert!(err.is_not_implemented());
}

#[test]
fn engine_image_only_resolves_paths() {
    let mut out = ActorOutput::engine_image(
        ActorOutputConfig::new("edep", "dose").output_filename("dose.mhd"),
        &ContainerRegistry::with_defaults(),
        Arc::new(OutputDirectory::new("/sim/output")),
    )
    .unwrap();

    let err = out.store_data(0, image_of(1.0)).unwrap_err();
    assert!(matches!(
        err,
        OutputError::Configuration(ConfigurationError::ContractViolation { .. })
    ));
    assert!(out.write_data("all").unwrap_err().is_fatal());
    assert!(out.merge_data_from_runs().unwrap_err().is_fatal());

    out.end_of_run(0).unwrap();
    assert!(out.is_run_finalized(0));
    assert!(out.end_of_simulation().unwrap().is_empty());
    assert_eq!(
        out.get_output_path(2, None).unwrap(),
        PathBuf::from("/sim/output/dose_run0002.mhd")
    );
}
